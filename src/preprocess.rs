// 该文件是 Kanshou （看守） 项目的一部分。
// src/preprocess.rs - 图像预处理
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

//! 将原始帧缩放为模型的正方形输入，并按 NHWC 布局写入可复用的输入缓冲。
//!
//! 不保持宽高比，模型按训练时的约定直接接收拉伸后的正方形图像。

use fast_image_resize::{
  FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
  images::{Image, ImageRef},
};
use tracing::error;

use crate::{
  config::ResizeFilter,
  error::PipelineError,
  frame::{RGB_CHANNELS, RawFrame},
  tensor::{ElementEncoding, EncodedTensor},
};

/// 预处理器：持有缩放器、RGB 中间图像与固定编码的输入缓冲，逐帧原地覆写
pub struct Preprocessor {
  resizer: Resizer,
  options: ResizeOptions,
  resized: Image<'static>,
  buffer: EncodedTensor,
}

impl Preprocessor {
  pub fn new(target_size: u32, encoding: ElementEncoding, filter: ResizeFilter) -> Self {
    let len = target_size as usize * target_size as usize * RGB_CHANNELS;
    let algorithm = match filter {
      ResizeFilter::Bilinear => ResizeAlg::Convolution(FilterType::Bilinear),
      ResizeFilter::Nearest => ResizeAlg::Nearest,
    };
    Self {
      resizer: Resizer::new(),
      options: ResizeOptions::new().resize_alg(algorithm),
      resized: Image::new(target_size, target_size, PixelType::U8x3),
      buffer: EncodedTensor::with_len(encoding, len),
    }
  }

  /// 缩放并编码一帧，返回内部缓冲的引用
  pub fn encode(&mut self, frame: &RawFrame) -> Result<&EncodedTensor, PipelineError> {
    let invalid = || PipelineError::InvalidImage {
      width: frame.width(),
      height: frame.height(),
    };
    if frame.is_empty() {
      return Err(invalid());
    }

    if frame.width() == self.resized.width() && frame.height() == self.resized.height() {
      self.resized.buffer_mut().copy_from_slice(frame.as_rgb());
    } else {
      let src = ImageRef::new(frame.width(), frame.height(), frame.as_rgb(), PixelType::U8x3)
        .map_err(|e| {
          error!("无法包装输入帧: {}", e);
          invalid()
        })?;
      self
        .resizer
        .resize(&src, &mut self.resized, &self.options)
        .map_err(|e| {
          error!("缩放失败: {}", e);
          invalid()
        })?;
    }

    // 每帧只按编码分支一次
    let pixels = self.resized.buffer();
    match &mut self.buffer {
      EncodedTensor::UInt8(data) => data.copy_from_slice(pixels),
      EncodedTensor::Float32(data) => {
        for (out, &v) in data.iter_mut().zip(pixels) {
          *out = v as f32 / 127.5 - 1.0;
        }
      }
    }

    Ok(&self.buffer)
  }
}

/// 一次性编码，内部分配新缓冲
pub fn encode(
  frame: &RawFrame,
  target_size: u32,
  encoding: ElementEncoding,
) -> Result<EncodedTensor, PipelineError> {
  let mut preprocessor = Preprocessor::new(target_size, encoding, ResizeFilter::Bilinear);
  preprocessor.encode(frame)?;
  Ok(preprocessor.buffer)
}
