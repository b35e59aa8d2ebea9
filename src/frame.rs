// 该文件是 Kanshou （看守） 项目的一部分。
// src/frame.rs - 原始帧定义
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

use thiserror::Error;

pub const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 原始彩色帧，按行优先存储 RGB 三元组
///
/// 允许宽或高为零，这类帧会在预处理阶段以 `InvalidImage` 拒绝。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
  width: u32,
  height: u32,
  data: Box<[u8]>,
}

impl RawFrame {
  fn expected_len(width: u32, height: u32) -> usize {
    RGB_CHANNELS * width as usize * height as usize
  }

  pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
    let expected = Self::expected_len(width, height);
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  /// 从 `0xRRGGBBAA` 打包像素构造，忽略 alpha 通道
  pub fn from_packed_rgba(width: u32, height: u32, pixels: &[u32]) -> Result<Self, FrameError> {
    Self::from_packed(width, height, pixels, |p| {
      [(p >> 24) as u8, (p >> 16) as u8, (p >> 8) as u8]
    })
  }

  /// 从 `0xAARRGGBB` 打包像素构造，忽略 alpha 通道
  pub fn from_packed_argb(width: u32, height: u32, pixels: &[u32]) -> Result<Self, FrameError> {
    Self::from_packed(width, height, pixels, |p| {
      [(p >> 16) as u8, (p >> 8) as u8, p as u8]
    })
  }

  fn from_packed(
    width: u32,
    height: u32,
    pixels: &[u32],
    unpack: impl Fn(u32) -> [u8; 3],
  ) -> Result<Self, FrameError> {
    let expected = width as usize * height as usize;
    if pixels.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: pixels.len(),
      });
    }

    let data: Vec<u8> = pixels.iter().flat_map(|&p| unpack(p)).collect();
    Self::from_rgb(width, height, data)
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }

  /// 读取 (x, y) 处的 RGB 值，越界返回 None
  pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
    if x >= self.width || y >= self.height {
      return None;
    }
    let idx = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS;
    Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
  }

  pub fn as_rgb(&self) -> &[u8] {
    &self.data
  }
}

#[cfg(feature = "read_image_file")]
impl From<image::RgbImage> for RawFrame {
  fn from(image: image::RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}
