// 该文件是 Kanshou （看守） 项目的一部分。
// src/config.rs - 流水线配置
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

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{error::PipelineError, postprocess::PostprocessConfig, tensor::ElementEncoding};

const DEFAULT_MODEL_INPUT_SIZE: u32 = 300;
const DEFAULT_MAX_DETECTIONS: usize = 10;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_NMS_IOU_THRESHOLD: f32 = 0.6;
const DEFAULT_MIN_BOX_PIXELS: f32 = 10.0;

/// 推理执行后端偏好，构造时解析一次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accelerator {
  Cpu,
  Gpu,
  #[default]
  Auto,
}

impl FromStr for Accelerator {
  type Err = PipelineError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "cpu" => Ok(Accelerator::Cpu),
      "gpu" => Ok(Accelerator::Gpu),
      "auto" => Ok(Accelerator::Auto),
      _ => Err(PipelineError::mismatch(format!("未知的加速器: {}", s))),
    }
  }
}

/// 缩放插值方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
  #[default]
  Bilinear,
  Nearest,
}

impl FromStr for ResizeFilter {
  type Err = PipelineError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "bilinear" | "triangle" => Ok(ResizeFilter::Bilinear),
      "nearest" => Ok(ResizeFilter::Nearest),
      _ => Err(PipelineError::mismatch(format!("未知的缩放方式: {}", s))),
    }
  }
}

/// 构造时固定的流水线配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
  /// 模型输入边长（正方形）
  pub model_input_size: u32,
  /// 模型输出的最大候选数
  pub max_detections: usize,
  /// 置信度阈值
  pub confidence_threshold: f32,
  /// NMS IoU 阈值
  pub nms_iou_threshold: f32,
  /// 宽或高不超过该像素数的框被丢弃
  pub min_box_pixels: f32,
  /// 目标类别索引，因模型而异，没有默认值
  pub target_class_id: u32,
  /// 期望的输入编码，None 表示采用引擎声明的类型
  pub element_encoding: Option<ElementEncoding>,
  pub accelerator: Accelerator,
  pub resize_filter: ResizeFilter,
}

impl PipelineConfig {
  pub fn new(target_class_id: u32) -> Self {
    Self {
      model_input_size: DEFAULT_MODEL_INPUT_SIZE,
      max_detections: DEFAULT_MAX_DETECTIONS,
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      nms_iou_threshold: DEFAULT_NMS_IOU_THRESHOLD,
      min_box_pixels: DEFAULT_MIN_BOX_PIXELS,
      target_class_id,
      element_encoding: None,
      accelerator: Accelerator::default(),
      resize_filter: ResizeFilter::default(),
    }
  }

  pub fn with_model_input_size(mut self, size: u32) -> Self {
    self.model_input_size = size;
    self
  }

  pub fn with_max_detections(mut self, max_detections: usize) -> Self {
    self.max_detections = max_detections;
    self
  }

  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn with_nms_iou_threshold(mut self, threshold: f32) -> Self {
    self.nms_iou_threshold = threshold;
    self
  }

  pub fn with_min_box_pixels(mut self, pixels: f32) -> Self {
    self.min_box_pixels = pixels;
    self
  }

  pub fn with_element_encoding(mut self, encoding: Option<ElementEncoding>) -> Self {
    self.element_encoding = encoding;
    self
  }

  pub fn with_accelerator(mut self, accelerator: Accelerator) -> Self {
    self.accelerator = accelerator;
    self
  }

  pub fn with_resize_filter(mut self, filter: ResizeFilter) -> Self {
    self.resize_filter = filter;
    self
  }

  pub fn validate(&self) -> Result<(), PipelineError> {
    if self.model_input_size == 0 {
      return Err(PipelineError::mismatch("模型输入尺寸不能为 0"));
    }
    if self.max_detections == 0 {
      return Err(PipelineError::mismatch("最大检测数不能为 0"));
    }
    for (name, value) in [
      ("置信度阈值", self.confidence_threshold),
      ("NMS IoU 阈值", self.nms_iou_threshold),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(PipelineError::mismatch(format!(
          "{} 必须位于 [0, 1]，实际为 {}",
          name, value
        )));
      }
    }
    if !self.min_box_pixels.is_finite() || self.min_box_pixels < 0.0 {
      return Err(PipelineError::mismatch(format!(
        "最小框尺寸无效: {}",
        self.min_box_pixels
      )));
    }
    Ok(())
  }

  pub fn postprocess_config(&self) -> PostprocessConfig {
    PostprocessConfig {
      target_class_id: self.target_class_id,
      confidence_threshold: self.confidence_threshold,
      min_box_pixels: self.min_box_pixels,
      nms_iou_threshold: self.nms_iou_threshold,
    }
  }
}
