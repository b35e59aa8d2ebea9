// 该文件是 Kanshou （看守） 项目的一部分。
// src/postprocess.rs - 检测结果后处理
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

//! 后处理分两步:
//! 1. 反归一化并过滤：按目标类别、置信度阈值、最小尺寸筛选候选框；
//! 2. 贪心非极大值抑制：按置信度降序（稳定排序），与已接受框 IoU 超过阈值即丢弃。

use serde::Serialize;
use tracing::debug;

use crate::adapter::RawDetectionRow;

/// 后处理参数
#[derive(Debug, Clone, PartialEq)]
pub struct PostprocessConfig {
  pub target_class_id: u32,
  pub confidence_threshold: f32,
  pub min_box_pixels: f32,
  pub nms_iou_threshold: f32,
}

/// 原图像素坐标系下的轴对齐边界框
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
  pub left: f32,
  pub top: f32,
  pub right: f32,
  pub bottom: f32,
}

impl BoundingBox {
  pub fn width(&self) -> f32 {
    self.right - self.left
  }

  pub fn height(&self) -> f32 {
    self.bottom - self.top
  }

  pub fn area(&self) -> f32 {
    self.width().max(0.0) * self.height().max(0.0)
  }

  /// 交并比，无重叠时为 0
  pub fn iou(&self, other: &Self) -> f32 {
    let x1 = self.left.max(other.left);
    let y1 = self.top.max(other.top);
    let x2 = self.right.min(other.right);
    let y2 = self.bottom.min(other.bottom);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if intersection <= 0.0 {
      return 0.0;
    }

    let union = self.area() + other.area() - intersection;
    if union <= 0.0 { 0.0 } else { intersection / union }
  }
}

/// 一个检测结果，构造后不可变
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  bbox: BoundingBox,
  confidence: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  tracking_id: Option<u32>,
}

impl Detection {
  pub fn new(bbox: BoundingBox, confidence: f32) -> Self {
    Self {
      bbox,
      confidence,
      tracking_id: None,
    }
  }

  /// 附带外部跟踪器给出的标识，本模块不做任何解释
  pub fn with_tracking_id(self, tracking_id: u32) -> Self {
    Self {
      tracking_id: Some(tracking_id),
      ..self
    }
  }

  pub fn bbox(&self) -> &BoundingBox {
    &self.bbox
  }

  pub fn confidence(&self) -> f32 {
    self.confidence
  }

  pub fn tracking_id(&self) -> Option<u32> {
    self.tracking_id
  }
}

/// 把归一化的 `[y_min, x_min, y_max, x_max]` 转到像素坐标并裁剪到图像内
pub fn denormalize(bbox: &[f32; 4], image_width: u32, image_height: u32) -> Option<BoundingBox> {
  if bbox.iter().any(|v| !v.is_finite()) {
    return None;
  }

  let (w, h) = (image_width as f32, image_height as f32);
  Some(BoundingBox {
    left: (bbox[1] * w).clamp(0.0, w),
    top: (bbox[0] * h).clamp(0.0, h),
    right: (bbox[3] * w).clamp(0.0, w),
    bottom: (bbox[2] * h).clamp(0.0, h),
  })
}

// 类别以浮点输出，只容忍表示误差
const CLASS_ID_EPSILON: f32 = 1e-3;

fn class_matches(class_id: f32, target: u32) -> bool {
  class_id.is_finite() && (class_id - target as f32).abs() <= CLASS_ID_EPSILON
}

/// 第一步：类别、置信度、尺寸过滤，保持原始行顺序
pub fn filter_candidates(
  rows: impl IntoIterator<Item = RawDetectionRow>,
  image_width: u32,
  image_height: u32,
  config: &PostprocessConfig,
) -> Vec<Detection> {
  rows
    .into_iter()
    .filter(|row| class_matches(row.class_id, config.target_class_id))
    .filter(|row| (0.0..=1.0).contains(&row.score) && row.score >= config.confidence_threshold)
    .filter_map(|row| {
      let bbox = denormalize(&row.bbox, image_width, image_height)?;
      if bbox.width() <= config.min_box_pixels || bbox.height() <= config.min_box_pixels {
        return None;
      }
      Some(Detection::new(bbox, row.score))
    })
    .collect()
}

/// 第二步：贪心 NMS，输出按置信度降序
pub fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
  // sort_by 是稳定排序，同分时保留原始行顺序
  candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

  let mut accepted: Vec<Detection> = Vec::with_capacity(candidates.len());
  for candidate in candidates {
    let suppressed = accepted
      .iter()
      .any(|kept| candidate.bbox.iou(&kept.bbox) > iou_threshold);
    if !suppressed {
      accepted.push(candidate);
    }
  }
  accepted
}

pub fn postprocess(
  rows: impl IntoIterator<Item = RawDetectionRow>,
  image_width: u32,
  image_height: u32,
  config: &PostprocessConfig,
) -> Vec<Detection> {
  let candidates = filter_candidates(rows, image_width, image_height, config);
  let total = candidates.len();
  let detections = non_max_suppression(candidates, config.nms_iou_threshold);
  debug!("候选框 {} 个, NMS 后保留 {} 个", total, detections.len());
  detections
}
