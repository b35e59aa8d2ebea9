// 该文件是 Kanshou （看守） 项目的一部分。
// src/args.rs - 命令行参数
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

use clap::Args;
use url::Url;

use crate::{
  config::{Accelerator, PipelineConfig, ResizeFilter},
  tensor::ElementEncoding,
};

/// 各个可执行程序共用的流水线参数
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
  /// 模型路径，例如 tract:///models/detector.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 image:///tmp/frame.jpg?repeat=10
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，log:// 或 folder:///var/lib/kanshou
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,

  /// 目标类别索引
  #[arg(long, value_name = "CLASS_ID")]
  pub target_class: u32,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.5, value_name = "THRESHOLD")]
  pub confidence: f32,
  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.6, value_name = "THRESHOLD")]
  pub nms_threshold: f32,
  /// 模型输入边长
  #[arg(long, default_value_t = 300, value_name = "PIXELS")]
  pub size: u32,
  /// 模型输出的最大候选数
  #[arg(long, default_value_t = 10, value_name = "COUNT")]
  pub max_detections: usize,
  /// 宽或高不超过该值的框会被丢弃
  #[arg(long, default_value_t = 10.0, value_name = "PIXELS")]
  pub min_box: f32,
  /// cpu, gpu 或 auto
  #[arg(long, default_value = "auto", value_name = "ACCELERATOR")]
  pub accelerator: Accelerator,
  /// uint8 或 float32，缺省时采用模型声明
  #[arg(long, value_name = "ENCODING")]
  pub encoding: Option<ElementEncoding>,
  /// bilinear 或 nearest
  #[arg(long, default_value = "bilinear", value_name = "FILTER")]
  pub resize_filter: ResizeFilter,
}

impl PipelineArgs {
  pub fn pipeline_config(&self) -> PipelineConfig {
    PipelineConfig::new(self.target_class)
      .with_model_input_size(self.size)
      .with_max_detections(self.max_detections)
      .with_confidence_threshold(self.confidence)
      .with_nms_iou_threshold(self.nms_threshold)
      .with_min_box_pixels(self.min_box)
      .with_element_encoding(self.encoding)
      .with_accelerator(self.accelerator)
      .with_resize_filter(self.resize_filter)
  }

  /// 按参数加载 tract 引擎并组装流水线
  #[cfg(feature = "backend-tract")]
  pub fn build_pipeline(
    &self,
  ) -> anyhow::Result<crate::pipeline::DetectionPipeline<crate::engine::TractEngine>> {
    use crate::{FromUrl, engine::TractEngineBuilder, pipeline::DetectionPipeline};

    let config = self.pipeline_config();
    let mut builder = TractEngineBuilder::from_url(&self.model)?
      .input_size(config.model_input_size)
      .accelerator(config.accelerator);
    if let Some(encoding) = config.element_encoding {
      builder = builder.encoding(encoding);
    }
    Ok(DetectionPipeline::new(builder.build()?, config)?)
  }
}
