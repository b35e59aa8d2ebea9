// 该文件是 Kanshou （看守） 项目的一部分。
// src/pipeline.rs - 检测流水线
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

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
  adapter::InferenceAdapter,
  config::PipelineConfig,
  engine::InferenceEngine,
  error::PipelineError,
  frame::RawFrame,
  model::Model,
  postprocess::{Detection, PostprocessConfig, postprocess},
  preprocess::Preprocessor,
};

/// 单帧处理状态
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FrameStatus {
  Ok,
  /// 推理引擎在本帧出错，检测列表为空
  InferenceFailed(String),
}

/// 单帧输出
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
  /// 按置信度降序
  pub detections: Vec<Detection>,
  pub latency_ms: f64,
  pub image_width: u32,
  pub image_height: u32,
  pub status: FrameStatus,
}

impl DetectionResult {
  pub fn is_empty(&self) -> bool {
    self.detections.is_empty()
  }

  pub fn len(&self) -> usize {
    self.detections.len()
  }

  pub fn is_degraded(&self) -> bool {
    !matches!(self.status, FrameStatus::Ok)
  }
}

fn elapsed_ms(start: Instant) -> f64 {
  start.elapsed().as_secs_f64() * 1000.0
}

/// 预处理 → 推理 → 后处理，单帧阻塞执行
///
/// 每个实例独占输入缓冲与引擎句柄，不可重入。
pub struct DetectionPipeline<E> {
  config: PipelineConfig,
  post: PostprocessConfig,
  preprocessor: Preprocessor,
  adapter: InferenceAdapter<E>,
}

impl<E: InferenceEngine> DetectionPipeline<E> {
  /// 校验配置与引擎声明，任何不一致都在处理第一帧之前失败
  pub fn new(engine: E, config: PipelineConfig) -> Result<Self, PipelineError> {
    config.validate()?;

    let adapter = InferenceAdapter::new(
      engine,
      config.model_input_size,
      config.max_detections,
      config.element_encoding,
    )?;
    let preprocessor = Preprocessor::new(
      config.model_input_size,
      adapter.encoding(),
      config.resize_filter,
    );

    info!(
      "检测流水线就绪: 输入 {0}x{0} {1}, 目标类别 {2}, 置信度阈值 {3}, NMS 阈值 {4}, 加速器 {5:?}",
      config.model_input_size,
      adapter.encoding(),
      config.target_class_id,
      config.confidence_threshold,
      config.nms_iou_threshold,
      config.accelerator
    );

    Ok(Self {
      post: config.postprocess_config(),
      config,
      preprocessor,
      adapter,
    })
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn is_ready(&self) -> bool {
    self.adapter.is_ready()
  }

  /// 处理一帧
  ///
  /// 引擎内部错误不会向上传播，而是返回 `FrameStatus::InferenceFailed` 的空结果。
  pub fn process(&mut self, frame: &RawFrame) -> Result<DetectionResult, PipelineError> {
    let start = Instant::now();
    let (width, height) = (frame.width(), frame.height());

    let tensor = self.preprocessor.encode(frame)?;
    let outputs = match self.adapter.infer(tensor) {
      Ok(outputs) => outputs,
      Err(PipelineError::InferenceError(msg)) => {
        let latency_ms = elapsed_ms(start);
        warn!("推理失败，返回空结果: {} (耗时 {:.2} ms)", msg, latency_ms);
        return Ok(DetectionResult {
          detections: Vec::new(),
          latency_ms,
          image_width: width,
          image_height: height,
          status: FrameStatus::InferenceFailed(msg),
        });
      }
      Err(e) => return Err(e),
    };

    let detections = postprocess(outputs.rows(), width, height, &self.post);
    let latency_ms = elapsed_ms(start);
    debug!(
      "帧 {}x{} 处理完成: {} 个目标, 耗时 {:.2} ms",
      width,
      height,
      detections.len(),
      latency_ms
    );

    Ok(DetectionResult {
      detections,
      latency_ms,
      image_width: width,
      image_height: height,
      status: FrameStatus::Ok,
    })
  }

  /// 释放推理引擎，之后的调用返回 `EngineNotReady`
  pub fn release(&mut self) {
    self.adapter.release();
  }
}

impl<E: InferenceEngine> Model for DetectionPipeline<E> {
  type Input = RawFrame;
  type Output = DetectionResult;
  type Error = PipelineError;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.process(input)
  }
}
