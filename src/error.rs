// 该文件是 Kanshou （看守） 项目的一部分。
// src/error.rs - 流水线错误定义
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

use crate::engine::EngineError;

/// 检测流水线的错误分类
///
/// `InvalidImage` 与 `UnsupportedEncoding` 属于调用方错误，立即返回；
/// `InferenceError` 在 [`crate::pipeline::DetectionPipeline::process`] 内部被吸收，
/// 转换为带标记的空结果；`ConfigurationMismatch` 只在构造阶段出现。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
  #[error("无效图像: {width}x{height}")]
  InvalidImage { width: u32, height: u32 },
  #[error("不支持的张量编码: {0}")]
  UnsupportedEncoding(String),
  #[error("推理引擎未就绪")]
  EngineNotReady,
  #[error("推理错误: {0}")]
  InferenceError(String),
  #[error("配置不匹配: {0}")]
  ConfigurationMismatch(String),
}

impl PipelineError {
  pub fn mismatch(msg: impl Into<String>) -> Self {
    PipelineError::ConfigurationMismatch(msg.into())
  }
}

impl From<EngineError> for PipelineError {
  fn from(err: EngineError) -> Self {
    match err {
      EngineError::NotReady | EngineError::Load(_) => PipelineError::EngineNotReady,
      EngineError::Fault(msg) => PipelineError::InferenceError(msg),
    }
  }
}
