// 该文件是 Kanshou （看守） 项目的一部分。
// src/engine.rs - 推理引擎接口
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

use crate::tensor::{EncodedTensor, TensorSpec};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
  #[error("推理引擎未就绪")]
  NotReady,
  #[error("推理引擎内部错误: {0}")]
  Fault(String),
  #[error("模型加载错误: {0}")]
  Load(String),
}

/// 引擎加载后声明的输入输出张量
#[derive(Debug, Clone, PartialEq)]
pub struct EngineMetadata {
  pub input: TensorSpec,
  pub outputs: Vec<TensorSpec>,
}

/// 外部推理引擎的同步运行接口
///
/// 引擎被视为不透明的数值函数：一个输入缓冲映射到若干输出缓冲。
/// 实现不可重入，同一时刻只允许一次 `run`。
pub trait InferenceEngine {
  fn metadata(&self) -> &EngineMetadata;

  /// 执行一次前向推理
  ///
  /// `outputs` 已按 [`EngineMetadata::outputs`] 的元素个数分配好，实现只需覆写。
  fn run(&mut self, input: &EncodedTensor, outputs: &mut [Vec<f32>]) -> Result<(), EngineError>;

  /// 释放引擎持有的资源，之后的 `run` 应返回 [`EngineError::NotReady`]
  fn release(&mut self) {}
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
  fn metadata(&self) -> &EngineMetadata {
    (**self).metadata()
  }

  fn run(&mut self, input: &EncodedTensor, outputs: &mut [Vec<f32>]) -> Result<(), EngineError> {
    (**self).run(input, outputs)
  }

  fn release(&mut self) {
    (**self).release()
  }
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for &mut E {
  fn metadata(&self) -> &EngineMetadata {
    (**self).metadata()
  }

  fn run(&mut self, input: &EncodedTensor, outputs: &mut [Vec<f32>]) -> Result<(), EngineError> {
    (**self).run(input, outputs)
  }

  fn release(&mut self) {
    (**self).release()
  }
}

#[cfg(feature = "backend-tract")]
mod tract;
#[cfg(feature = "backend-tract")]
pub use self::tract::{TractEngine, TractEngineBuilder};
