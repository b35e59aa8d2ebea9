// 该文件是 Kanshou （看守） 项目的一部分。
// src/adapter.rs - 推理适配层
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

use tracing::{debug, error, info};

use crate::{
  engine::{EngineMetadata, InferenceEngine},
  error::PipelineError,
  frame::RGB_CHANNELS,
  tensor::{ElementEncoding, EncodedTensor},
};

const DETECTION_NUM_OUTPUTS: usize = 4;
const BOX_COORDS: usize = 4;

const OUTPUT_BOXES: usize = 0;
const OUTPUT_CLASSES: usize = 1;
const OUTPUT_SCORES: usize = 2;
const OUTPUT_COUNT: usize = 3;

/// 一行候选输出，框为模型输入空间内的归一化坐标 `[y_min, x_min, y_max, x_max]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetectionRow {
  pub bbox: [f32; 4],
  pub class_id: f32,
  pub score: f32,
}

/// 一次推理读回的四个并行输出
#[derive(Debug, Clone, Copy)]
pub struct RawOutputs<'a> {
  boxes: &'a [f32],
  class_ids: &'a [f32],
  scores: &'a [f32],
  count: usize,
}

impl<'a> RawOutputs<'a> {
  /// 有效行数，已限制在 `max_detections` 以内
  pub fn count(&self) -> usize {
    self.count
  }

  /// 前 `count` 行，超出部分即使有数值也被忽略
  pub fn rows(&self) -> impl Iterator<Item = RawDetectionRow> + 'a {
    let Self {
      boxes,
      class_ids,
      scores,
      count,
    } = *self;
    boxes
      .chunks_exact(BOX_COORDS)
      .zip(class_ids)
      .zip(scores)
      .take(count)
      .map(|((bbox, &class_id), &score)| RawDetectionRow {
        bbox: [bbox[0], bbox[1], bbox[2], bbox[3]],
        class_id,
        score,
      })
  }
}

/// 推理适配器：构造时校验引擎声明，持有输出缓冲，逐帧透传
pub struct InferenceAdapter<E> {
  engine: Option<E>,
  encoding: ElementEncoding,
  input_len: usize,
  max_detections: usize,
  outputs: Vec<Vec<f32>>,
}

impl<E: InferenceEngine> InferenceAdapter<E> {
  pub fn new(
    engine: E,
    input_size: u32,
    max_detections: usize,
    requested: Option<ElementEncoding>,
  ) -> Result<Self, PipelineError> {
    let metadata = engine.metadata();
    let encoding = ElementEncoding::try_from(metadata.input.element_type)?;
    if let Some(requested) = requested {
      if requested != encoding {
        error!("配置的输入编码 {} 与引擎声明的 {} 不一致", requested, encoding);
        return Err(PipelineError::mismatch(format!(
          "配置的输入编码 {} 与引擎声明的 {} 不一致",
          requested, encoding
        )));
      }
    }

    let size = input_size as usize;
    let expected_input = [1, size, size, RGB_CHANNELS];
    if metadata.input.shape != expected_input {
      error!(
        "预期输入形状为 {:?}, 引擎声明为 {}",
        expected_input, metadata.input
      );
      return Err(PipelineError::mismatch(format!(
        "预期输入形状为 {:?}, 引擎声明为 {}",
        expected_input, metadata.input
      )));
    }

    let outputs = Self::allocate_outputs(metadata, max_detections)?;
    info!(
      "推理适配器就绪: 输入 {}, 最大检测数 {}",
      metadata.input, max_detections
    );

    Ok(Self {
      engine: Some(engine),
      encoding,
      input_len: expected_input.iter().product(),
      max_detections,
      outputs,
    })
  }

  fn allocate_outputs(
    metadata: &EngineMetadata,
    max_detections: usize,
  ) -> Result<Vec<Vec<f32>>, PipelineError> {
    if metadata.outputs.len() != DETECTION_NUM_OUTPUTS {
      error!(
        "预期模型输出数量为 {}, 实际为 {}",
        DETECTION_NUM_OUTPUTS,
        metadata.outputs.len()
      );
      return Err(PipelineError::mismatch(format!(
        "预期模型输出数量为 {}, 实际为 {}",
        DETECTION_NUM_OUTPUTS,
        metadata.outputs.len()
      )));
    }

    let expected = [
      max_detections * BOX_COORDS,
      max_detections,
      max_detections,
      1,
    ];
    metadata
      .outputs
      .iter()
      .zip(expected)
      .enumerate()
      .map(|(idx, (spec, len))| {
        if spec.element_count() != len {
          error!("第 {} 个输出 {} 应含 {} 个元素", idx, spec, len);
          return Err(PipelineError::mismatch(format!(
            "第 {} 个输出 {} 应含 {} 个元素",
            idx, spec, len
          )));
        }
        Ok(vec![0.0f32; len])
      })
      .collect()
  }

  pub fn encoding(&self) -> ElementEncoding {
    self.encoding
  }

  pub fn max_detections(&self) -> usize {
    self.max_detections
  }

  pub fn is_ready(&self) -> bool {
    self.engine.is_some()
  }

  /// 执行一次同步推理并读回输出
  pub fn infer(&mut self, tensor: &EncodedTensor) -> Result<RawOutputs<'_>, PipelineError> {
    let engine = self.engine.as_mut().ok_or(PipelineError::EngineNotReady)?;

    if tensor.encoding() != self.encoding || tensor.len() != self.input_len {
      return Err(PipelineError::mismatch(format!(
        "输入张量 {}x{} 与引擎期望的 {}x{} 不一致",
        tensor.encoding(),
        tensor.len(),
        self.encoding,
        self.input_len
      )));
    }

    engine.run(tensor, &mut self.outputs)?;

    let raw_count = self.outputs[OUTPUT_COUNT].first().copied().unwrap_or(0.0);
    let count = if raw_count.is_finite() && raw_count > 0.0 {
      (raw_count as usize).min(self.max_detections)
    } else {
      0
    };
    debug!("有效检测行数: {} (原始值 {})", count, raw_count);

    Ok(RawOutputs {
      boxes: &self.outputs[OUTPUT_BOXES],
      class_ids: &self.outputs[OUTPUT_CLASSES],
      scores: &self.outputs[OUTPUT_SCORES],
      count,
    })
  }

  pub fn release(&mut self) {
    if let Some(mut engine) = self.engine.take() {
      engine.release();
      info!("推理引擎已释放");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    engine::EngineError,
    tensor::{TensorElementType, TensorSpec},
  };

  struct FixedEngine {
    metadata: EngineMetadata,
    outputs: Vec<Vec<f32>>,
    released: bool,
  }

  fn metadata(size: usize, rows: usize, ty: TensorElementType) -> EngineMetadata {
    EngineMetadata {
      input: TensorSpec::new([1, size, size, 3], ty),
      outputs: vec![
        TensorSpec::new([1, rows, 4], TensorElementType::Float32),
        TensorSpec::new([1, rows], TensorElementType::Float32),
        TensorSpec::new([1, rows], TensorElementType::Float32),
        TensorSpec::new([1], TensorElementType::Float32),
      ],
    }
  }

  impl InferenceEngine for FixedEngine {
    fn metadata(&self) -> &EngineMetadata {
      &self.metadata
    }

    fn run(&mut self, _input: &EncodedTensor, outputs: &mut [Vec<f32>]) -> Result<(), EngineError> {
      if self.released {
        return Err(EngineError::NotReady);
      }
      for (out, src) in outputs.iter_mut().zip(&self.outputs) {
        out.copy_from_slice(src);
      }
      Ok(())
    }

    fn release(&mut self) {
      self.released = true;
    }
  }

  fn engine(count: f32) -> FixedEngine {
    FixedEngine {
      metadata: metadata(2, 2, TensorElementType::UInt8),
      outputs: vec![
        vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8],
        vec![0.0, 3.0],
        vec![0.9, 0.8],
        vec![count],
      ],
      released: false,
    }
  }

  #[test]
  fn rows_beyond_count_are_ignored() {
    let mut adapter = InferenceAdapter::new(engine(1.0), 2, 2, None).unwrap();
    let tensor = EncodedTensor::with_len(ElementEncoding::UInt8, 12);
    let outputs = adapter.infer(&tensor).unwrap();
    assert_eq!(outputs.count(), 1);
    let rows: Vec<_> = outputs.rows().collect();
    assert_eq!(
      rows,
      vec![RawDetectionRow {
        bbox: [0.1, 0.2, 0.3, 0.4],
        class_id: 0.0,
        score: 0.9
      }]
    );
  }

  #[test]
  fn count_is_clamped_to_max_detections() {
    let mut adapter = InferenceAdapter::new(engine(25.0), 2, 2, None).unwrap();
    let tensor = EncodedTensor::with_len(ElementEncoding::UInt8, 12);
    assert_eq!(adapter.infer(&tensor).unwrap().count(), 2);

    let mut adapter = InferenceAdapter::new(engine(f32::NAN), 2, 2, None).unwrap();
    assert_eq!(adapter.infer(&tensor).unwrap().count(), 0);
  }

  #[test]
  fn rejects_unsupported_input_type() {
    let mut e = engine(0.0);
    e.metadata = metadata(2, 2, TensorElementType::Float16);
    assert!(matches!(
      InferenceAdapter::new(e, 2, 2, None),
      Err(PipelineError::UnsupportedEncoding(_))
    ));
  }

  #[test]
  fn rejects_mismatched_declarations() {
    assert!(matches!(
      InferenceAdapter::new(engine(0.0), 3, 2, None),
      Err(PipelineError::ConfigurationMismatch(_))
    ));
    assert!(matches!(
      InferenceAdapter::new(engine(0.0), 2, 5, None),
      Err(PipelineError::ConfigurationMismatch(_))
    ));
    assert!(matches!(
      InferenceAdapter::new(engine(0.0), 2, 2, Some(ElementEncoding::Float32)),
      Err(PipelineError::ConfigurationMismatch(_))
    ));
  }

  #[test]
  fn released_adapter_is_not_ready() {
    let mut adapter = InferenceAdapter::new(engine(1.0), 2, 2, None).unwrap();
    adapter.release();
    assert!(!adapter.is_ready());
    let tensor = EncodedTensor::with_len(ElementEncoding::UInt8, 12);
    assert!(matches!(
      adapter.infer(&tensor),
      Err(PipelineError::EngineNotReady)
    ));
  }

  #[test]
  fn engine_faults_become_inference_errors() {
    struct Faulty(EngineMetadata);
    impl InferenceEngine for Faulty {
      fn metadata(&self) -> &EngineMetadata {
        &self.0
      }
      fn run(&mut self, _: &EncodedTensor, _: &mut [Vec<f32>]) -> Result<(), EngineError> {
        Err(EngineError::Fault("delegate crashed".to_string()))
      }
    }

    let mut adapter =
      InferenceAdapter::new(Faulty(metadata(2, 2, TensorElementType::UInt8)), 2, 2, None).unwrap();
    let tensor = EncodedTensor::with_len(ElementEncoding::UInt8, 12);
    assert_eq!(
      adapter.infer(&tensor).err(),
      Some(PipelineError::InferenceError("delegate crashed".to_string()))
    );
  }
}
