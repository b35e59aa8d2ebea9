// 该文件是 Kanshou （看守） 项目的一部分。
// src/engine/tract.rs - 基于 tract 的 ONNX 推理后端
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

use std::path::PathBuf;

use tracing::{debug, error, info, warn};
use tract_onnx::prelude::{
  Datum, DatumType, Fact, Framework, InferenceFact, InferenceModelExt, SimplePlan, Tensor,
  TypedFact, TypedModel, TypedOp, tvec,
};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  config::Accelerator,
  engine::{EngineError, EngineMetadata, InferenceEngine},
  frame::RGB_CHANNELS,
  tensor::{ElementEncoding, EncodedTensor, TensorElementType, TensorSpec},
};

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

// boxes, classes, scores, count
const TRACT_NUM_OUTPUTS: usize = 4;
const TRACT_DEFAULT_INPUT_SIZE: u32 = 300;

pub struct TractEngineBuilder {
  model_path: PathBuf,
  input_size: u32,
  encoding: Option<ElementEncoding>,
  accelerator: Accelerator,
}

impl FromUrlWithScheme for TractEngineBuilder {
  const SCHEME: &'static str = "tract";
}

impl FromUrl for TractEngineBuilder {
  type Error = EngineError;

  /// `tract:///path/model.onnx?encoding=float32`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(EngineError::Load(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut encoding = None;
    for (k, v) in url.query_pairs() {
      if k == "encoding" {
        let parsed = v
          .parse::<ElementEncoding>()
          .map_err(|e| EngineError::Load(format!("{}", e)))?;
        encoding = Some(parsed);
      }
    }

    Ok(TractEngineBuilder {
      model_path: PathBuf::from(url.path()),
      input_size: TRACT_DEFAULT_INPUT_SIZE,
      encoding,
      accelerator: Accelerator::default(),
    })
  }
}

impl TractEngineBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      input_size: TRACT_DEFAULT_INPUT_SIZE,
      encoding: None,
      accelerator: Accelerator::default(),
    }
  }

  pub fn input_size(mut self, size: u32) -> Self {
    self.input_size = size;
    self
  }

  /// 模型未声明输入类型时使用的编码
  ///
  /// 模型声明了类型时以模型为准，不一致由流水线在构造时报告。
  pub fn encoding(mut self, encoding: ElementEncoding) -> Self {
    self.encoding = Some(encoding);
    self
  }

  pub fn accelerator(mut self, accelerator: Accelerator) -> Self {
    self.accelerator = accelerator;
    self
  }

  pub fn build(self) -> Result<TractEngine, EngineError> {
    if self.accelerator == Accelerator::Gpu {
      warn!("tract 后端只支持 CPU 执行，忽略 GPU 加速请求");
    }

    info!("加载模型文件: {}", self.model_path.display());
    let model = tract_onnx::onnx()
      .model_for_path(&self.model_path)
      .map_err(|e| EngineError::Load(format!("无法解析 ONNX 模型: {e}")))?;

    let declared = model
      .input_fact(0)
      .map_err(|e| EngineError::Load(format!("模型没有输入: {e}")))?
      .datum_type();
    let datum_type = input_datum_type(declared, self.encoding);
    debug!("模型声明输入类型: {:?}, 实际使用: {:?}", declared, datum_type);

    let size = self.input_size as usize;
    let input_shape = [1, size, size, RGB_CHANNELS];
    let typed = model
      .with_input_fact(
        0,
        InferenceFact::dt_shape(datum_type, tvec!(1, size, size, RGB_CHANNELS)),
      )
      .map_err(|e| EngineError::Load(format!("无法设置输入形状: {e}")))?
      .into_optimized()
      .map_err(|e| EngineError::Load(format!("无法优化模型: {e}")))?;

    let metadata = EngineMetadata {
      input: TensorSpec::new(input_shape, element_type(datum_type)?),
      outputs: output_specs(&typed)?,
    };
    info!(
      "模型输入 {}, 输出 {}",
      metadata.input,
      metadata
        .outputs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
    );

    let model = typed
      .into_runnable()
      .map_err(|e| EngineError::Load(format!("无法生成可执行模型: {e}")))?;
    info!("模型加载完成");

    Ok(TractEngine {
      model: Some(model),
      metadata,
    })
  }
}

/// 模型声明的输入类型优先，未声明时使用配置，再退回 uint8
fn input_datum_type(declared: Option<DatumType>, fallback: Option<ElementEncoding>) -> DatumType {
  declared.unwrap_or(match fallback {
    Some(ElementEncoding::Float32) => f32::datum_type(),
    Some(ElementEncoding::UInt8) | None => u8::datum_type(),
  })
}

fn element_type(datum_type: DatumType) -> Result<TensorElementType, EngineError> {
  match datum_type {
    DatumType::U8 => Ok(TensorElementType::UInt8),
    DatumType::I8 => Ok(TensorElementType::Int8),
    DatumType::F16 => Ok(TensorElementType::Float16),
    DatumType::F32 => Ok(TensorElementType::Float32),
    DatumType::I32 => Ok(TensorElementType::Int32),
    DatumType::I64 => Ok(TensorElementType::Int64),
    other => Err(EngineError::Load(format!("不支持的张量类型: {:?}", other))),
  }
}

fn output_spec(fact: &TypedFact) -> Result<TensorSpec, EngineError> {
  let shape = fact
    .shape
    .as_concrete()
    .ok_or_else(|| EngineError::Load(format!("输出形状不确定: {:?}", fact)))?;
  Ok(TensorSpec::new(shape, element_type(fact.datum_type)?))
}

/// 按优化后的模型读出四个输出的实际形状
fn output_specs(model: &TypedModel) -> Result<Vec<TensorSpec>, EngineError> {
  let num_outputs = model.outputs.len();
  debug!("模型输出数量: {}", num_outputs);
  if num_outputs != TRACT_NUM_OUTPUTS {
    error!(
      "预期模型输出数量为 {}, 实际为 {}",
      TRACT_NUM_OUTPUTS, num_outputs
    );
    return Err(EngineError::Load(format!(
      "预期模型输出数量为 {}, 实际为 {}",
      TRACT_NUM_OUTPUTS, num_outputs
    )));
  }

  (0..num_outputs)
    .map(|idx| {
      let fact = model
        .output_fact(idx)
        .map_err(|e| EngineError::Load(format!("无法读取第 {} 个输出: {e}", idx)))?;
      output_spec(fact)
    })
    .collect()
}

/// tract 推理引擎，只在 CPU 上执行
pub struct TractEngine {
  model: Option<RunnableModel>,
  metadata: EngineMetadata,
}

impl InferenceEngine for TractEngine {
  fn metadata(&self) -> &EngineMetadata {
    &self.metadata
  }

  fn run(&mut self, input: &EncodedTensor, outputs: &mut [Vec<f32>]) -> Result<(), EngineError> {
    let model = self.model.as_ref().ok_or(EngineError::NotReady)?;

    let shape = &self.metadata.input.shape;
    let tensor = match input {
      EncodedTensor::UInt8(data) => Tensor::from_shape(shape, &data[..]),
      EncodedTensor::Float32(data) => Tensor::from_shape(shape, &data[..]),
    }
    .map_err(|e| EngineError::Fault(format!("无法构造输入张量: {e}")))?;

    let result = model
      .run(tvec!(tensor.into()))
      .map_err(|e| EngineError::Fault(format!("ONNX 推理失败: {e}")))?;

    if result.len() < outputs.len() {
      return Err(EngineError::Fault(format!(
        "模型只产生了 {} 个输出",
        result.len()
      )));
    }

    for (idx, (value, out)) in result.iter().zip(outputs.iter_mut()).enumerate() {
      let values = value
        .cast_to::<f32>()
        .map_err(|e| EngineError::Fault(format!("第 {} 个输出无法转换为 f32: {e}", idx)))?;
      let slice = values
        .as_slice::<f32>()
        .map_err(|e| EngineError::Fault(format!("第 {} 个输出不连续: {e}", idx)))?;
      if slice.len() != out.len() {
        return Err(EngineError::Fault(format!(
          "第 {} 个输出长度 {} 与声明的 {} 不一致",
          idx,
          slice.len(),
          out.len()
        )));
      }
      out.copy_from_slice(slice);
    }

    Ok(())
  }

  fn release(&mut self) {
    if self.model.take().is_some() {
      info!("释放 tract 模型");
    }
  }
}
