// 该文件是 Kanshou （看守） 项目的一部分。
// src/tensor.rs - 张量元素类型与输入缓冲
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

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// 推理引擎声明的张量元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorElementType {
  UInt8,
  Int8,
  Float16,
  Float32,
  Int32,
  Int64,
}

impl fmt::Display for TensorElementType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      TensorElementType::UInt8 => "uint8",
      TensorElementType::Int8 => "int8",
      TensorElementType::Float16 => "float16",
      TensorElementType::Float32 => "float32",
      TensorElementType::Int32 => "int32",
      TensorElementType::Int64 => "int64",
    };
    f.write_str(name)
  }
}

/// 输入张量的元素编码
///
/// - `UInt8`: 通道值原样写入 (0-255)
/// - `Float32`: 通道值按 `v / 127.5 - 1.0` 归一化到约 [-1, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementEncoding {
  UInt8,
  Float32,
}

impl ElementEncoding {
  /// 单个元素占用的字节数
  pub fn element_size(&self) -> usize {
    match self {
      ElementEncoding::UInt8 => std::mem::size_of::<u8>(),
      ElementEncoding::Float32 => std::mem::size_of::<f32>(),
    }
  }
}

impl TryFrom<TensorElementType> for ElementEncoding {
  type Error = PipelineError;

  fn try_from(value: TensorElementType) -> Result<Self, Self::Error> {
    match value {
      TensorElementType::UInt8 => Ok(ElementEncoding::UInt8),
      TensorElementType::Float32 => Ok(ElementEncoding::Float32),
      other => Err(PipelineError::UnsupportedEncoding(other.to_string())),
    }
  }
}

impl From<ElementEncoding> for TensorElementType {
  fn from(value: ElementEncoding) -> Self {
    match value {
      ElementEncoding::UInt8 => TensorElementType::UInt8,
      ElementEncoding::Float32 => TensorElementType::Float32,
    }
  }
}

impl fmt::Display for ElementEncoding {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    TensorElementType::from(*self).fmt(f)
  }
}

impl FromStr for ElementEncoding {
  type Err = PipelineError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "uint8" | "u8" => Ok(ElementEncoding::UInt8),
      "float32" | "f32" => Ok(ElementEncoding::Float32),
      _ => Err(PipelineError::UnsupportedEncoding(s.to_string())),
    }
  }
}

/// 张量形状与元素类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSpec {
  pub shape: Vec<usize>,
  pub element_type: TensorElementType,
}

impl TensorSpec {
  pub fn new(shape: impl Into<Vec<usize>>, element_type: TensorElementType) -> Self {
    Self {
      shape: shape.into(),
      element_type,
    }
  }

  pub fn element_count(&self) -> usize {
    self.shape.iter().product()
  }
}

impl fmt::Display for TensorSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:?}:{}", self.shape, self.element_type)
  }
}

/// 编码后的输入张量，布局为 `height × width × channels`
///
/// 长度与编码在创建时固定，每帧原地覆写，调用方不应跨帧持有其引用。
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedTensor {
  UInt8(Box<[u8]>),
  Float32(Box<[f32]>),
}

impl EncodedTensor {
  pub fn with_len(encoding: ElementEncoding, len: usize) -> Self {
    match encoding {
      ElementEncoding::UInt8 => EncodedTensor::UInt8(vec![0u8; len].into_boxed_slice()),
      ElementEncoding::Float32 => EncodedTensor::Float32(vec![0.0f32; len].into_boxed_slice()),
    }
  }

  pub fn encoding(&self) -> ElementEncoding {
    match self {
      EncodedTensor::UInt8(_) => ElementEncoding::UInt8,
      EncodedTensor::Float32(_) => ElementEncoding::Float32,
    }
  }

  /// 元素个数
  pub fn len(&self) -> usize {
    match self {
      EncodedTensor::UInt8(data) => data.len(),
      EncodedTensor::Float32(data) => data.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// 缓冲区字节数
  pub fn byte_len(&self) -> usize {
    self.len() * self.encoding().element_size()
  }

  pub fn as_u8(&self) -> Option<&[u8]> {
    match self {
      EncodedTensor::UInt8(data) => Some(data),
      EncodedTensor::Float32(_) => None,
    }
  }

  pub fn as_f32(&self) -> Option<&[f32]> {
    match self {
      EncodedTensor::Float32(data) => Some(data),
      EncodedTensor::UInt8(_) => None,
    }
  }
}
