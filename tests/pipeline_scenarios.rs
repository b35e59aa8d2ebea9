// 该文件是 Kanshou （看守） 项目的一部分。
// tests/pipeline_scenarios.rs - 流水线端到端场景
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

use std::collections::VecDeque;

use kanshou::{
  DetectionPipeline, EncodedTensor, EngineError, EngineMetadata, FrameStatus, InferenceEngine,
  PipelineConfig, PipelineError, RawFrame, TensorElementType, TensorSpec, model::Model,
};

const INPUT_SIZE: u32 = 8;
const MAX_DETECTIONS: usize = 10;
const PERSON: u32 = 1;

/// 一行脚本化输出：`[y_min, x_min, y_max, x_max]`、类别、置信度
type Row = ([f32; 4], f32, f32);

enum Step {
  Rows(Vec<Row>),
  Count(f32, Vec<Row>),
  Fault(&'static str),
}

/// 按脚本逐帧返回输出的引擎
struct ScriptedEngine {
  metadata: EngineMetadata,
  script: VecDeque<Step>,
  released: bool,
  seen: Vec<EncodedTensor>,
}

impl ScriptedEngine {
  fn new(element_type: TensorElementType, script: Vec<Step>) -> Self {
    let s = INPUT_SIZE as usize;
    Self {
      metadata: EngineMetadata {
        input: TensorSpec::new([1, s, s, 3], element_type),
        outputs: vec![
          TensorSpec::new([1, MAX_DETECTIONS, 4], TensorElementType::Float32),
          TensorSpec::new([1, MAX_DETECTIONS], TensorElementType::Float32),
          TensorSpec::new([1, MAX_DETECTIONS], TensorElementType::Float32),
          TensorSpec::new([1], TensorElementType::Float32),
        ],
      },
      script: script.into(),
      released: false,
      seen: Vec::new(),
    }
  }

  fn uint8(script: Vec<Step>) -> Self {
    Self::new(TensorElementType::UInt8, script)
  }
}

fn write_rows(rows: &[Row], count: f32, outputs: &mut [Vec<f32>]) {
  for v in outputs.iter_mut() {
    v.fill(0.0);
  }
  for (i, (bbox, class_id, score)) in rows.iter().enumerate() {
    outputs[0][i * 4..i * 4 + 4].copy_from_slice(bbox);
    outputs[1][i] = *class_id;
    outputs[2][i] = *score;
  }
  outputs[3][0] = count;
}

impl InferenceEngine for ScriptedEngine {
  fn metadata(&self) -> &EngineMetadata {
    &self.metadata
  }

  fn run(&mut self, input: &EncodedTensor, outputs: &mut [Vec<f32>]) -> Result<(), EngineError> {
    if self.released {
      return Err(EngineError::NotReady);
    }
    self.seen.push(input.clone());
    match self.script.pop_front() {
      Some(Step::Rows(rows)) => write_rows(&rows, rows.len() as f32, outputs),
      Some(Step::Count(count, rows)) => write_rows(&rows, count, outputs),
      Some(Step::Fault(msg)) => return Err(EngineError::Fault(msg.to_string())),
      None => write_rows(&[], 0.0, outputs),
    }
    Ok(())
  }

  fn release(&mut self) {
    self.released = true;
  }
}

fn config() -> PipelineConfig {
  PipelineConfig::new(PERSON)
    .with_model_input_size(INPUT_SIZE)
    .with_max_detections(MAX_DETECTIONS)
    .with_confidence_threshold(0.5)
    .with_nms_iou_threshold(0.6)
    .with_min_box_pixels(10.0)
}

fn frame() -> RawFrame {
  let data = (0..100 * 100 * 3).map(|i| (i % 251) as u8).collect();
  RawFrame::from_rgb(100, 100, data).unwrap()
}

fn pipeline(script: Vec<Step>) -> DetectionPipeline<ScriptedEngine> {
  DetectionPipeline::new(ScriptedEngine::uint8(script), config()).unwrap()
}

fn confidences(result: &kanshou::DetectionResult) -> Vec<f32> {
  result.detections.iter().map(|d| d.confidence()).collect()
}

#[test]
fn overlapping_boxes_keep_the_most_confident() {
  // 上半幅与其顶部 70%，IoU = 0.7
  let mut pipeline = pipeline(vec![Step::Rows(vec![
    ([0.0, 0.0, 0.5, 1.0], 1.0, 0.9),
    ([0.0, 0.0, 0.35, 1.0], 1.0, 0.85),
  ])]);

  let result = pipeline.process(&frame()).unwrap();
  assert_eq!(result.status, FrameStatus::Ok);
  assert_eq!(confidences(&result), vec![0.9]);
}

#[test]
fn disjoint_boxes_are_both_kept_in_confidence_order() {
  let mut pipeline = pipeline(vec![Step::Rows(vec![
    ([0.5, 0.0, 1.0, 1.0], 1.0, 0.85),
    ([0.0, 0.0, 0.5, 1.0], 1.0, 0.9),
  ])]);

  let result = pipeline.process(&frame()).unwrap();
  assert_eq!(confidences(&result), vec![0.9, 0.85]);
  assert_eq!(result.image_width, 100);
  assert_eq!(result.image_height, 100);
}

#[test]
fn other_classes_are_ignored() {
  let mut pipeline = pipeline(vec![Step::Rows(vec![([0.0, 0.0, 0.5, 0.5], 3.0, 0.99)])]);

  let result = pipeline.process(&frame()).unwrap();
  assert!(result.is_empty());
  assert!(!result.is_degraded());
}

#[test]
fn tiny_boxes_are_dropped() {
  // 宽 5 像素
  let mut pipeline = pipeline(vec![Step::Rows(vec![([0.0, 0.0, 0.5, 0.05], 1.0, 0.99)])]);

  let result = pipeline.process(&frame()).unwrap();
  assert!(result.is_empty());
}

#[test]
fn zero_count_yields_empty_result_with_latency() {
  // 行内容存在，但计数为 0 时不应读取
  let mut pipeline = pipeline(vec![Step::Count(0.0, vec![(
    [0.0, 0.0, 0.5, 1.0],
    1.0,
    0.9,
  )])]);

  let result = pipeline.process(&frame()).unwrap();
  assert!(result.is_empty());
  assert_eq!(result.status, FrameStatus::Ok);
  assert!(result.latency_ms >= 0.0);
}

#[test]
fn count_larger_than_capacity_is_clamped() {
  let rows = vec![([0.0, 0.0, 0.5, 1.0], 1.0, 0.9)];
  let mut pipeline = pipeline(vec![Step::Count(1e6, rows)]);

  let result = pipeline.process(&frame()).unwrap();
  assert_eq!(confidences(&result), vec![0.9]);
}

#[test]
fn engine_fault_degrades_single_frame() {
  let mut pipeline = pipeline(vec![
    Step::Fault("delegate crashed"),
    Step::Rows(vec![([0.0, 0.0, 0.5, 1.0], 1.0, 0.9)]),
  ]);

  let first = pipeline.process(&frame()).unwrap();
  assert!(first.is_empty());
  assert!(first.is_degraded());
  assert!(matches!(
    &first.status,
    FrameStatus::InferenceFailed(msg) if msg == "delegate crashed"
  ));
  assert!(first.latency_ms >= 0.0);

  let second = pipeline.process(&frame()).unwrap();
  assert_eq!(second.status, FrameStatus::Ok);
  assert_eq!(second.len(), 1);
}

#[test]
fn released_pipeline_reports_not_ready() {
  let mut pipeline = pipeline(Vec::new());
  assert!(pipeline.is_ready());

  pipeline.release();
  assert!(!pipeline.is_ready());
  assert_eq!(
    pipeline.process(&frame()),
    Err(PipelineError::EngineNotReady)
  );
  // 重复释放无副作用
  pipeline.release();
}

#[test]
fn empty_frame_is_rejected_before_inference() {
  let mut pipeline = pipeline(Vec::new());
  let empty = RawFrame::from_rgb(0, 0, Vec::new()).unwrap();

  assert_eq!(
    pipeline.process(&empty),
    Err(PipelineError::InvalidImage {
      width: 0,
      height: 0
    })
  );
}

#[test]
fn requested_encoding_must_match_engine() {
  let config = config().with_element_encoding(Some(kanshou::ElementEncoding::Float32));
  let err = DetectionPipeline::new(ScriptedEngine::uint8(Vec::new()), config)
    .err()
    .unwrap();
  assert!(matches!(err, PipelineError::ConfigurationMismatch(_)));
}

#[test]
fn input_size_must_match_engine() {
  let config = config().with_model_input_size(INPUT_SIZE * 2);
  let err = DetectionPipeline::new(ScriptedEngine::uint8(Vec::new()), config)
    .err()
    .unwrap();
  assert!(matches!(err, PipelineError::ConfigurationMismatch(_)));
}

#[test]
fn output_capacity_must_match_engine() {
  let config = config().with_max_detections(MAX_DETECTIONS + 1);
  let err = DetectionPipeline::new(ScriptedEngine::uint8(Vec::new()), config)
    .err()
    .unwrap();
  assert!(matches!(err, PipelineError::ConfigurationMismatch(_)));
}

#[test]
fn unsupported_engine_encoding_is_rejected() {
  let engine = ScriptedEngine::new(TensorElementType::Int8, Vec::new());
  let err = DetectionPipeline::new(engine, config()).err().unwrap();
  assert!(matches!(err, PipelineError::UnsupportedEncoding(_)));
}

#[test]
fn invalid_thresholds_fail_at_construction() {
  let config = config().with_nms_iou_threshold(1.2);
  let err = DetectionPipeline::new(ScriptedEngine::uint8(Vec::new()), config)
    .err()
    .unwrap();
  assert!(matches!(err, PipelineError::ConfigurationMismatch(_)));
}

#[test]
fn float_engine_receives_normalized_input() {
  let mut engine = ScriptedEngine::new(
    TensorElementType::Float32,
    vec![Step::Rows(vec![([0.0, 0.0, 0.5, 1.0], 1.0, 0.9)])],
  );
  // 与模型输入同尺寸，像素不经插值
  let size = INPUT_SIZE as usize;
  let frame = RawFrame::from_rgb(INPUT_SIZE, INPUT_SIZE, vec![51; size * size * 3]).unwrap();
  {
    let config = config().with_min_box_pixels(1.0);
    let mut pipeline = DetectionPipeline::new(&mut engine, config).unwrap();
    let result = pipeline.infer(&frame).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.detections[0].bbox().width(), 4.0);
  }

  let values = engine.seen[0].as_f32().unwrap();
  assert_eq!(values.len(), size * size * 3);
  assert!(values.iter().all(|v| (v + 0.6).abs() < 1e-6));
}

#[test]
fn resized_float_input_stays_in_unit_range() {
  let mut engine = ScriptedEngine::new(TensorElementType::Float32, Vec::new());
  let white = RawFrame::from_rgb(20, 10, vec![255; 20 * 10 * 3]).unwrap();
  {
    let mut pipeline = DetectionPipeline::new(&mut engine, config()).unwrap();
    let result = pipeline.process(&white).unwrap();
    assert_eq!(result.status, FrameStatus::Ok);
    assert!(result.is_empty());
  }

  let values = engine.seen[0].as_f32().unwrap();
  assert!(values.iter().all(|v| *v <= 1.0 && (v - 1.0).abs() <= 1.0 / 127.5 + 1e-6));
}

#[test]
fn engine_sees_one_tensor_per_frame() {
  let mut engine = ScriptedEngine::uint8(Vec::new());
  let frame = frame();
  {
    let mut pipeline = DetectionPipeline::new(&mut engine, config()).unwrap();
    for _ in 0..3 {
      pipeline.process(&frame).unwrap();
    }
  }
  assert_eq!(engine.seen.len(), 3);
  assert!(engine.seen.windows(2).all(|w| w[0] == w[1]));
  let expected = (INPUT_SIZE * INPUT_SIZE * 3) as usize;
  assert_eq!(engine.seen[0].len(), expected);
}
