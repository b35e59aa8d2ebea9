// 该文件是 Kanshou （看守） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::{
  path::PathBuf,
  sync::atomic::{AtomicU16, Ordering},
};

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RawFrame,
  output::Render,
  pipeline::DetectionResult,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct FrameRecord<'a> {
  timestamp: String,
  frame_id: u16,
  #[serde(flatten)]
  result: &'a DetectionResult,
}

/// 把每帧结果以 JSON 写入按日期分层的目录
///
/// `folder:///var/lib/kanshou` 只记录有目标的帧，加上 `?always` 则记录所有帧。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      frame_counter: AtomicU16::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self, now: &DateTime<Utc>, frame_id: u16) -> Result<PathBuf, std::io::Error> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!("{}-{:04X}.json", now.format("%H-%M-%S"), frame_id)))
  }
}

impl Render<RawFrame, DetectionResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, _frame: &RawFrame, result: &DetectionResult) -> Result<(), Self::Error> {
    let frame_id = self.frame_id();
    if !self.always && result.is_empty() {
      return Ok(());
    }

    let now = Utc::now();
    let path = self.frame_path(&now, frame_id)?;
    let record = FrameRecord {
      timestamp: now.to_rfc3339(),
      frame_id,
      result,
    };
    std::fs::write(&path, serde_json::to_vec_pretty(&record)?)?;
    debug!("记录写入: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    pipeline::FrameStatus,
    postprocess::{BoundingBox, Detection},
  };
  use std::path::Path;

  fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        collect_files(&path, out);
      } else {
        out.push(path);
      }
    }
  }

  fn output_for(dir: &tempfile::TempDir, query: &str) -> DirectoryRecordOutput {
    let url = url::Url::parse(&format!("folder://{}{}", dir.path().display(), query)).unwrap();
    DirectoryRecordOutput::from_url(&url).unwrap()
  }

  fn result(detections: Vec<Detection>) -> DetectionResult {
    DetectionResult {
      detections,
      latency_ms: 12.5,
      image_width: 640,
      image_height: 480,
      status: FrameStatus::Ok,
    }
  }

  #[test]
  fn records_frames_with_detections() {
    let dir = tempfile::tempdir().unwrap();
    let output = output_for(&dir, "");
    let frame = RawFrame::from_rgb(1, 1, vec![0, 0, 0]).unwrap();
    let det = Detection::new(
      BoundingBox {
        left: 10.0,
        top: 20.0,
        right: 110.0,
        bottom: 220.0,
      },
      0.875,
    );

    output.render_result(&frame, &result(vec![det])).unwrap();

    let mut files = Vec::new();
    collect_files(dir.path(), &mut files);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].extension().and_then(|e| e.to_str()), Some("json"));

    let json: serde_json::Value =
      serde_json::from_slice(&std::fs::read(&files[0]).unwrap()).unwrap();
    assert_eq!(json["frame_id"], 1);
    assert_eq!(json["image_width"], 640);
    assert_eq!(json["status"]["kind"], "ok");
    assert_eq!(json["detections"][0]["confidence"], 0.875);
    assert_eq!(json["detections"][0]["bbox"]["right"], 110.0);
  }

  #[test]
  fn skips_empty_frames_unless_always() {
    let frame = RawFrame::from_rgb(1, 1, vec![0, 0, 0]).unwrap();

    let dir = tempfile::tempdir().unwrap();
    output_for(&dir, "")
      .render_result(&frame, &result(Vec::new()))
      .unwrap();
    let mut files = Vec::new();
    collect_files(dir.path(), &mut files);
    assert!(files.is_empty());

    let dir = tempfile::tempdir().unwrap();
    output_for(&dir, "?always")
      .render_result(&frame, &result(Vec::new()))
      .unwrap();
    let mut files = Vec::new();
    collect_files(dir.path(), &mut files);
    assert_eq!(files.len(), 1);
  }
}
