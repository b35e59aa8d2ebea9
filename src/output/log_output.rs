// 该文件是 Kanshou （看守） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use std::convert::Infallible;

use tracing::{info, warn};

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RawFrame,
  output::Render,
  pipeline::{DetectionResult, FrameStatus},
};

/// 只把检测结果写入日志
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOutput;

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = Infallible;

  fn from_url(_url: &url::Url) -> Result<Self, Self::Error> {
    Ok(LogOutput)
  }
}

impl Render<RawFrame, DetectionResult> for LogOutput {
  type Error = Infallible;

  fn render_result(&self, _frame: &RawFrame, result: &DetectionResult) -> Result<(), Self::Error> {
    if let FrameStatus::InferenceFailed(msg) = &result.status {
      warn!("本帧推理失败: {}", msg);
      return Ok(());
    }

    info!(
      "检测到 {} 个目标 ({}x{}, {:.2} ms)",
      result.len(),
      result.image_width,
      result.image_height,
      result.latency_ms
    );
    for det in &result.detections {
      let b = det.bbox();
      info!(
        "  - {:.2}% at ({:.0}, {:.0}, {:.0}, {:.0})",
        det.confidence() * 100.0,
        b.left,
        b.top,
        b.right,
        b.bottom
      );
    }
    Ok(())
  }
}
