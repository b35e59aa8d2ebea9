// 该文件是 Kanshou （看守） 项目的一部分。
// src/bin/simple_continueshot.rs - 持续监控
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

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use kanshou::{
  FromUrl,
  args::PipelineArgs,
  input::InputWrapper,
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};
use tracing::info;

/// 持续读取输入并检测，Ctrl-C 退出
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub pipeline: PipelineArgs,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
  /// 两次推理之间的最小间隔（毫秒），间隔内到达的帧被跳过
  #[arg(long, value_name = "MILLIS")]
  pub interval_ms: Option<u64>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.pipeline.model);
  info!("输入来源: {}", args.pipeline.input);
  info!("输出路径: {}", args.pipeline.output);

  let input = InputWrapper::from_url(&args.pipeline.input)?;
  let pipeline = args.pipeline.build_pipeline()?;
  let output = OutputWrapper::from_url(&args.pipeline.output)?;

  ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .with_interval(args.interval_ms.map(Duration::from_millis))
    .with_ctrlc()
    .run_task(input, pipeline, output)?;

  Ok(())
}
