// 该文件是 Shanan （山南西风） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use shanan_report::chart::BarChart;
use shanan_report::detection::{Annotator, ModelWrapper, Vocabulary};
use shanan_report::report::PdfCanvas;
use shanan_report::{Detector, FromUrl, ReportComposer, Upload};

use args::{Args, Command, PipelineArgs};

fn build_composer(pipeline: &PipelineArgs) -> Result<ReportComposer<ModelWrapper>> {
  info!("模型: {}", pipeline.model);
  let model = ModelWrapper::from_url(&pipeline.model)?.with_timeout(pipeline.detect_timeout());

  let vocabulary = match &pipeline.labels {
    Some(path) => Vocabulary::from_file(path)?,
    None => {
      warn!("未指定类别表，类别将显示为 class_<id>");
      Vocabulary::default()
    }
  };

  let mut detector = Detector::new(model, vocabulary);
  if pipeline.draw_missing_annotations {
    detector = detector.with_annotator(Annotator::new()?);
  }

  let config = pipeline.report_config();
  info!(
    "失败策略: {}, 临时目录: {}",
    config.failure_policy,
    config.temp_root.display()
  );
  let mut composer = ReportComposer::new(detector, BarChart::new()?, config);
  if let Some(path) = &pipeline.pdf_font {
    info!("PDF 字体: {}", path.display());
    let font = std::fs::read(path).with_context(|| format!("无法读取字体 {}", path.display()))?;
    composer = composer.with_canvas(PdfCanvas::with_font(font));
  }
  Ok(composer)
}

fn read_upload(path: &Path) -> Result<Upload> {
  let bytes = std::fs::read(path).with_context(|| format!("无法读取 {}", path.display()))?;
  let filename = path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_default();
  Ok(Upload::new(filename, bytes))
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  match args.command {
    Command::Serve { pipeline, server } => {
      let composer = Arc::new(build_composer(&pipeline)?);
      let config = server.server_config();
      let runtime = tokio::runtime::Runtime::new()?;
      runtime.block_on(shanan_report::server::serve(composer, &config))?;
    }
    Command::Report {
      pipeline,
      output,
      images,
    } => {
      let composer = build_composer(&pipeline)?;
      let uploads = images
        .iter()
        .map(|path| read_upload(path))
        .collect::<Result<Vec<_>>>()?;

      let artifact = composer.compose(&uploads)?;
      std::fs::write(&output, &artifact.bytes)
        .with_context(|| format!("无法写入 {}", output.display()))?;
      info!("报告已写入: {}", output.display());
    }
  }

  Ok(())
}
