// 该文件是 Shanan （山南西风） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use url::Url;

use shanan_report::config::{
  DEFAULT_MAX_IMAGE_PX, DEFAULT_PORT, DEFAULT_TITLE, FailurePolicy, ReportConfig, ServerConfig,
};

/// 车辆损伤批量检测报告
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 启动 HTTP 服务
  Serve {
    #[command(flatten)]
    pipeline: PipelineArgs,
    #[command(flatten)]
    server: ServerArgs,
  },
  /// 从本地图片直接生成报告
  Report {
    #[command(flatten)]
    pipeline: PipelineArgs,
    /// 输出 PDF 路径
    #[arg(long, short, value_name = "FILE", default_value = "damage_report.pdf")]
    output: PathBuf,
    /// 输入图片，按给定顺序编号
    #[arg(required = true, value_name = "IMAGE")]
    images: Vec<PathBuf>,
  },
}

#[derive(ClapArgs, Debug)]
pub struct PipelineArgs {
  /// 检测模型 URL，例如 command:///usr/bin/python3?arg=detect.py 或 yolo26:///models/damage.rknn
  #[arg(long, value_name = "MODEL", env = "SHANAN_MODEL")]
  pub model: Url,
  /// 类别表文件，每行一个类别
  #[arg(long, value_name = "FILE", env = "SHANAN_LABELS")]
  pub labels: Option<PathBuf>,
  /// 请求临时目录的根目录
  #[arg(long, value_name = "DIR", env = "SHANAN_TEMP_DIR")]
  pub temp_dir: Option<PathBuf>,
  /// 单张图片检测失败时的处理方式
  #[arg(long, value_enum, default_value_t = FailurePolicy::Abort, env = "SHANAN_FAILURE_POLICY")]
  pub failure_policy: FailurePolicy,
  /// 单张图片检测超时（秒）
  #[arg(long, value_name = "SECS", env = "SHANAN_DETECT_TIMEOUT")]
  pub detect_timeout: Option<u64>,
  /// 嵌入报告前图片最长边的像素上限
  #[arg(long, value_name = "PX", default_value_t = DEFAULT_MAX_IMAGE_PX, env = "SHANAN_MAX_IMAGE_PX")]
  pub max_image_px: u32,
  /// 报告标题
  #[arg(long, default_value = DEFAULT_TITLE, env = "SHANAN_TITLE")]
  pub title: String,
  /// PDF 中非 ASCII 文本使用的 TrueType 字体，默认内置 DejaVu Sans（不含中日韩字形）
  #[arg(long, value_name = "FILE", env = "SHANAN_PDF_FONT")]
  pub pdf_font: Option<PathBuf>,
  /// 模型没有产出可视化结果时自行绘制检测框
  #[arg(long, env = "SHANAN_DRAW_MISSING_ANNOTATIONS")]
  pub draw_missing_annotations: bool,
}

impl PipelineArgs {
  pub fn detect_timeout(&self) -> Option<Duration> {
    self.detect_timeout.map(Duration::from_secs)
  }

  pub fn report_config(&self) -> ReportConfig {
    let defaults = ReportConfig::default();
    ReportConfig {
      temp_root: self.temp_dir.clone().unwrap_or(defaults.temp_root),
      failure_policy: self.failure_policy,
      detect_timeout: self.detect_timeout(),
      title: self.title.clone(),
      max_image_px: self.max_image_px,
      ..defaults
    }
  }
}

#[derive(ClapArgs, Debug)]
pub struct ServerArgs {
  #[arg(long, default_value = "0.0.0.0", env = "SHANAN_HOST")]
  pub host: IpAddr,
  #[arg(long, short, default_value_t = DEFAULT_PORT, env = "SHANAN_PORT")]
  pub port: u16,
  /// 请求体上限（MiB）
  #[arg(long, value_name = "MIB", default_value_t = 100, env = "SHANAN_MAX_UPLOAD_MB")]
  pub max_upload_mb: usize,
}

impl ServerArgs {
  pub fn server_config(&self) -> ServerConfig {
    ServerConfig {
      host: self.host,
      port: self.port,
      max_upload_bytes: self.max_upload_mb * 1024 * 1024,
    }
  }
}
