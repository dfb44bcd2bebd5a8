// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 报告与服务配置
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

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

pub const DEFAULT_TITLE: &str = "Damage Detection Report";
pub const DEFAULT_MAX_IMAGE_PX: u32 = 1600;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;
pub const DEFAULT_PORT: u16 = 5000;

/// 单张图片检测失败时的处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum FailurePolicy {
  /// 整批失败
  #[default]
  Abort,
  /// 丢弃失败图片，其余图片重新编号
  Skip,
  /// 保留失败图片，生成占位证据页
  Placeholder,
}

impl fmt::Display for FailurePolicy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FailurePolicy::Abort => write!(f, "abort"),
      FailurePolicy::Skip => write!(f, "skip"),
      FailurePolicy::Placeholder => write!(f, "placeholder"),
    }
  }
}

/// 封面上的保单信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDetails {
  pub policy_types: Vec<String>,
  /// 续保间隔（月）
  pub renewal_months: u32,
}

impl Default for PolicyDetails {
  fn default() -> Self {
    Self {
      policy_types: [
        "Comprehensive",
        "Zero Depreciation",
        "Own Damage",
        "Third-Party Liability Insurance",
        "Collision Insurance",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      renewal_months: 12,
    }
  }
}

#[derive(Debug, Clone)]
pub struct ReportConfig {
  /// 每个请求的临时目录建在这里
  pub temp_root: PathBuf,
  pub failure_policy: FailurePolicy,
  pub detect_timeout: Option<Duration>,
  pub title: String,
  pub policy: PolicyDetails,
  /// 嵌入报告前图片最长边的像素上限
  pub max_image_px: u32,
}

impl Default for ReportConfig {
  fn default() -> Self {
    Self {
      temp_root: std::env::temp_dir(),
      failure_policy: FailurePolicy::default(),
      detect_timeout: None,
      title: DEFAULT_TITLE.to_string(),
      policy: PolicyDetails::default(),
      max_image_px: DEFAULT_MAX_IMAGE_PX,
    }
  }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
  pub host: IpAddr,
  pub port: u16,
  pub max_upload_bytes: usize,
}

impl ServerConfig {
  pub fn addr(&self) -> SocketAddr {
    SocketAddr::new(self.host, self.port)
  }
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
      port: DEFAULT_PORT,
      max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults() {
    let config = ReportConfig::default();
    assert_eq!(config.failure_policy, FailurePolicy::Abort);
    assert_eq!(config.title, "Damage Detection Report");
    assert_eq!(config.policy.policy_types.len(), 5);
    assert!(config.detect_timeout.is_none());

    let server = ServerConfig::default();
    assert_eq!(server.addr().port(), 5000);
    assert_eq!(server.max_upload_bytes, 100 * 1024 * 1024);
  }

  #[test]
  fn failure_policy_parses_from_cli_names() {
    assert_eq!(
      FailurePolicy::from_str("placeholder", true).unwrap(),
      FailurePolicy::Placeholder
    );
    assert_eq!(FailurePolicy::Skip.to_string(), "skip");
  }
}
