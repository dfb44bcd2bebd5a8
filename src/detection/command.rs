// 该文件是 Shanan （山南西风） 项目的一部分。
// src/detection/command.rs - 外部命令检测后端
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

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::runtime::{Builder, Handle};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detection::{DetectionModel, ModelOutput, RawDetection},
};

/// 单个输出流保留的最大字节数，超出部分读出后丢弃
const MAX_OUTPUT_BYTES: u64 = 4 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum CommandModelError {
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
  #[error("model path error: {0}")]
  ModelPathError(String),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("detector exited with {status}: {stderr}")]
  ExitStatus { status: ExitStatus, stderr: String },
  #[error("detector timed out after {0:?}")]
  Timeout(Duration),
  #[error("unreadable detector output: {0}")]
  ParseError(#[from] serde_json::Error),
}

/// 外部检测程序
///
/// 以 `program [args...] <image_path> <output_dir>` 方式调用，
/// 标准输出为 JSON：
///
/// ```json
/// {"detections": [{"class_id": 0, "confidence": 0.87, "bbox": [cx, cy, w, h]}],
///  "annotated": "runs/photo.jpg"}
/// ```
pub struct CommandModel {
  program: PathBuf,
  args: Vec<String>,
  timeout: Option<Duration>,
}

#[derive(Deserialize)]
struct CommandReply {
  #[serde(default)]
  detections: Vec<RawDetection>,
  #[serde(default)]
  annotated: Option<PathBuf>,
}

impl FromUrlWithScheme for CommandModel {
  const SCHEME: &'static str = "command";
}

impl FromUrl for CommandModel {
  type Error = CommandModelError;

  /// `command:///usr/bin/python3?arg=detect.py&arg=--weights=best.pt`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(CommandModelError::SchemeMismatch(format!(
        "expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let program = url.path();
    if program.is_empty() || program == "/" {
      return Err(CommandModelError::ModelPathError(
        "command URL has no program path".to_string(),
      ));
    }

    let args = url
      .query_pairs()
      .filter(|(k, _)| k == "arg")
      .map(|(_, v)| v.into_owned())
      .collect();

    Ok(CommandModel {
      program: PathBuf::from(program),
      args,
      timeout: None,
    })
  }
}

impl CommandModel {
  pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
    Self {
      program: program.into(),
      args,
      timeout: None,
    }
  }

  pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  fn spawn(&self, image_path: &Path, output_dir: &Path) -> Result<Child, CommandModelError> {
    debug!(
      "启动检测程序: {} {:?} {} {}",
      self.program.display(),
      self.args,
      image_path.display(),
      output_dir.display()
    );
    Ok(
      Command::new(&self.program)
        .args(&self.args)
        .arg(image_path)
        .arg(output_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?,
    )
  }

  /// 等待退出并收集输出，超时覆盖整个过程
  ///
  /// 超时后子进程随 `Child` 一起被丢弃并终止。
  async fn run(
    &self,
    image_path: &Path,
    output_dir: &Path,
  ) -> Result<(ExitStatus, Vec<u8>, Vec<u8>), CommandModelError> {
    let mut child = self.spawn(image_path, output_dir)?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let collect = async move {
      let (status, stdout, stderr) =
        tokio::join!(child.wait(), read_capped(stdout), read_capped(stderr));
      Ok::<_, std::io::Error>((status?, stdout?, stderr?))
    };

    match self.timeout {
      None => Ok(collect.await?),
      Some(timeout) => match tokio::time::timeout(timeout, collect).await {
        Ok(collected) => Ok(collected?),
        Err(_) => {
          error!("检测程序超时 ({:?})，终止进程", timeout);
          Err(CommandModelError::Timeout(timeout))
        }
      },
    }
  }
}

async fn read_capped<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
  let mut buf = Vec::new();
  let Some(mut pipe) = pipe else {
    return Ok(buf);
  };
  (&mut pipe).take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await?;
  let discarded = tokio::io::copy(&mut pipe, &mut tokio::io::sink()).await?;
  if discarded > 0 {
    warn!("检测程序输出过长，丢弃 {} 字节", discarded);
  }
  Ok(buf)
}

/// 服务端在 `spawn_blocking` 线程中调用，复用所在运行时；
/// 命令行没有运行时，临时创建单线程运行时
fn block_on<F: Future>(future: F) -> Result<F::Output, CommandModelError> {
  match Handle::try_current() {
    Ok(handle) => Ok(handle.block_on(future)),
    Err(_) => Ok(
      Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(future),
    ),
  }
}

impl DetectionModel for CommandModel {
  type Error = CommandModelError;

  fn infer(&self, image_path: &Path, output_dir: &Path) -> Result<ModelOutput, Self::Error> {
    std::fs::create_dir_all(output_dir)?;

    let now = Instant::now();
    let (status, stdout, stderr) = block_on(self.run(image_path, output_dir))??;
    info!("检测程序完成，耗时: {:.2?}", now.elapsed());

    if !status.success() {
      return Err(CommandModelError::ExitStatus {
        status,
        stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
      });
    }

    let reply: CommandReply = serde_json::from_slice(&stdout)?;
    let annotated = reply.annotated.map(|path| {
      if path.is_relative() {
        output_dir.join(path)
      } else {
        path
      }
    });

    Ok(ModelOutput {
      detections: reply.detections,
      annotated,
    })
  }
}
