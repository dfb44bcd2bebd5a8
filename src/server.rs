// 该文件是 Shanan （山南西风） 项目的一部分。
// src/server.rs - HTTP 服务
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

use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::chart::ChartRenderer;
use crate::composer::{ComposeError, ReportComposer, Upload};
use crate::config::ServerConfig;
use crate::detection::DetectionModel;

pub const REPORT_ROUTE: &str = "/detection-report";

#[derive(Debug, Serialize)]
pub struct ErrorBody {
  pub error: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
  #[error(transparent)]
  Compose(#[from] ComposeError),
  #[error("Malformed upload: {0}")]
  Multipart(#[from] MultipartError),
  #[error("Internal error: {0}")]
  Internal(String),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::Compose(ComposeError::Validation(e)) => (StatusCode::BAD_REQUEST, e.to_string()),
      ApiError::Compose(e @ ComposeError::UnreadableImage { .. }) => {
        (StatusCode::BAD_REQUEST, e.to_string())
      }
      ApiError::Compose(e @ ComposeError::Detection { .. }) => {
        warn!("检测失败: {}", e);
        (StatusCode::BAD_GATEWAY, e.to_string())
      }
      ApiError::Multipart(e) => {
        let status = e.status();
        warn!("上传解析失败 ({}): {}", status, e);
        let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
          "Upload exceeds the size limit.".to_string()
        } else {
          format!("Malformed upload: {}", e)
        };
        (status, message)
      }
      ApiError::Compose(e) => {
        error!("报告生成内部错误: {}", e);
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          "Failed to generate the report.".to_string(),
        )
      }
      ApiError::Internal(detail) => {
        error!("内部错误: {}", detail);
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          "Failed to generate the report.".to_string(),
        )
      }
    };
    (status, Json(ErrorBody { error: message })).into_response()
  }
}

pub fn router<M, C>(composer: Arc<ReportComposer<M, C>>, config: &ServerConfig) -> Router
where
  M: DetectionModel + Send + Sync + 'static,
  C: ChartRenderer + Send + Sync + 'static,
{
  Router::new()
    .route(REPORT_ROUTE, post(detection_report::<M, C>))
    .layer(DefaultBodyLimit::max(config.max_upload_bytes))
    .layer(CorsLayer::permissive())
    .layer(TraceLayer::new_for_http())
    .with_state(composer)
}

/// 带文件名的分段都视为上传文件，按顺序收集
async fn collect_uploads(mut multipart: Multipart) -> Result<Vec<Upload>, ApiError> {
  let mut uploads = Vec::new();
  while let Some(field) = multipart.next_field().await? {
    let Some(filename) = field.file_name().map(str::to_string) else {
      continue;
    };
    let bytes = field.bytes().await?;
    uploads.push(Upload::new(filename, bytes.to_vec()));
  }
  Ok(uploads)
}

async fn detection_report<M, C>(
  State(composer): State<Arc<ReportComposer<M, C>>>,
  multipart: Multipart,
) -> Result<Response, ApiError>
where
  M: DetectionModel + Send + Sync + 'static,
  C: ChartRenderer + Send + Sync + 'static,
{
  let uploads = collect_uploads(multipart).await?;
  info!("收到 {} 个上传文件", uploads.len());

  let artifact = tokio::task::spawn_blocking(move || composer.compose(&uploads))
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

  Ok(
    (
      StatusCode::OK,
      [
        (header::CONTENT_TYPE, artifact.content_type.to_string()),
        (
          header::CONTENT_DISPOSITION,
          format!("attachment; filename=\"{}\"", artifact.filename),
        ),
      ],
      artifact.bytes,
    )
      .into_response(),
  )
}

pub async fn serve<M, C>(composer: Arc<ReportComposer<M, C>>, config: &ServerConfig) -> std::io::Result<()>
where
  M: DetectionModel + Send + Sync + 'static,
  C: ChartRenderer + Send + Sync + 'static,
{
  let listener = TcpListener::bind(config.addr()).await?;
  info!("服务监听: http://{}{}", listener.local_addr()?, REPORT_ROUTE);
  axum::serve(listener, router(composer, config))
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!("服务已停止");
  Ok(())
}

async fn shutdown_signal() {
  match tokio::signal::ctrl_c().await {
    Ok(()) => info!("收到 Ctrl+C 信号，正在停止服务..."),
    Err(e) => error!("无法监听 Ctrl+C 信号: {}", e),
  }
}
