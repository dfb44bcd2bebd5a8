// 该文件是 Shanan （山南西风） 项目的一部分。
// src/composer.rs - 批量检测报告流水线
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
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use image::imageops::FilterType;
use image::{ImageReader, Rgb, RgbImage};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::chart::{BarChart, CHART_TITLE, ChartRenderer};
use crate::config::{FailurePolicy, ReportConfig};
use crate::detection::{DetectionError, DetectionModel, Detector};
use crate::report::{
  AnalyticsChartPage, Canvas, ChartContent, CoverSummaryPage, EmbeddedImage, EvidencePage,
  LayoutEngine, PdfCanvas, PolicyBlock, REPORT_CONTENT_TYPE, REPORT_FILENAME, RenderError,
  ReportDocument,
};
use crate::tally::{BatchTally, DetectionOutcome, ImageResult};

pub const ACCEPTED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "tiff"];

const RUNS_DIR: &str = "runs";
const TEMP_PREFIX: &str = "damage-report-";
const UNREADABLE_FILL: Rgb<u8> = Rgb([200, 200, 200]);

/// 一个上传的文件
#[derive(Debug, Clone)]
pub struct Upload {
  pub filename: String,
  pub bytes: Vec<u8>,
}

impl Upload {
  pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
    Self {
      filename: filename.into(),
      bytes: bytes.into(),
    }
  }

  fn has_accepted_extension(&self) -> bool {
    Path::new(&self.filename)
      .extension()
      .and_then(|ext| ext.to_str())
      .map(|ext| ACCEPTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
      .unwrap_or(false)
  }

  /// 落盘文件名，去掉上传方给出的目录部分
  fn stored_name(&self, index: usize) -> String {
    let name = Path::new(&self.filename)
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .filter(|name| !name.is_empty())
      .unwrap_or_else(|| "upload".to_string());
    format!("{:03}-{}", index, name)
  }
}

#[derive(Debug, Clone)]
pub struct ReportArtifact {
  pub bytes: Vec<u8>,
  pub filename: &'static str,
  pub content_type: &'static str,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
  #[error("No files uploaded.")]
  NoFiles,
  #[error("Invalid file type. Only JPEG, PNG, BMP, and TIFF files are allowed.")]
  InvalidFileType { filename: String },
}

#[derive(Error, Debug)]
pub enum ComposeError {
  #[error(transparent)]
  Validation(#[from] ValidationError),
  #[error("detection failed for image {index} ({filename}): {source}")]
  Detection {
    index: usize,
    filename: String,
    #[source]
    source: DetectionError,
  },
  #[error("unreadable image {filename}: {source}")]
  UnreadableImage {
    filename: String,
    #[source]
    source: image::ImageError,
  },
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("render error: {0}")]
  Render(#[from] RenderError),
}

impl ComposeError {
  /// 由请求内容导致的失败，而非服务自身的问题
  pub fn is_rejection(&self) -> bool {
    matches!(
      self,
      ComposeError::Validation(_) | ComposeError::UnreadableImage { .. }
    )
  }
}

/// 流水线阶段，仅用于日志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Validating,
  Detecting { index: usize, total: usize },
  Aggregating,
  Composing,
  Serializing,
  Done,
  Failed,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Stage::Validating => write!(f, "validating"),
      Stage::Detecting { index, total } => write!(f, "detecting {}/{}", index, total),
      Stage::Aggregating => write!(f, "aggregating"),
      Stage::Composing => write!(f, "composing"),
      Stage::Serializing => write!(f, "serializing"),
      Stage::Done => write!(f, "done"),
      Stage::Failed => write!(f, "failed"),
    }
  }
}

/// 全部文件通过校验才继续，否则整批拒绝
pub fn validate(uploads: &[Upload]) -> Result<(), ValidationError> {
  if uploads.is_empty() {
    return Err(ValidationError::NoFiles);
  }
  match uploads.iter().find(|upload| !upload.has_accepted_extension()) {
    Some(upload) => Err(ValidationError::InvalidFileType {
      filename: upload.filename.clone(),
    }),
    None => Ok(()),
  }
}

/// 检测阶段得到的单张图片及其嵌入用位图
struct Processed {
  result: ImageResult,
  original: EmbeddedImage,
  annotated: Option<EmbeddedImage>,
}

pub struct ReportComposer<M, C = BarChart> {
  detector: Detector<M>,
  chart: C,
  layout: LayoutEngine,
  canvas: PdfCanvas,
  config: ReportConfig,
}

impl<M: DetectionModel, C: ChartRenderer> ReportComposer<M, C> {
  pub fn new(detector: Detector<M>, chart: C, config: ReportConfig) -> Self {
    Self {
      detector,
      chart,
      layout: LayoutEngine::default(),
      canvas: PdfCanvas::default(),
      config,
    }
  }

  /// 替换 PDF 画布，例如换用覆盖中日韩字形的字体
  pub fn with_canvas(mut self, canvas: PdfCanvas) -> Self {
    self.canvas = canvas;
    self
  }

  pub fn detector(&self) -> &Detector<M> {
    &self.detector
  }

  pub fn config(&self) -> &ReportConfig {
    &self.config
  }

  /// 生成完整报告
  pub fn compose(&self, uploads: &[Upload]) -> Result<ReportArtifact, ComposeError> {
    let started = Instant::now();
    let result = self.build_document(uploads).and_then(|document| {
      self.enter(Stage::Serializing);
      let plans = self.layout.layout(&document);
      let bytes = self.canvas.render(
        &self.config.title,
        self.layout.width(),
        self.layout.height(),
        &plans,
      )?;
      info!(
        "报告生成完成: {} 个逻辑页, {} 个物理页, {} 字节",
        document.len(),
        plans.len(),
        bytes.len()
      );
      Ok(ReportArtifact {
        bytes,
        filename: REPORT_FILENAME,
        content_type: REPORT_CONTENT_TYPE,
      })
    });

    match &result {
      Ok(_) => {
        self.enter(Stage::Done);
        info!("总耗时: {:.2?}", started.elapsed());
      }
      Err(e) => {
        self.enter(Stage::Failed);
        if e.is_rejection() {
          warn!("请求被拒绝: {}", e);
        } else {
          error!("报告生成失败: {}", e);
        }
      }
    }
    result
  }

  /// 校验、检测、汇总并组装页面，不做序列化
  pub fn build_document(&self, uploads: &[Upload]) -> Result<ReportDocument, ComposeError> {
    self.enter(Stage::Validating);
    validate(uploads)?;

    std::fs::create_dir_all(&self.config.temp_root)?;
    let workspace = tempfile::Builder::new()
      .prefix(TEMP_PREFIX)
      .tempdir_in(&self.config.temp_root)?;
    debug!("请求临时目录: {}", workspace.path().display());

    let processed = self.detect_all(&workspace, uploads)?;

    self.enter(Stage::Aggregating);
    let tally = processed
      .iter()
      .fold(BatchTally::new(), |tally, item| tally.fold(&item.result));
    info!(
      "共 {} 张图片, {} 个检测目标, {} 个类别",
      tally.total_images(),
      tally.total_detections(),
      tally.class_counts().len()
    );

    self.enter(Stage::Composing);
    let document = self.assemble(&tally, processed);
    // 页面只持有内存中的位图，临时目录可以释放
    drop(workspace);
    Ok(document)
  }

  fn enter(&self, stage: Stage) {
    info!("报告阶段: {}", stage);
  }

  fn detect_all(&self, workspace: &TempDir, uploads: &[Upload]) -> Result<Vec<Processed>, ComposeError> {
    let output_dir = workspace.path().join(RUNS_DIR);
    std::fs::create_dir_all(&output_dir)?;

    let total = uploads.len();
    let mut processed = Vec::with_capacity(total);
    for (i, upload) in uploads.iter().enumerate() {
      let index = i + 1;
      self.enter(Stage::Detecting { index, total });

      let path = workspace.path().join(upload.stored_name(index));
      std::fs::write(&path, &upload.bytes)?;

      // 跳过的图片不占序号
      let sequence_index = processed.len() + 1;
      let now = Instant::now();
      let attempt = self.detect_one(index, sequence_index, &path, &output_dir, upload);
      info!("图片 {} 检测耗时: {:.2?}", upload.filename, now.elapsed());

      match attempt {
        Ok(item) => processed.push(item),
        Err(e) => match self.config.failure_policy {
          FailurePolicy::Abort => return Err(e),
          FailurePolicy::Skip => warn!("跳过图片 {}: {}", upload.filename, e),
          FailurePolicy::Placeholder => {
            warn!("图片 {} 检测失败，生成占位页: {}", upload.filename, e);
            let result = ImageResult {
              sequence_index,
              filename: upload.filename.clone(),
              original: path,
              annotated: None,
              outcome: DetectionOutcome::Failed(failure_reason(&e)),
            };
            let original = self.load(&result.original).unwrap_or_else(|_| unreadable());
            processed.push(Processed {
              result,
              original,
              annotated: None,
            });
          }
        },
      }
    }
    Ok(processed)
  }

  fn detect_one(
    &self,
    index: usize,
    sequence_index: usize,
    path: &Path,
    output_dir: &Path,
    upload: &Upload,
  ) -> Result<Processed, ComposeError> {
    let detected = self
      .detector
      .detect(path, output_dir)
      .map_err(|source| ComposeError::Detection {
        index,
        filename: upload.filename.clone(),
        source,
      })?;

    let mut result = ImageResult {
      sequence_index,
      filename: upload.filename.clone(),
      original: path.to_path_buf(),
      annotated: detected.annotated,
      outcome: DetectionOutcome::Detected(detected.detections),
    };

    let original = self
      .load(&result.original)
      .map_err(|source| ComposeError::UnreadableImage {
        filename: upload.filename.clone(),
        source,
      })?;

    // 可视化结果无法解码时按缺失处理
    let annotated = result
      .annotated
      .as_deref()
      .and_then(|annotated| match self.load(annotated) {
        Ok(image) => Some(image),
        Err(e) => {
          warn!("无法读取可视化结果 {}: {}", annotated.display(), e);
          None
        }
      });
    if annotated.is_none() {
      info!("图片 {} 没有可视化结果，使用原图", upload.filename);
      result.annotated = None;
    }

    Ok(Processed {
      result,
      original,
      annotated,
    })
  }

  /// 按内容识别格式读取，并按最长边缩小
  fn load(&self, path: &Path) -> Result<EmbeddedImage, image::ImageError> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    let bound = self.config.max_image_px.max(1);
    let image = if image.width().max(image.height()) > bound {
      debug!(
        "缩小图片 {} ({}x{})",
        path.display(),
        image.width(),
        image.height()
      );
      image.resize(bound, bound, FilterType::Triangle)
    } else {
      image
    };
    Ok(EmbeddedImage::new(image.to_rgb8()))
  }

  fn assemble(&self, tally: &BatchTally, processed: Vec<Processed>) -> ReportDocument {
    let now = chrono::Local::now().naive_local();
    let policy = PolicyBlock::starting(&self.config.policy, now.date());
    let cover = CoverSummaryPage::new(self.config.title.clone(), now, policy, tally);

    let chart = (!tally.is_empty()).then(|| self.chart_page(tally));

    let total = processed.len();
    let evidence = processed
      .into_iter()
      .map(|item| EvidencePage::new(&item.result, total, item.original, item.annotated))
      .collect();

    ReportDocument::build(cover, chart, evidence)
  }

  fn chart_page(&self, tally: &BatchTally) -> AnalyticsChartPage {
    let series = crate::report::series(tally);
    let content = match self.chart.render(CHART_TITLE, &series) {
      Ok(raster) => ChartContent::Raster(Arc::new(raster)),
      Err(e) => {
        warn!("图表渲染失败，改用文字列表: {}", e);
        ChartContent::Unavailable(e.to_string())
      }
    };
    AnalyticsChartPage {
      title: CHART_TITLE.to_string(),
      series,
      content,
    }
  }
}

fn failure_reason(error: &ComposeError) -> String {
  match error {
    ComposeError::Detection { source, .. } => source.to_string(),
    other => other.to_string(),
  }
}

fn unreadable() -> EmbeddedImage {
  EmbeddedImage::new(RgbImage::from_pixel(4, 3, UNREADABLE_FILL))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::chart::ChartError;
  use crate::detection::Vocabulary;
  use crate::detection::testing::{Script, ScriptedModel, raw};
  use crate::report::Page;

  struct FailingChart;

  impl ChartRenderer for FailingChart {
    fn render(&self, _: &str, _: &[(String, usize)]) -> Result<RgbImage, ChartError> {
      Err(ChartError::EmptySeries)
    }
  }

  fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = std::io::Cursor::new(Vec::new());
    RgbImage::from_pixel(width, height, Rgb([120, 130, 140]))
      .write_to(&mut bytes, image::ImageFormat::Png)
      .unwrap();
    bytes.into_inner()
  }

  fn config(temp_root: &Path, failure_policy: FailurePolicy) -> ReportConfig {
    ReportConfig {
      temp_root: temp_root.to_path_buf(),
      failure_policy,
      ..ReportConfig::default()
    }
  }

  fn composer<C: ChartRenderer>(
    model: ScriptedModel,
    chart: C,
    config: ReportConfig,
  ) -> ReportComposer<ScriptedModel, C> {
    let detector = Detector::new(model, Vocabulary::from_iter(["dent", "scratch", "crack"]));
    ReportComposer::new(detector, chart, config)
  }

  fn detect(detections: Vec<crate::detection::RawDetection>) -> Script {
    Script::Detect {
      detections,
      annotate_as: Some("png"),
    }
  }

  fn evidence(document: &ReportDocument) -> Vec<&EvidencePage> {
    document
      .pages()
      .iter()
      .filter_map(|page| match page {
        Page::Evidence(page) => Some(page),
        _ => None,
      })
      .collect()
  }

  fn empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
  }

  #[test]
  fn gif_rejects_whole_batch_before_detection() {
    let root = tempfile::tempdir().unwrap();
    let composer = composer(
      ScriptedModel::default(),
      FailingChart,
      config(root.path(), FailurePolicy::Abort),
    );
    let uploads = [Upload::new("car.jpg", png(8, 8)), Upload::new("photo.gif", vec![0u8; 4])];

    let err = composer.compose(&uploads).unwrap_err();
    assert_eq!(
      err.to_string(),
      "Invalid file type. Only JPEG, PNG, BMP, and TIFF files are allowed."
    );
    assert_eq!(composer.detector().model().call_count(), 0);
    assert!(empty_dir(root.path()));
  }

  #[test]
  fn empty_batch_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let composer = composer(
      ScriptedModel::default(),
      FailingChart,
      config(root.path(), FailurePolicy::Abort),
    );
    assert!(matches!(
      composer.compose(&[]),
      Err(ComposeError::Validation(ValidationError::NoFiles))
    ));
  }

  #[test]
  fn extension_check_ignores_case() {
    assert!(validate(&[Upload::new("CAR.JPEG", vec![]), Upload::new("b.TiFF", vec![])]).is_ok());
    assert!(validate(&[Upload::new("noext", vec![])]).is_err());
  }

  #[test]
  fn three_images_with_one_missing_annotation() {
    let root = tempfile::tempdir().unwrap();
    let model = ScriptedModel::default()
      .on("a.png", detect(vec![raw(0, 0.87), raw(1, 0.42)]))
      .on(
        "b.png",
        Script::Detect {
          detections: vec![raw(1, 0.6)],
          annotate_as: None,
        },
      )
      .on("c.png", detect(vec![]));
    let composer = composer(model, FailingChart, config(root.path(), FailurePolicy::Abort));
    let uploads = [
      Upload::new("a.png", png(40, 30)),
      Upload::new("b.png", png(40, 30)),
      Upload::new("c.png", png(40, 30)),
    ];

    let document = composer.build_document(&uploads).unwrap();
    assert_eq!(document.len(), 2 + 3);
    assert!(matches!(document.pages()[0], Page::CoverSummary(_)));
    assert!(matches!(document.pages()[1], Page::AnalyticsChart(_)));

    let pages = evidence(&document);
    let order: Vec<_> = pages.iter().map(|p| p.sequence_index).collect();
    assert_eq!(order, [1, 2, 3]);
    assert!(!pages[0].detected_is_fallback);
    assert!(pages[1].detected_is_fallback);
    assert_eq!(pages[1].detected, pages[1].original);
    assert!(pages.iter().all(|p| p.total == 3));

    let calls = composer.detector().model().calls.lock().unwrap().clone();
    let names: Vec<_> = calls
      .iter()
      .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
      .collect();
    assert_eq!(names, ["001-a.png", "002-b.png", "003-c.png"]);
    assert!(empty_dir(root.path()));
  }

  #[test]
  fn cover_counts_follow_first_seen_order() {
    let root = tempfile::tempdir().unwrap();
    let model = ScriptedModel::default()
      .on("a.png", detect(vec![raw(1, 0.5)]))
      .on("b.png", detect(vec![raw(0, 0.5), raw(1, 0.5)]));
    let composer = composer(model, FailingChart, config(root.path(), FailurePolicy::Abort));
    let uploads = [Upload::new("a.png", png(8, 8)), Upload::new("b.png", png(8, 8))];

    let document = composer.build_document(&uploads).unwrap();
    match &document.pages()[0] {
      Page::CoverSummary(cover) => {
        assert_eq!(cover.total_images, 2);
        assert_eq!(
          cover.rows,
          [("scratch".to_string(), 2), ("dent".to_string(), 1)]
        );
      }
      other => panic!("unexpected first page: {other:?}"),
    }
    match &document.pages()[1] {
      Page::AnalyticsChart(chart) => {
        assert!(matches!(chart.content, ChartContent::Unavailable(_)));
      }
      other => panic!("unexpected second page: {other:?}"),
    }
  }

  #[test]
  fn no_detections_omits_chart() {
    let root = tempfile::tempdir().unwrap();
    let composer = composer(
      ScriptedModel::default(),
      BarChart::new().unwrap(),
      config(root.path(), FailurePolicy::Abort),
    );
    let uploads = [Upload::new("a.jpg", png(8, 8)), Upload::new("b.jpg", png(8, 8))];

    let document = composer.build_document(&uploads).unwrap();
    assert_eq!(document.len(), 1 + 2);
    assert!(
      !document
        .pages()
        .iter()
        .any(|page| matches!(page, Page::AnalyticsChart(_)))
    );
  }

  #[test]
  fn abort_policy_fails_the_batch_and_cleans_up() {
    let root = tempfile::tempdir().unwrap();
    let model = ScriptedModel::default().on("b.png", Script::Fail("CUDA out of memory"));
    let composer = composer(model, FailingChart, config(root.path(), FailurePolicy::Abort));
    let uploads = [
      Upload::new("a.png", png(8, 8)),
      Upload::new("b.png", png(8, 8)),
      Upload::new("c.png", png(8, 8)),
    ];

    let err = composer.compose(&uploads).unwrap_err();
    match err {
      ComposeError::Detection { index, filename, .. } => {
        assert_eq!(index, 2);
        assert_eq!(filename, "b.png");
      }
      other => panic!("unexpected error: {other}"),
    }
    assert_eq!(composer.detector().model().call_count(), 2);
    assert!(empty_dir(root.path()));
  }

  #[test]
  fn skip_policy_renumbers_survivors() {
    let root = tempfile::tempdir().unwrap();
    let model = ScriptedModel::default()
      .on("a.png", detect(vec![raw(0, 0.9)]))
      .on("b.png", Script::Fail("timeout"));
    let composer = composer(model, FailingChart, config(root.path(), FailurePolicy::Skip));
    let uploads = [
      Upload::new("a.png", png(8, 8)),
      Upload::new("b.png", png(8, 8)),
      Upload::new("c.png", png(8, 8)),
    ];

    let document = composer.build_document(&uploads).unwrap();
    let pages = evidence(&document);
    let numbering: Vec<_> = pages
      .iter()
      .map(|p| (p.sequence_index, p.total, p.filename.as_str()))
      .collect();
    assert_eq!(numbering, [(1, 2, "a.png"), (2, 2, "c.png")]);
  }

  #[test]
  fn skip_policy_with_every_image_failing_leaves_cover_only() {
    let root = tempfile::tempdir().unwrap();
    let model = ScriptedModel::default().on(".png", Script::Fail("boom"));
    let composer = composer(model, FailingChart, config(root.path(), FailurePolicy::Skip));

    let document = composer
      .build_document(&[Upload::new("a.png", png(8, 8))])
      .unwrap();
    assert_eq!(document.len(), 1);
  }

  #[test]
  fn placeholder_policy_keeps_failed_image() {
    let root = tempfile::tempdir().unwrap();
    let model = ScriptedModel::default()
      .on("a.png", detect(vec![raw(0, 0.9)]))
      .on("b.png", Script::Fail("timeout"));
    let composer = composer(
      model,
      FailingChart,
      config(root.path(), FailurePolicy::Placeholder),
    );
    let uploads = [Upload::new("a.png", png(8, 8)), Upload::new("b.png", png(8, 8))];

    let document = composer.build_document(&uploads).unwrap();
    let pages = evidence(&document);
    assert_eq!(pages.len(), 2);
    assert!(pages[1].detected_is_fallback);
    match &pages[1].outcome {
      DetectionOutcome::Failed(reason) => assert!(reason.contains("timeout")),
      other => panic!("unexpected outcome: {other:?}"),
    }
    match &document.pages()[0] {
      Page::CoverSummary(cover) => assert_eq!(cover.total_images, 2),
      other => panic!("unexpected first page: {other:?}"),
    }
  }

  #[test]
  fn large_originals_are_downscaled() {
    let root = tempfile::tempdir().unwrap();
    let mut config = config(root.path(), FailurePolicy::Abort);
    config.max_image_px = 50;
    let composer = composer(ScriptedModel::default(), FailingChart, config);

    let document = composer
      .build_document(&[Upload::new("wide.png", png(200, 100))])
      .unwrap();
    assert_eq!(evidence(&document)[0].original.dimensions(), (50, 25));
  }

  #[test]
  fn compose_returns_pdf_artifact() {
    let root = tempfile::tempdir().unwrap();
    let model = ScriptedModel::default().on("a.png", detect(vec![raw(0, 0.87), raw(1, 0.42)]));
    let composer = composer(
      model,
      BarChart::new().unwrap(),
      config(root.path(), FailurePolicy::Abort),
    );

    let artifact = composer
      .compose(&[Upload::new("a.png", png(64, 48))])
      .unwrap();
    assert!(artifact.bytes.starts_with(b"%PDF"));
    assert_eq!(artifact.filename, "damage_report.pdf");
    assert_eq!(artifact.content_type, "application/pdf");
    assert!(empty_dir(root.path()));
  }

  #[test]
  fn rejections_are_told_apart_from_internal_failures() {
    assert!(ComposeError::from(ValidationError::NoFiles).is_rejection());
    let unreadable = image::ImageError::IoError(std::io::Error::other("truncated"));
    assert!(
      ComposeError::UnreadableImage {
        filename: "a.png".to_string(),
        source: unreadable,
      }
      .is_rejection()
    );
    assert!(!ComposeError::Io(std::io::Error::other("disk full")).is_rejection());
    assert!(!ComposeError::Render(RenderError::Empty).is_rejection());
  }

  #[test]
  fn failed_batch_enters_failed_stage() {
    assert_eq!(Stage::Failed.to_string(), "failed");
    assert_eq!(Stage::Detecting { index: 2, total: 3 }.to_string(), "detecting 2/3");
  }

  #[test]
  fn uploaded_paths_cannot_escape_workspace() {
    let upload = Upload::new("../../etc/passwd.png", vec![]);
    assert_eq!(upload.stored_name(7), "007-passwd.png");
    assert_eq!(Upload::new("", vec![]).stored_name(12), "012-upload");
  }
}
