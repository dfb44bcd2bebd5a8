// 该文件是 Shanan （山南西风） 项目的一部分。
// src/detection.rs - 检测适配层
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

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::FromUrl;

mod annotate;
pub use self::annotate::Annotator;

mod command;
pub use self::command::{CommandModel, CommandModelError};

#[cfg(feature = "model_yolo26")]
mod yolo26;
#[cfg(feature = "model_yolo26")]
pub use self::yolo26::{Yolo26, Yolo26Builder, Yolo26Error};

/// 检测框，中心点坐标与宽高，单位为原图像素
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
  pub cx: f32,
  pub cy: f32,
  pub width: f32,
  pub height: f32,
}

impl BoundingBox {
  pub fn from_xywh([cx, cy, width, height]: [f32; 4]) -> Self {
    Self {
      cx,
      cy,
      width,
      height,
    }
  }

  /// [x_min, y_min, x_max, y_max]
  pub fn to_xyxy(&self) -> [f32; 4] {
    [
      self.cx - self.width / 2.0,
      self.cy - self.height / 2.0,
      self.cx + self.width / 2.0,
      self.cy + self.height / 2.0,
    ]
  }

  fn is_valid(&self) -> bool {
    [self.cx, self.cy, self.width, self.height]
      .iter()
      .all(|v| v.is_finite())
      && self.width >= 0.0
      && self.height >= 0.0
  }
}

/// 单个损伤检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub class_label: String,
  pub confidence: f32,
  pub bounding_box: BoundingBox,
}

/// 模型原始输出，类别仍为索引
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawDetection {
  pub class_id: u32,
  pub confidence: f32,
  /// [cx, cy, w, h]
  pub bbox: [f32; 4],
}

#[derive(Debug, Clone, Default)]
pub struct ModelOutput {
  pub detections: Vec<RawDetection>,
  /// 模型声称写出的可视化结果路径，为空时按输入文件名推断
  pub annotated: Option<PathBuf>,
}

/// 外部检测模型
///
/// 每张图片调用一次 `infer`，模型可以把可视化结果写入 `output_dir`。
pub trait DetectionModel {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&self, image_path: &Path, output_dir: &Path) -> Result<ModelOutput, Self::Error>;
}

impl<M: DetectionModel + ?Sized> DetectionModel for Box<M> {
  type Error = M::Error;

  fn infer(&self, image_path: &Path, output_dir: &Path) -> Result<ModelOutput, Self::Error> {
    (**self).infer(image_path, output_dir)
  }
}

#[derive(Error, Debug)]
pub enum VocabularyError {
  #[error("I/O error reading labels: {0}")]
  IoError(#[from] std::io::Error),
  #[error("labels file is empty")]
  Empty,
}

/// 模型类别表，索引即类别 ID
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
  labels: Vec<String>,
}

impl Vocabulary {
  /// 每行一个类别，忽略空行与 `#` 注释
  pub fn parse(text: &str) -> Self {
    let labels = text
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty() && !line.starts_with('#'))
      .map(str::to_string)
      .collect();
    Self { labels }
  }

  pub fn from_file(path: &Path) -> Result<Self, VocabularyError> {
    let vocabulary = Self::parse(&std::fs::read_to_string(path)?);
    if vocabulary.labels.is_empty() {
      return Err(VocabularyError::Empty);
    }
    info!("加载类别表: {} ({} 类)", path.display(), vocabulary.len());
    Ok(vocabulary)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn resolve(&self, class_id: u32) -> String {
    match self.labels.get(class_id as usize) {
      Some(label) => label.clone(),
      None => {
        warn!("类别 {} 不在类别表中", class_id);
        format!("class_{}", class_id)
      }
    }
  }
}

impl<S: Into<String>> FromIterator<S> for Vocabulary {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      labels: iter.into_iter().map(Into::into).collect(),
    }
  }
}

#[derive(Error, Debug)]
pub enum DetectionError {
  #[error("model error: {0}")]
  Model(Box<dyn std::error::Error + Send + Sync>),
  #[error("detection {index} has confidence {value} outside [0, 1]")]
  InvalidConfidence { index: usize, value: f32 },
  #[error("detection {index} has an invalid bounding box")]
  InvalidBox { index: usize },
}

/// 单张图片的检测结果
#[derive(Debug, Clone, Default)]
pub struct ImageDetections {
  pub detections: Vec<Detection>,
  pub annotated: Option<PathBuf>,
}

/// 检测适配器，把外部模型包装成稳定接口
pub struct Detector<M> {
  model: M,
  vocabulary: Vocabulary,
  annotator: Option<Annotator>,
}

impl<M: DetectionModel> Detector<M> {
  pub fn new(model: M, vocabulary: Vocabulary) -> Self {
    Self {
      model,
      vocabulary,
      annotator: None,
    }
  }

  pub fn model(&self) -> &M {
    &self.model
  }

  /// 模型没有产出可视化结果时，自行绘制检测框
  pub fn with_annotator(mut self, annotator: Annotator) -> Self {
    self.annotator = Some(annotator);
    self
  }

  pub fn detect(&self, image_path: &Path, output_dir: &Path) -> Result<ImageDetections, DetectionError> {
    let output = self
      .model
      .infer(image_path, output_dir)
      .map_err(|e| DetectionError::Model(Box::new(e)))?;
    debug!("模型输出 {} 个目标", output.detections.len());

    let detections = output
      .detections
      .into_iter()
      .enumerate()
      .map(|(index, raw)| self.to_detection(index, raw))
      .collect::<Result<Vec<_>, _>>()?;

    let expected = output
      .annotated
      .unwrap_or_else(|| expected_annotated_path(image_path, output_dir));
    let mut annotated = resolve_annotated(&expected);

    if annotated.is_none() {
      if let Some(annotator) = &self.annotator {
        annotated = self.draw_annotation(annotator, image_path, output_dir, &detections);
      }
    }

    Ok(ImageDetections {
      detections,
      annotated,
    })
  }

  fn to_detection(&self, index: usize, raw: RawDetection) -> Result<Detection, DetectionError> {
    if !(0.0..=1.0).contains(&raw.confidence) {
      return Err(DetectionError::InvalidConfidence {
        index,
        value: raw.confidence,
      });
    }
    let bounding_box = BoundingBox::from_xywh(raw.bbox);
    if !bounding_box.is_valid() {
      return Err(DetectionError::InvalidBox { index });
    }
    Ok(Detection {
      class_label: self.vocabulary.resolve(raw.class_id),
      confidence: raw.confidence,
      bounding_box,
    })
  }

  fn draw_annotation(
    &self,
    annotator: &Annotator,
    image_path: &Path,
    output_dir: &Path,
    detections: &[Detection],
  ) -> Option<PathBuf> {
    let stem = image_path.file_stem()?.to_string_lossy();
    let target = output_dir.join(format!("{}.annotated.png", stem));
    match annotator.annotate_file(image_path, &target, detections) {
      Ok(()) => Some(target),
      Err(e) => {
        warn!("绘制检测结果失败: {}", e);
        None
      }
    }
  }
}

/// 模型未报告路径时，可视化结果默认与输入同名，位于输出目录下
pub fn expected_annotated_path(image_path: &Path, output_dir: &Path) -> PathBuf {
  match image_path.file_name() {
    Some(name) => output_dir.join(name),
    None => output_dir.to_path_buf(),
  }
}

/// 查找可视化结果，路径不存在时尝试 `.jpg` 扩展名
pub fn resolve_annotated(expected: &Path) -> Option<PathBuf> {
  if expected.is_file() {
    return Some(expected.to_path_buf());
  }
  let substitute = expected.with_extension("jpg");
  if substitute != expected && substitute.is_file() {
    debug!(
      "可视化结果扩展名不一致，使用 {}",
      substitute.display()
    );
    return Some(substitute);
  }
  warn!("未找到可视化结果: {}", expected.display());
  None
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("command model error: {0}")]
  Command(#[from] CommandModelError),
  #[cfg(feature = "model_yolo26")]
  #[error("YOLO26 model error: {0}")]
  Yolo26(#[from] Yolo26Error),
  #[error("unsupported model scheme: {0}")]
  SchemeMismatch(String),
}

/// 按 URL 方案选择的模型后端
pub enum ModelWrapper {
  Command(CommandModel),
  #[cfg(feature = "model_yolo26")]
  Yolo26(Yolo26),
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    use crate::FromUrlWithScheme;

    if url.scheme() == CommandModel::SCHEME {
      return Ok(ModelWrapper::Command(CommandModel::from_url(url)?));
    }
    #[cfg(feature = "model_yolo26")]
    {
      if url.scheme() == Yolo26Builder::SCHEME {
        let model = Yolo26Builder::from_url(url)?.build()?;
        return Ok(ModelWrapper::Yolo26(model));
      }
    }
    Err(ModelError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl ModelWrapper {
  /// 单张图片的检测超时，仅对外部命令后端生效
  pub fn with_timeout(self, timeout: Option<std::time::Duration>) -> Self {
    match self {
      ModelWrapper::Command(model) => ModelWrapper::Command(model.with_timeout(timeout)),
      #[cfg(feature = "model_yolo26")]
      other => other,
    }
  }
}

impl DetectionModel for ModelWrapper {
  type Error = ModelError;

  fn infer(&self, image_path: &Path, output_dir: &Path) -> Result<ModelOutput, Self::Error> {
    match self {
      ModelWrapper::Command(model) => Ok(model.infer(image_path, output_dir)?),
      #[cfg(feature = "model_yolo26")]
      ModelWrapper::Yolo26(model) => Ok(model.infer(image_path, output_dir)?),
    }
  }
}
