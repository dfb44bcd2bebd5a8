// 该文件是 Shanan （山南西风） 项目的一部分。
// src/tally.rs - 批次结果与类别统计
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

use std::path::PathBuf;

use indexmap::IndexMap;

use crate::detection::Detection;

/// 单张图片的检测结论
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutcome {
  Detected(Vec<Detection>),
  Failed(String),
}

/// 一张已处理的上传图片
#[derive(Debug, Clone, PartialEq)]
pub struct ImageResult {
  /// 批次内从 1 开始的序号
  pub sequence_index: usize,
  pub filename: String,
  pub original: PathBuf,
  /// 模型可视化结果，缺失时报告中使用原图
  pub annotated: Option<PathBuf>,
  pub outcome: DetectionOutcome,
}

impl ImageResult {
  pub fn detections(&self) -> &[Detection] {
    match &self.outcome {
      DetectionOutcome::Detected(detections) => detections,
      DetectionOutcome::Failed(_) => &[],
    }
  }
}

/// 批次内各损伤类别的出现次数
///
/// 类别按首次出现的顺序排列，汇总表与柱状图都依赖这一顺序。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchTally {
  total_images: usize,
  class_counts: IndexMap<String, usize>,
}

impl BatchTally {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_results<'a>(results: impl IntoIterator<Item = &'a ImageResult>) -> Self {
    results.into_iter().fold(Self::new(), Self::fold)
  }

  pub fn fold(mut self, result: &ImageResult) -> Self {
    self.observe(result);
    self
  }

  pub fn observe(&mut self, result: &ImageResult) {
    self.total_images += 1;
    for detection in result.detections() {
      *self
        .class_counts
        .entry(detection.class_label.clone())
        .or_insert(0) += 1;
    }
  }

  pub fn total_images(&self) -> usize {
    self.total_images
  }

  pub fn class_counts(&self) -> &IndexMap<String, usize> {
    &self.class_counts
  }

  pub fn total_detections(&self) -> usize {
    self.class_counts.values().sum()
  }

  pub fn is_empty(&self) -> bool {
    self.class_counts.is_empty()
  }
}

#[cfg(test)]
pub(crate) mod testing {
  use super::*;
  use crate::detection::BoundingBox;

  pub fn detection(label: &str, confidence: f32) -> Detection {
    Detection {
      class_label: label.to_string(),
      confidence,
      bounding_box: BoundingBox {
        cx: 120.5,
        cy: 80.25,
        width: 40.0,
        height: 22.4,
      },
    }
  }

  pub fn image(sequence_index: usize, labels: &[&str]) -> ImageResult {
    ImageResult {
      sequence_index,
      filename: format!("{}.jpg", sequence_index),
      original: PathBuf::from(format!("/tmp/{}.jpg", sequence_index)),
      annotated: None,
      outcome: DetectionOutcome::Detected(labels.iter().map(|l| detection(l, 0.5)).collect()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::testing::image;
  use super::*;

  fn keys(tally: &BatchTally) -> Vec<&str> {
    tally.class_counts().keys().map(String::as_str).collect()
  }

  #[test]
  fn keys_follow_first_seen_order() {
    let results = [
      image(1, &["scratch"]),
      image(2, &["dent", "scratch", "dent"]),
      image(3, &["crack", "dent"]),
    ];
    let tally = BatchTally::from_results(&results);

    assert_eq!(keys(&tally), ["scratch", "dent", "crack"]);
    assert_eq!(tally.class_counts()["dent"], 3);
    assert_eq!(tally.class_counts()["scratch"], 2);
    assert_eq!(tally.class_counts()["crack"], 1);
    assert_eq!(tally.total_images(), 3);
    assert_eq!(tally.total_detections(), 6);
  }

  #[test]
  fn images_without_detections_still_count() {
    let results = [image(1, &[]), image(2, &[]), image(3, &["dent"])];
    let tally = BatchTally::from_results(&results);
    assert_eq!(tally.total_images(), 3);
    assert_eq!(tally.total_detections(), 1);
  }

  #[test]
  fn failed_images_count_without_detections() {
    let mut failed = image(1, &["dent"]);
    failed.outcome = DetectionOutcome::Failed("timeout".to_string());
    let tally = BatchTally::new().fold(&failed);
    assert_eq!(tally.total_images(), 1);
    assert!(tally.is_empty());
  }

  #[test]
  fn incremental_fold_matches_single_pass() {
    let results = [
      image(1, &["dent", "glass"]),
      image(2, &[]),
      image(3, &["scratch", "dent"]),
    ];

    let mut incremental = BatchTally::new();
    for result in &results {
      incremental.observe(result);
    }

    let single_pass = BatchTally::from_results(&results);
    assert_eq!(incremental, single_pass);
    assert_eq!(keys(&incremental), keys(&single_pass));
  }

  #[test]
  fn totals_do_not_depend_on_order_but_keys_do() {
    let forward = [image(1, &["dent"]), image(2, &["scratch"])];
    let backward = [image(2, &["scratch"]), image(1, &["dent"])];

    let a = BatchTally::from_results(&forward);
    let b = BatchTally::from_results(&backward);

    assert_eq!(a.class_counts()["dent"], b.class_counts()["dent"]);
    assert_eq!(a.total_images(), b.total_images());
    assert_eq!(keys(&a), ["dent", "scratch"]);
    assert_eq!(keys(&b), ["scratch", "dent"]);
  }
}
