// 该文件是 Shanan （山南西风） 项目的一部分。
// src/report.rs - 报告页面模型
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

use chrono::{Months, NaiveDate, NaiveDateTime};
use image::RgbImage;

use crate::config::PolicyDetails;
use crate::tally::{BatchTally, DetectionOutcome, ImageResult};

pub mod layout;
pub use self::layout::{DrawOp, FontWeight, LayoutEngine, PagePlan};

mod pdf;
pub use self::pdf::{Canvas, PdfCanvas, RenderError};

pub const REPORT_FILENAME: &str = "damage_report.pdf";
pub const REPORT_CONTENT_TYPE: &str = "application/pdf";

/// 封面的保单信息块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyBlock {
  pub policy_types: Vec<String>,
  pub start_date: NaiveDate,
  pub renewal_date: NaiveDate,
}

impl PolicyBlock {
  /// 起保日为当天，续保日按月份顺延，月末日期向前对齐
  pub fn starting(details: &PolicyDetails, start_date: NaiveDate) -> Self {
    let renewal_date = start_date
      .checked_add_months(Months::new(details.renewal_months))
      .unwrap_or(start_date);
    Self {
      policy_types: details.policy_types.clone(),
      start_date,
      renewal_date,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoverSummaryPage {
  pub title: String,
  pub generated_at: NaiveDateTime,
  pub total_images: usize,
  pub policy: PolicyBlock,
  /// 首次出现顺序的 (类别, 数量)
  pub rows: Vec<(String, usize)>,
}

impl CoverSummaryPage {
  pub fn new(
    title: impl Into<String>,
    generated_at: NaiveDateTime,
    policy: PolicyBlock,
    tally: &BatchTally,
  ) -> Self {
    Self {
      title: title.into(),
      generated_at,
      total_images: tally.total_images(),
      policy,
      rows: series(tally),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChartContent {
  Raster(Arc<RgbImage>),
  /// 图表渲染失败，以文字列表代替
  Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsChartPage {
  pub title: String,
  pub series: Vec<(String, usize)>,
  pub content: ChartContent,
}

/// 嵌入报告的位图，尺寸由组装方读取
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedImage {
  pub pixels: Arc<RgbImage>,
}

impl EmbeddedImage {
  pub fn new(pixels: RgbImage) -> Self {
    Self {
      pixels: Arc::new(pixels),
    }
  }

  pub fn dimensions(&self) -> (u32, u32) {
    self.pixels.dimensions()
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvidencePage {
  pub sequence_index: usize,
  pub total: usize,
  pub filename: String,
  pub original: EmbeddedImage,
  /// 缺少可视化结果时为原图
  pub detected: EmbeddedImage,
  pub detected_is_fallback: bool,
  pub outcome: DetectionOutcome,
}

impl EvidencePage {
  pub fn new(
    result: &ImageResult,
    total: usize,
    original: EmbeddedImage,
    annotated: Option<EmbeddedImage>,
  ) -> Self {
    let detected_is_fallback = annotated.is_none();
    let detected = annotated.unwrap_or_else(|| original.clone());
    Self {
      sequence_index: result.sequence_index,
      total,
      filename: result.filename.clone(),
      original,
      detected,
      detected_is_fallback,
      outcome: result.outcome.clone(),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Page {
  CoverSummary(CoverSummaryPage),
  AnalyticsChart(AnalyticsChartPage),
  Evidence(EvidencePage),
}

/// 有序的报告页面
///
/// 顺序固定为：封面、图表（有数据时）、按序号升序的证据页。
#[derive(Debug, Clone, PartialEq)]
pub struct ReportDocument {
  pages: Vec<Page>,
}

impl ReportDocument {
  pub fn build(
    cover: CoverSummaryPage,
    chart: Option<AnalyticsChartPage>,
    mut evidence: Vec<EvidencePage>,
  ) -> Self {
    let chart = chart.filter(|chart| !chart.series.is_empty());
    evidence.sort_by_key(|page| page.sequence_index);

    let mut pages = Vec::with_capacity(2 + evidence.len());
    pages.push(Page::CoverSummary(cover));
    pages.extend(chart.map(Page::AnalyticsChart));
    pages.extend(evidence.into_iter().map(Page::Evidence));
    Self { pages }
  }

  pub fn pages(&self) -> &[Page] {
    &self.pages
  }

  pub fn len(&self) -> usize {
    self.pages.len()
  }

  pub fn is_empty(&self) -> bool {
    self.pages.is_empty()
  }

  pub fn evidence_count(&self) -> usize {
    self
      .pages
      .iter()
      .filter(|page| matches!(page, Page::Evidence(_)))
      .count()
  }
}

pub fn series(tally: &BatchTally) -> Vec<(String, usize)> {
  tally
    .class_counts()
    .iter()
    .map(|(label, count)| (label.clone(), *count))
    .collect()
}
