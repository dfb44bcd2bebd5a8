// 该文件是 Shanan （山南西风） 项目的一部分。
// src/report/layout.rs - 页面排版
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

//! 把页面模型转成绘制指令。
//!
//! 坐标单位为 pt，原点在页面左下角，文本的 `y` 为基线。
//! 排版过程不读写文件，图片尺寸由页面模型提供。

use std::sync::Arc;

use image::RgbImage;

use crate::detection::Detection;
use crate::report::{
  AnalyticsChartPage, ChartContent, CoverSummaryPage, EmbeddedImage, EvidencePage, Page,
  ReportDocument,
};
use crate::tally::DetectionOutcome;

/// A4 横向
pub const PAGE_WIDTH: f32 = 841.89;
pub const PAGE_HEIGHT: f32 = 595.28;

const MARGIN_LEFT: f32 = 50.0;
const MARGIN_RIGHT: f32 = 50.0;
const MARGIN_BOTTOM: f32 = 40.0;
const CONTINUED_TITLE_DROP: f32 = 40.0;
const CONTINUED_TABLE_DROP: f32 = 70.0;

// 封面
const COVER_TITLE_SIZE: f32 = 24.0;
const COVER_SECTION_SIZE: f32 = 16.0;
const BODY_SIZE: f32 = 12.0;
const TIMESTAMP_SIZE: f32 = 10.0;
const SUMMARY_COLUMNS: [(&str, f32); 3] = [("Damage Type", 0.30), ("Count", 0.18), ("Covered", 0.18)];
const SUMMARY_ROW_HEIGHT: f32 = 25.0;
const CELL_PAD_X: f32 = 10.0;
const CELL_PAD_Y: f32 = 8.0;
const HEADER_FILL: Shade = [0.9, 0.9, 0.9];
const BORDER: Shade = [0.0, 0.0, 0.0];

// 证据页
const EVIDENCE_TOP_DROP: f32 = 100.0;
const IMAGE_BOX_WIDTH: f32 = 350.0;
const IMAGE_BOX_HEIGHT: f32 = 250.0;
const ORIGINAL_X: f32 = 50.0;
const DETECTED_X: f32 = 450.0;
const DETECTION_COLUMNS: [(&str, f32); 3] = [
  ("Class", 50.0),
  ("Confidence", 250.0),
  ("Bounding Box (cx, cy, w, h)", 400.0),
];
const DETECTION_ROW_HEIGHT: f32 = 15.0;

// 图表页
const CHART_WIDTH: f32 = 680.0;
const CHART_HEIGHT: f32 = 340.0;
const CHART_BOTTOM: f32 = 180.0;
const CHART_LIST_ROW_HEIGHT: f32 = 18.0;

// Helvetica 平均字宽与字号之比
const REGULAR_ADVANCE: f32 = 0.5;
const BOLD_ADVANCE: f32 = 0.55;
const ELLIPSIS: &str = "...";

pub type Shade = [f32; 3];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
  Regular,
  Bold,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
  Text {
    text: String,
    x: f32,
    y: f32,
    size: f32,
    weight: FontWeight,
  },
  Rect {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    fill: Option<Shade>,
    stroke: Option<Shade>,
  },
  Line {
    from: (f32, f32),
    to: (f32, f32),
  },
  Image {
    pixels: Arc<RgbImage>,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
  },
}

/// 一个物理页面的全部绘制指令
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PagePlan {
  pub ops: Vec<DrawOp>,
}

impl PagePlan {
  fn text(&mut self, text: impl Into<String>, x: f32, y: f32, size: f32, weight: FontWeight) {
    self.ops.push(DrawOp::Text {
      text: text.into(),
      x,
      y,
      size,
      weight,
    });
  }

  pub fn texts(&self) -> impl Iterator<Item = &str> {
    self.ops.iter().filter_map(|op| match op {
      DrawOp::Text { text, .. } => Some(text.as_str()),
      _ => None,
    })
  }

  pub fn contains_text(&self, needle: &str) -> bool {
    self.texts().any(|text| text == needle)
  }
}

fn advance(weight: FontWeight) -> f32 {
  match weight {
    FontWeight::Regular => REGULAR_ADVANCE,
    FontWeight::Bold => BOLD_ADVANCE,
  }
}

pub fn text_width(text: &str, size: f32, weight: FontWeight) -> f32 {
  text.chars().count() as f32 * size * advance(weight)
}

/// 超出宽度时截断并补省略号
pub fn truncate(text: &str, max_width: f32, size: f32, weight: FontWeight) -> String {
  if text_width(text, size, weight) <= max_width {
    return text.to_string();
  }
  let mut chars: Vec<char> = text.chars().collect();
  while !chars.is_empty() {
    chars.pop();
    let candidate = chars.iter().collect::<String>() + ELLIPSIS;
    if text_width(&candidate, size, weight) <= max_width {
      return candidate;
    }
  }
  String::new()
}

/// 按单词折行，单个过长的单词强制拆开
pub fn wrap(text: &str, max_width: f32, size: f32, weight: FontWeight) -> Vec<String> {
  let max_chars = ((max_width / (size * advance(weight))).floor() as usize).max(1);
  let fits = |s: &str| s.chars().count() <= max_chars;

  let mut lines = Vec::new();
  let mut current = String::new();
  for word in text.split_whitespace() {
    let candidate = if current.is_empty() {
      word.to_string()
    } else {
      format!("{} {}", current, word)
    };
    if fits(&candidate) {
      current = candidate;
      continue;
    }
    if !current.is_empty() {
      lines.push(std::mem::take(&mut current));
    }
    let mut chars: Vec<char> = word.chars().collect();
    while chars.len() > max_chars {
      lines.push(chars.drain(..max_chars).collect());
    }
    current = chars.into_iter().collect();
  }
  if !current.is_empty() {
    lines.push(current);
  }
  lines
}

/// 等比缩放并在框内居中，返回 (x, y, w, h)
fn fit_into(image: (u32, u32), x: f32, y: f32, width: f32, height: f32) -> (f32, f32, f32, f32) {
  let (iw, ih) = (image.0.max(1) as f32, image.1.max(1) as f32);
  let scale = (width / iw).min(height / ih);
  let (w, h) = (iw * scale, ih * scale);
  (x + (width - w) / 2.0, y + (height - h) / 2.0, w, h)
}

/// 固定画布上的排版器
#[derive(Debug, Clone, Copy)]
pub struct LayoutEngine {
  width: f32,
  height: f32,
}

impl Default for LayoutEngine {
  fn default() -> Self {
    Self {
      width: PAGE_WIDTH,
      height: PAGE_HEIGHT,
    }
  }
}

impl LayoutEngine {
  pub fn width(&self) -> f32 {
    self.width
  }

  pub fn height(&self) -> f32 {
    self.height
  }

  pub fn layout(&self, document: &ReportDocument) -> Vec<PagePlan> {
    document
      .pages()
      .iter()
      .flat_map(|page| self.layout_page(page))
      .collect()
  }

  /// 一个逻辑页面可能排成多个物理页面
  pub fn layout_page(&self, page: &Page) -> Vec<PagePlan> {
    match page {
      Page::CoverSummary(page) => self.cover(page),
      Page::AnalyticsChart(page) => self.chart(page),
      Page::Evidence(page) => self.evidence(page),
    }
  }

  fn content_width(&self) -> f32 {
    self.width - MARGIN_LEFT - MARGIN_RIGHT
  }

  fn centered(&self, plan: &mut PagePlan, text: &str, y: f32, size: f32, weight: FontWeight) {
    let text = truncate(text, self.content_width(), size, weight);
    let x = (self.width - text_width(&text, size, weight)) / 2.0;
    plan.text(text, x, y, size, weight);
  }

  /// 左对齐文本，超出右边距时截断
  fn left(&self, plan: &mut PagePlan, text: &str, x: f32, y: f32, size: f32, weight: FontWeight) {
    let text = truncate(text, self.width - MARGIN_RIGHT - x, size, weight);
    plan.text(text, x, y, size, weight);
  }

  fn continuation(&self, title: &str) -> (PagePlan, f32) {
    let mut plan = PagePlan::default();
    self.left(
      &mut plan,
      title,
      MARGIN_LEFT,
      self.height - CONTINUED_TITLE_DROP,
      COVER_SECTION_SIZE,
      FontWeight::Bold,
    );
    (plan, self.height - CONTINUED_TABLE_DROP)
  }

  fn cover(&self, page: &CoverSummaryPage) -> Vec<PagePlan> {
    let mut plan = PagePlan::default();
    let top = self.height;

    self.centered(&mut plan, &page.title, top - 40.0, COVER_TITLE_SIZE, FontWeight::Bold);
    self.centered(
      &mut plan,
      &format!("Generated on: {}", page.generated_at.format("%Y-%m-%d %H:%M:%S")),
      top - 60.0,
      TIMESTAMP_SIZE,
      FontWeight::Regular,
    );
    self.centered(
      &mut plan,
      &format!("Total Images Processed: {}", page.total_images),
      top - 85.0,
      BODY_SIZE,
      FontWeight::Regular,
    );

    let mut y = top - 120.0;
    self.left(&mut plan, "Policy Details:", MARGIN_LEFT, y, COVER_SECTION_SIZE, FontWeight::Bold);
    y -= 25.0;
    self.left(&mut plan, "Policy Types:", 60.0, y, BODY_SIZE, FontWeight::Regular);
    for policy in &page.policy.policy_types {
      y -= 18.0;
      self.left(&mut plan, &format!("- {}", policy), 80.0, y, BODY_SIZE, FontWeight::Regular);
    }
    y -= 30.0;
    self.left(
      &mut plan,
      &format!("Policy Start Date: {}", page.policy.start_date.format("%Y-%m-%d")),
      60.0,
      y,
      BODY_SIZE,
      FontWeight::Regular,
    );
    y -= 20.0;
    self.left(
      &mut plan,
      &format!("Policy Renewal Date: {}", page.policy.renewal_date.format("%Y-%m-%d")),
      60.0,
      y,
      BODY_SIZE,
      FontWeight::Regular,
    );

    let mut plans = Vec::new();
    let mut table_top = y - 60.0;
    let mut remaining = &page.rows[..];
    loop {
      let header_fits = table_top - SUMMARY_ROW_HEIGHT >= MARGIN_BOTTOM;
      let fit = self.summary_rows_fit(table_top);
      if !header_fits || (fit == 0 && !remaining.is_empty()) {
        plans.push(plan);
        (plan, table_top) = self.continuation("Damage Summary (continued)");
        continue;
      }

      let (now, rest) = remaining.split_at(fit.min(remaining.len()));
      self.summary_table(&mut plan, table_top, now);
      plans.push(plan);
      if rest.is_empty() {
        break;
      }
      remaining = rest;
      (plan, table_top) = self.continuation("Damage Summary (continued)");
    }
    plans
  }

  /// 表头之外还能容纳的行数
  fn summary_rows_fit(&self, top: f32) -> usize {
    let rows = ((top - MARGIN_BOTTOM) / SUMMARY_ROW_HEIGHT).floor();
    (rows as usize).saturating_sub(1)
  }

  fn summary_table(&self, plan: &mut PagePlan, top: f32, rows: &[(String, usize)]) {
    let widths = SUMMARY_COLUMNS.map(|(_, ratio)| self.width * ratio);
    let header = SUMMARY_COLUMNS.map(|(name, _)| name.to_string());
    self.summary_row(plan, top, &widths, &header, FontWeight::Bold, Some(HEADER_FILL));

    for (i, (label, count)) in rows.iter().enumerate() {
      let row_top = top - SUMMARY_ROW_HEIGHT * (i + 1) as f32;
      let cells = [label.clone(), count.to_string(), "Yes".to_string()];
      self.summary_row(plan, row_top, &widths, &cells, FontWeight::Regular, None);
    }
  }

  fn summary_row(
    &self,
    plan: &mut PagePlan,
    top: f32,
    widths: &[f32; 3],
    cells: &[String; 3],
    weight: FontWeight,
    fill: Option<Shade>,
  ) {
    let y = top - SUMMARY_ROW_HEIGHT;
    let mut x = MARGIN_LEFT;
    for (cell, width) in cells.iter().zip(widths) {
      plan.ops.push(DrawOp::Rect {
        x,
        y,
        width: *width,
        height: SUMMARY_ROW_HEIGHT,
        fill,
        stroke: Some(BORDER),
      });
      let text = truncate(cell, width - 2.0 * CELL_PAD_X, BODY_SIZE, weight);
      plan.text(text, x + CELL_PAD_X, y + CELL_PAD_Y, BODY_SIZE, weight);
      x += width;
    }
  }

  fn chart(&self, page: &AnalyticsChartPage) -> Vec<PagePlan> {
    match &page.content {
      ChartContent::Raster(pixels) => {
        let mut plan = PagePlan::default();
        let x = (self.width - CHART_WIDTH) / 2.0;
        let (x, y, width, height) = fit_into(
          pixels.dimensions(),
          x,
          CHART_BOTTOM,
          CHART_WIDTH,
          CHART_HEIGHT,
        );
        plan.ops.push(DrawOp::Image {
          pixels: pixels.clone(),
          x,
          y,
          width,
          height,
        });
        vec![plan]
      }
      ChartContent::Unavailable(_) => self.chart_list(page),
    }
  }

  /// 图表无法渲染时的文字版本
  fn chart_list(&self, page: &AnalyticsChartPage) -> Vec<PagePlan> {
    let mut plans = Vec::new();
    let mut plan = PagePlan::default();
    self.left(
      &mut plan,
      &page.title,
      MARGIN_LEFT,
      self.height - CONTINUED_TITLE_DROP,
      COVER_SECTION_SIZE,
      FontWeight::Bold,
    );
    let mut y = self.height - CONTINUED_TABLE_DROP;

    for (label, count) in &page.series {
      if y < MARGIN_BOTTOM {
        plans.push(plan);
        let continued = format!("{} (continued)", page.title);
        (plan, y) = self.continuation(&continued);
      }
      self.left(
        &mut plan,
        &format!("{}: {}", label, count),
        60.0,
        y,
        BODY_SIZE,
        FontWeight::Regular,
      );
      y -= CHART_LIST_ROW_HEIGHT;
    }
    plans.push(plan);
    plans
  }

  fn evidence(&self, page: &EvidencePage) -> Vec<PagePlan> {
    let mut plan = PagePlan::default();
    let y_start = self.height - EVIDENCE_TOP_DROP;
    let heading = format!("Image {} of {}", page.sequence_index, page.total);

    self.left(
      &mut plan,
      &heading,
      MARGIN_LEFT,
      y_start + 30.0,
      COVER_SECTION_SIZE,
      FontWeight::Bold,
    );
    self.left(
      &mut plan,
      &page.filename,
      MARGIN_LEFT,
      y_start + 14.0,
      TIMESTAMP_SIZE,
      FontWeight::Regular,
    );

    let detected_caption = if page.detected_is_fallback {
      "Detected Image (original shown)"
    } else {
      "Detected Image"
    };
    self.left(&mut plan, "Original Image", ORIGINAL_X, y_start, BODY_SIZE, FontWeight::Regular);
    self.left(&mut plan, detected_caption, DETECTED_X, y_start, BODY_SIZE, FontWeight::Regular);

    let box_y = y_start - 260.0;
    self.image_box(&mut plan, &page.original, ORIGINAL_X, box_y);
    self.image_box(&mut plan, &page.detected, DETECTED_X, box_y);

    let y = y_start - 280.0;
    match &page.outcome {
      DetectionOutcome::Failed(reason) => {
        self.failure_note(&mut plan, reason, y);
        vec![plan]
      }
      DetectionOutcome::Detected(detections) => {
        self.detection_table(plan, &heading, detections, y)
      }
    }
  }

  fn image_box(&self, plan: &mut PagePlan, image: &EmbeddedImage, x: f32, y: f32) {
    let (x, y, width, height) = fit_into(image.dimensions(), x, y, IMAGE_BOX_WIDTH, IMAGE_BOX_HEIGHT);
    plan.ops.push(DrawOp::Image {
      pixels: image.pixels.clone(),
      x,
      y,
      width,
      height,
    });
  }

  fn failure_note(&self, plan: &mut PagePlan, reason: &str, mut y: f32) {
    self.left(plan, "Detection failed:", MARGIN_LEFT, y, BODY_SIZE, FontWeight::Bold);
    let lines = wrap(reason, self.content_width(), BODY_SIZE, FontWeight::Regular);
    let room = ((y - MARGIN_BOTTOM) / DETECTION_ROW_HEIGHT).floor() as usize;
    let last = lines.len().min(room);
    for (i, line) in lines.iter().take(last).enumerate() {
      y -= DETECTION_ROW_HEIGHT;
      let line = if i + 1 == last && last < lines.len() {
        truncate(&format!("{}{}", line, ELLIPSIS), self.content_width(), BODY_SIZE, FontWeight::Regular)
      } else {
        line.clone()
      };
      plan.text(line, MARGIN_LEFT, y, BODY_SIZE, FontWeight::Regular);
    }
  }

  fn detection_header(&self, plan: &mut PagePlan, y: f32) {
    for (name, x) in DETECTION_COLUMNS {
      self.left(plan, name, x, y, BODY_SIZE, FontWeight::Bold);
    }
    plan.ops.push(DrawOp::Line {
      from: (MARGIN_LEFT, y - 4.0),
      to: (self.width - MARGIN_RIGHT, y - 4.0),
    });
  }

  fn detection_table(
    &self,
    mut plan: PagePlan,
    heading: &str,
    detections: &[Detection],
    mut y: f32,
  ) -> Vec<PagePlan> {
    self.left(&mut plan, "Detected Objects:", MARGIN_LEFT, y, BODY_SIZE, FontWeight::Bold);
    y -= 20.0;

    if detections.is_empty() {
      self.left(&mut plan, "No damage detected.", MARGIN_LEFT, y, BODY_SIZE, FontWeight::Regular);
      return vec![plan];
    }

    self.detection_header(&mut plan, y);
    let mut plans = Vec::new();
    for detection in detections {
      y -= DETECTION_ROW_HEIGHT;
      if y < MARGIN_BOTTOM {
        plans.push(plan);
        let continued = format!("{} (continued)", heading);
        (plan, y) = self.continuation(&continued);
        self.detection_header(&mut plan, y);
        y -= DETECTION_ROW_HEIGHT;
      }
      self.detection_row(&mut plan, detection, y);
    }
    plans.push(plan);
    plans
  }

  fn detection_row(&self, plan: &mut PagePlan, detection: &Detection, y: f32) {
    let b = &detection.bounding_box;
    let cells = [
      detection.class_label.clone(),
      format!("{:.2}%", detection.confidence * 100.0),
      format!("({:.2}, {:.2}, {:.2}, {:.2})", b.cx, b.cy, b.width, b.height),
    ];
    let limits = [
      DETECTION_COLUMNS[1].1 - CELL_PAD_X,
      DETECTION_COLUMNS[2].1 - CELL_PAD_X,
      self.width - MARGIN_RIGHT,
    ];
    for ((cell, (_, x)), limit) in cells.iter().zip(DETECTION_COLUMNS).zip(limits) {
      let text = truncate(cell, limit - x, BODY_SIZE, FontWeight::Regular);
      plan.text(text, x, y, BODY_SIZE, FontWeight::Regular);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::report::testing::{chart, cover, evidence};
  use crate::tally::testing::{detection, image};
  use crate::tally::{BatchTally, ImageResult};

  fn engine() -> LayoutEngine {
    LayoutEngine::default()
  }

  fn with_detections(index: usize, detections: Vec<Detection>) -> ImageResult {
    let mut result = image(index, &[]);
    result.outcome = DetectionOutcome::Detected(detections);
    result
  }

  fn texts(plan: &PagePlan) -> Vec<&str> {
    plan.texts().collect()
  }

  fn assert_within_canvas(plans: &[PagePlan]) {
    let engine = engine();
    for (page, plan) in plans.iter().enumerate() {
      for op in &plan.ops {
        match op {
          DrawOp::Text {
            text,
            x,
            y,
            size,
            weight,
          } => {
            assert!(*x >= 0.0, "page {page}: {text:?} starts left of canvas");
            assert!(
              x + text_width(text, *size, *weight) <= engine.width() + 0.01,
              "page {page}: {text:?} runs past the right edge"
            );
            assert!(
              *y >= MARGIN_BOTTOM - 0.01 && *y + size <= engine.height(),
              "page {page}: {text:?} at y={y} is off the page"
            );
          }
          DrawOp::Image {
            x,
            y,
            width,
            height,
            ..
          }
          | DrawOp::Rect {
            x,
            y,
            width,
            height,
            ..
          } => {
            assert!(*x >= 0.0 && *y >= MARGIN_BOTTOM - 0.01);
            assert!(x + width <= engine.width() + 0.01);
            assert!(y + height <= engine.height() + 0.01);
          }
          DrawOp::Line { from, to } => {
            for (x, y) in [from, to] {
              assert!((0.0..=engine.width()).contains(x));
              assert!((0.0..=engine.height()).contains(y));
            }
          }
        }
      }
    }
  }

  #[test]
  fn evidence_table_lists_emission_order_as_percentages() {
    let result = with_detections(1, vec![detection("dent", 0.87), detection("scratch", 0.42)]);
    let plans = engine().evidence(&evidence(&result, 1, true));
    assert_eq!(plans.len(), 1);

    let texts = texts(&plans[0]);
    let dent = texts.iter().position(|t| *t == "dent").unwrap();
    let scratch = texts.iter().position(|t| *t == "scratch").unwrap();
    assert!(dent < scratch);
    assert_eq!(texts[dent + 1], "87.00%");
    assert_eq!(texts[scratch + 1], "42.00%");
    assert_eq!(texts[dent + 2], "(120.50, 80.25, 40.00, 22.40)");
    assert!(plans[0].contains_text("Image 1 of 1"));
    assert!(plans[0].contains_text("Detected Image"));
  }

  #[test]
  fn evidence_without_detections_says_so() {
    let plans = engine().evidence(&evidence(&image(2, &[]), 3, true));
    assert!(plans[0].contains_text("No damage detected."));
    assert!(plans[0].contains_text("Image 2 of 3"));
  }

  #[test]
  fn fallback_caption_marks_original() {
    let plans = engine().evidence(&evidence(&image(2, &["dent"]), 3, false));
    assert!(plans[0].contains_text("Detected Image (original shown)"));
  }

  #[test]
  fn images_fit_their_boxes_keeping_aspect() {
    let plans = engine().evidence(&evidence(&image(1, &[]), 1, true));
    let images: Vec<_> = plans[0]
      .ops
      .iter()
      .filter_map(|op| match op {
        DrawOp::Image {
          x,
          y,
          width,
          height,
          ..
        } => Some((*x, *y, *width, *height)),
        _ => None,
      })
      .collect();
    assert_eq!(images.len(), 2);

    // 400x300 的图片在 350x250 的框内受高度限制
    let (x, _, w, h) = images[0];
    assert!((h - 250.0).abs() < 0.01);
    assert!((w - 333.333).abs() < 0.01);
    assert!((x - (ORIGINAL_X + (350.0 - w) / 2.0)).abs() < 0.01);
    assert!(images[1].0 >= DETECTED_X);
  }

  #[test]
  fn long_detection_table_continues_on_next_page() {
    let detections = (0..25).map(|i| detection(&format!("d{i}"), 0.5)).collect();
    let result = with_detections(4, detections);
    let plans = engine().evidence(&evidence(&result, 7, true));

    assert!(plans.len() >= 2);
    assert!(plans[1].contains_text("Image 4 of 7 (continued)"));
    assert!(plans[1].contains_text("Class"));

    let rows: usize = plans
      .iter()
      .map(|plan| plan.texts().filter(|t| t.starts_with('d') && t.len() <= 3).count())
      .sum();
    assert_eq!(rows, 25);
    assert_within_canvas(&plans);
  }

  #[test]
  fn placeholder_shows_failure_reason() {
    let mut result = image(3, &[]);
    result.outcome = DetectionOutcome::Failed("detector timed out after 30s".to_string());
    let plans = engine().evidence(&evidence(&result, 3, false));

    assert_eq!(plans.len(), 1);
    assert!(plans[0].contains_text("Detection failed:"));
    assert!(plans[0].contains_text("detector timed out after 30s"));
    assert!(!plans[0].contains_text("Detected Objects:"));
  }

  #[test]
  fn cover_lists_classes_in_first_seen_order() {
    let results = [image(1, &["scratch"]), image(2, &["dent", "scratch"])];
    let tally = BatchTally::from_results(&results);
    let plans = engine().cover(&cover(&tally));
    assert_eq!(plans.len(), 1);

    let texts = texts(&plans[0]);
    assert!(texts.contains(&"Generated on: 2026-01-31 09:30:00"));
    assert!(texts.contains(&"Total Images Processed: 2"));
    assert!(texts.contains(&"Policy Start Date: 2026-01-31"));
    assert!(texts.contains(&"Policy Renewal Date: 2027-01-31"));

    let scratch = texts.iter().position(|t| *t == "scratch").unwrap();
    let dent = texts.iter().position(|t| *t == "dent").unwrap();
    assert!(scratch < dent);
    assert_eq!(texts[scratch + 1], "2");
    assert_eq!(texts[scratch + 2], "Yes");
  }

  #[test]
  fn empty_cover_table_has_only_header() {
    let plans = engine().cover(&cover(&BatchTally::new()));
    assert_eq!(plans.len(), 1);
    assert!(plans[0].contains_text("Damage Type"));
    assert!(!plans[0].contains_text("Yes"));
  }

  #[test]
  fn cover_table_paginates_instead_of_clipping() {
    let labels: Vec<String> = (0..40).map(|i| format!("class-{i:02}")).collect();
    let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
    let tally = BatchTally::from_results(&[image(1, &refs)]);
    let plans = engine().cover(&cover(&tally));

    assert!(plans.len() >= 2);
    for plan in &plans[1..] {
      assert!(plan.contains_text("Damage Summary (continued)"));
      assert!(plan.contains_text("Damage Type"));
    }
    let drawn: Vec<&str> = plans
      .iter()
      .flat_map(|plan| plan.texts())
      .filter(|t| t.starts_with("class-"))
      .collect();
    assert_eq!(drawn, refs);
    assert_within_canvas(&plans);
  }

  #[test]
  fn long_cells_are_truncated() {
    let label = "extremely long damage class name that cannot fit into the column";
    let tally = BatchTally::from_results(&[image(1, &[label])]);
    let plans = engine().cover(&cover(&tally));
    let cell = plans[0]
      .texts()
      .find(|t| t.starts_with("extremely"))
      .unwrap();
    assert!(cell.ends_with("..."));
    assert!(cell.len() < label.len());
  }

  #[test]
  fn chart_is_centered_above_bottom_band() {
    let tally = BatchTally::from_results(&[image(1, &["dent"])]);
    let plans = engine().chart(&chart(&tally));
    assert_eq!(plans.len(), 1);
    match &plans[0].ops[0] {
      DrawOp::Image {
        x,
        y,
        width,
        height,
        ..
      } => {
        assert!((x - (PAGE_WIDTH - 680.0) / 2.0).abs() < 0.01);
        assert!((y - 180.0).abs() < 0.01);
        assert!((width - 680.0).abs() < 0.01);
        assert!((height - 340.0).abs() < 0.01);
      }
      other => panic!("unexpected op: {other:?}"),
    }
  }

  #[test]
  fn unavailable_chart_falls_back_to_text() {
    let tally = BatchTally::from_results(&[image(1, &["dent", "dent", "scratch"])]);
    let mut page = chart(&tally);
    page.content = ChartContent::Unavailable("font missing".to_string());
    let plans = engine().chart(&page);
    assert!(plans[0].contains_text("Summary of Detected Damages"));
    assert!(plans[0].contains_text("dent: 2"));
    assert!(plans[0].contains_text("scratch: 1"));
  }

  #[test]
  fn whole_document_stays_on_canvas() {
    let results = [
      with_detections(1, vec![detection("dent", 0.87), detection("scratch", 0.42)]),
      image(2, &[]),
    ];
    let tally = BatchTally::from_results(&results);
    let pages = results.iter().map(|r| evidence(r, 2, true)).collect();
    let document = ReportDocument::build(cover(&tally), Some(chart(&tally)), pages);

    let plans = engine().layout(&document);
    assert_eq!(plans.len(), 4);
    assert_within_canvas(&plans);
  }

  #[test]
  fn wrap_breaks_on_words_and_splits_long_words() {
    let lines = wrap("aaaa bbbb cccc", 40.0, 10.0, FontWeight::Regular);
    assert_eq!(lines, ["aaaa", "bbbb", "cccc"]);

    let lines = wrap("aa bb cc", 40.0, 10.0, FontWeight::Regular);
    assert_eq!(lines, ["aa bb cc"]);

    let lines = wrap("abcdefghijkl", 40.0, 10.0, FontWeight::Regular);
    assert_eq!(lines, ["abcdefgh", "ijkl"]);
  }
}
