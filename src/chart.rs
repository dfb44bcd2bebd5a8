// 该文件是 Shanan （山南西风） 项目的一部分。
// src/chart.rs - 损伤类别柱状图
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

use ab_glyph::{FontArc, InvalidFont, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::debug;

pub const CHART_TITLE: &str = "Summary of Detected Damages";

const DEFAULT_WIDTH: u32 = 1200;
const DEFAULT_HEIGHT: u32 = 600;
const TITLE_SIZE: f32 = 36.0;
const AXIS_LABEL_SIZE: f32 = 22.0;
const TICK_SIZE: f32 = 18.0;
const MARGIN_LEFT: i32 = 90;
const MARGIN_RIGHT: i32 = 40;
const MARGIN_TOP: i32 = 80;
const MARGIN_BOTTOM: i32 = 110;
const BAR_FILL_RATIO: f32 = 0.7;
const MAX_Y_TICKS: usize = 8;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const INK: Rgb<u8> = Rgb([33, 33, 33]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);

/// viridis 色带的锚点
const VIRIDIS: [[u8; 3]; 5] = [
  [68, 1, 84],
  [59, 82, 139],
  [33, 145, 140],
  [94, 201, 98],
  [253, 231, 37],
];

#[derive(Error, Debug)]
pub enum ChartError {
  #[error("chart has no data")]
  EmptySeries,
  #[error("invalid chart font: {0}")]
  Font(#[from] InvalidFont),
  #[error("chart canvas {width}x{height} is too small")]
  CanvasTooSmall { width: u32, height: u32 },
}

/// 把类别计数渲染成位图
pub trait ChartRenderer {
  fn render(&self, title: &str, series: &[(String, usize)]) -> Result<RgbImage, ChartError>;
}

impl<R: ChartRenderer + ?Sized> ChartRenderer for Box<R> {
  fn render(&self, title: &str, series: &[(String, usize)]) -> Result<RgbImage, ChartError> {
    (**self).render(title, series)
  }
}

pub struct BarChart {
  width: u32,
  height: u32,
  font: FontArc,
}

impl BarChart {
  pub fn new() -> Result<Self, ChartError> {
    Ok(Self {
      width: DEFAULT_WIDTH,
      height: DEFAULT_HEIGHT,
      font: crate::font::embedded_font()?,
    })
  }

  pub fn with_size(mut self, width: u32, height: u32) -> Self {
    self.width = width;
    self.height = height;
    self
  }

  fn plot_area(&self) -> Option<(i32, i32, i32, i32)> {
    let (w, h) = (self.width as i32, self.height as i32);
    let right = w - MARGIN_RIGHT;
    let bottom = h - MARGIN_BOTTOM;
    (right - MARGIN_LEFT > 10 && bottom - MARGIN_TOP > 10).then_some((
      MARGIN_LEFT,
      MARGIN_TOP,
      right,
      bottom,
    ))
  }

  fn draw_centered(&self, image: &mut RgbImage, text: &str, cx: i32, y: i32, size: f32) {
    let scale = PxScale::from(size);
    let (tw, _) = text_size(scale, &self.font, text);
    draw_text_mut(image, INK, cx - tw as i32 / 2, y, scale, &self.font, text);
  }

  /// 标签超出柱宽时截断并补省略号
  fn fit_label(&self, label: &str, max_width: u32, scale: PxScale) -> String {
    if text_size(scale, &self.font, label).0 <= max_width {
      return label.to_string();
    }
    let mut chars: Vec<char> = label.chars().collect();
    while !chars.is_empty() {
      chars.pop();
      let candidate: String = chars.iter().collect::<String>() + "...";
      if text_size(scale, &self.font, &candidate).0 <= max_width {
        return candidate;
      }
    }
    String::new()
  }
}

impl ChartRenderer for BarChart {
  fn render(&self, title: &str, series: &[(String, usize)]) -> Result<RgbImage, ChartError> {
    if series.is_empty() {
      return Err(ChartError::EmptySeries);
    }
    let (left, top, right, bottom) = self.plot_area().ok_or(ChartError::CanvasTooSmall {
      width: self.width,
      height: self.height,
    })?;

    let mut image = RgbImage::from_pixel(self.width, self.height, BACKGROUND);
    self.draw_centered(&mut image, title, self.width as i32 / 2, 20, TITLE_SIZE);

    let max_count = series.iter().map(|(_, c)| *c).max().unwrap_or(0).max(1);
    let step = tick_step(max_count);
    let y_max = max_count.div_ceil(step) * step;
    let plot_h = (bottom - top) as f32;
    let y_of = |value: usize| bottom - (value as f32 / y_max as f32 * plot_h).round() as i32;

    // 纵轴刻度与网格线
    let tick_scale = PxScale::from(TICK_SIZE);
    for value in (0..=y_max).step_by(step) {
      let y = y_of(value);
      draw_line_segment_mut(
        &mut image,
        (left as f32, y as f32),
        (right as f32, y as f32),
        GRID,
      );
      let text = value.to_string();
      let (tw, th) = text_size(tick_scale, &self.font, &text);
      draw_text_mut(
        &mut image,
        INK,
        left - 10 - tw as i32,
        y - th as i32 / 2,
        tick_scale,
        &self.font,
        &text,
      );
    }

    let slot = (right - left) as f32 / series.len() as f32;
    let bar_w = (slot * BAR_FILL_RATIO).max(1.0);
    let label_scale = PxScale::from(TICK_SIZE);

    for (i, (label, count)) in series.iter().enumerate() {
      let color = viridis(i, series.len());
      let x0 = left as f32 + slot * i as f32 + (slot - bar_w) / 2.0;
      let y0 = y_of(*count);
      let height = (bottom - y0).max(0) as u32;
      if height > 0 {
        let rect = Rect::at(x0.round() as i32, y0).of_size(bar_w.round() as u32, height);
        draw_filled_rect_mut(&mut image, rect, color);
      }

      let cx = (x0 + bar_w / 2.0).round() as i32;
      let count_text = count.to_string();
      let (_, th) = text_size(tick_scale, &self.font, &count_text);
      self.draw_centered(&mut image, &count_text, cx, y0 - th as i32 - 6, TICK_SIZE);

      let fitted = self.fit_label(label, slot.max(1.0) as u32, label_scale);
      self.draw_centered(&mut image, &fitted, cx, bottom + 10, TICK_SIZE);
    }

    // 坐标轴
    draw_line_segment_mut(
      &mut image,
      (left as f32, top as f32),
      (left as f32, bottom as f32),
      INK,
    );
    draw_line_segment_mut(
      &mut image,
      (left as f32, bottom as f32),
      (right as f32, bottom as f32),
      INK,
    );

    self.draw_centered(
      &mut image,
      "Damage Type",
      (left + right) / 2,
      self.height as i32 - MARGIN_BOTTOM / 2,
      AXIS_LABEL_SIZE,
    );
    draw_text_mut(
      &mut image,
      INK,
      10,
      top - 40,
      PxScale::from(AXIS_LABEL_SIZE),
      &self.font,
      "Count",
    );

    debug!("绘制柱状图: {} 个类别，最大值 {}", series.len(), max_count);
    Ok(image)
  }
}

/// 刻度间隔取 1、2、5 乘 10 的幂
fn tick_step(max_count: usize) -> usize {
  let mut magnitude = 1;
  loop {
    for factor in [1, 2, 5] {
      let step = factor * magnitude;
      if max_count.div_ceil(step) <= MAX_Y_TICKS {
        return step;
      }
    }
    magnitude *= 10;
  }
}

fn viridis(index: usize, count: usize) -> Rgb<u8> {
  let t = if count <= 1 {
    0.0
  } else {
    index as f32 / (count - 1) as f32
  };
  let scaled = t * (VIRIDIS.len() - 1) as f32;
  let lo = (scaled.floor() as usize).min(VIRIDIS.len() - 1);
  let hi = (lo + 1).min(VIRIDIS.len() - 1);
  let frac = scaled - lo as f32;
  let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * frac).round() as u8;
  Rgb([
    mix(VIRIDIS[lo][0], VIRIDIS[hi][0]),
    mix(VIRIDIS[lo][1], VIRIDIS[hi][1]),
    mix(VIRIDIS[lo][2], VIRIDIS[hi][2]),
  ])
}
