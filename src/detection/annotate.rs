// 该文件是 Shanan （山南西风） 项目的一部分。
// src/detection/annotate.rs - 检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontArc, InvalidFont, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::debug;

use crate::detection::Detection;

const PALETTE_SIZE: usize = 32;
const LABEL_FONT_SIZE: f32 = 18.0;
const LABEL_PADDING: i32 = 2;
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Error, Debug)]
pub enum AnnotateError {
  #[error("image error: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 在原图上绘制检测框与标签
pub struct Annotator {
  font: FontArc,
  font_scale: PxScale,
  colors: Vec<Rgb<u8>>,
}

impl Annotator {
  pub fn new() -> Result<Self, InvalidFont> {
    let font = crate::font::embedded_font()?;

    let colors = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Ok(Self {
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      colors,
    })
  }

  /// 同一类别总是使用同一颜色
  fn color_for(&self, label: &str) -> Rgb<u8> {
    let hash = label
      .bytes()
      .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    self.colors[hash % self.colors.len()]
  }

  pub fn annotate(&self, image: &mut RgbImage, detections: &[Detection]) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    for detection in detections {
      let color = self.color_for(&detection.class_label);
      let [x_min, y_min, x_max, y_max] = detection.bounding_box.to_xyxy();

      let x_min = (x_min.floor() as i32).clamp(0, w - 1);
      let y_min = (y_min.floor() as i32).clamp(0, h - 1);
      let x_max = (x_max.ceil() as i32).clamp(0, w - 1);
      let y_max = (y_max.ceil() as i32).clamp(0, h - 1);

      if x_min >= x_max || y_min >= y_max {
        continue;
      }

      // 边框加粗为 2 像素
      for thickness in 0..2 {
        let width = (x_max - x_min - 2 * thickness).max(1) as u32;
        let height = (y_max - y_min - 2 * thickness).max(1) as u32;
        let rect = Rect::at(x_min + thickness, y_min + thickness).of_size(width, height);
        draw_hollow_rect_mut(image, rect, color);
      }

      let label = format!("{} {:.2}", detection.class_label, detection.confidence);
      let (text_w, text_h) = text_size(self.font_scale, &self.font, &label);
      let label_h = text_h as i32 + 2 * LABEL_PADDING;
      let label_x = x_min;
      let label_y = (y_min - label_h).max(0);
      let label_w = (text_w as i32 + 2 * LABEL_PADDING).min(w - label_x);

      if label_w > 0 && label_h > 0 {
        let background = Rect::at(label_x, label_y).of_size(label_w as u32, label_h as u32);
        draw_filled_rect_mut(image, background, color);
        draw_text_mut(
          image,
          LABEL_TEXT_COLOR,
          label_x + LABEL_PADDING,
          label_y + LABEL_PADDING,
          self.font_scale,
          &self.font,
          &label,
        );
      }
    }
  }

  pub fn annotate_file(
    &self,
    source: &Path,
    target: &Path,
    detections: &[Detection],
  ) -> Result<(), AnnotateError> {
    let mut image = image::open(source)?.to_rgb8();
    self.annotate(&mut image, detections);
    image.save(target)?;
    debug!("保存可视化结果: {}", target.display());
    Ok(())
  }
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detection::BoundingBox;

  fn dent(cx: f32, cy: f32, width: f32, height: f32) -> Detection {
    Detection {
      class_label: "dent".to_string(),
      confidence: 0.9,
      bounding_box: BoundingBox {
        cx,
        cy,
        width,
        height,
      },
    }
  }

  #[test]
  fn draws_box_edges_in_class_color() {
    let annotator = Annotator::new().unwrap();
    let mut image = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
    annotator.annotate(&mut image, &[dent(50.0, 60.0, 40.0, 40.0)]);

    let color = annotator.color_for("dent");
    assert_eq!(*image.get_pixel(30, 70), color);
    assert_eq!(*image.get_pixel(50, 60), Rgb([0, 0, 0]));
  }

  #[test]
  fn boxes_outside_the_image_are_ignored() {
    let annotator = Annotator::new().unwrap();
    let mut image = RgbImage::from_pixel(20, 20, Rgb([0, 0, 0]));
    let before = image.clone();
    annotator.annotate(&mut image, &[dent(-50.0, -50.0, 10.0, 10.0)]);
    assert_eq!(image, before);
  }

  #[test]
  fn hsv_primaries() {
    assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), Rgb([255, 0, 0]));
    assert_eq!(hsv_to_rgb(120.0, 1.0, 1.0), Rgb([0, 255, 0]));
  }
}
