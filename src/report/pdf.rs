// 该文件是 Shanan （山南西风） 项目的一部分。
// src/report/pdf.rs - PDF 绘制
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

use std::borrow::Cow;
use std::io::{BufWriter, Cursor};

use image::RgbImage;
use printpdf::image_crate::{DynamicImage, RgbImage as PdfRgbImage};
use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{
  BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Line, Mm, PdfDocument,
  PdfLayerReference, Point, Polygon, Rgb,
};
use thiserror::Error;
use tracing::debug;

use crate::font::DEJAVU_SANS;
use crate::report::layout::{DrawOp, FontWeight, PagePlan, Shade};

const LAYER_NAME: &str = "Layer 1";
const OUTLINE_THICKNESS: f32 = 0.5;
// 72 dpi 下一个像素即一个 pt
const IMAGE_DPI: f32 = 72.0;
const INK: Shade = [0.0, 0.0, 0.0];

#[derive(Error, Debug)]
pub enum RenderError {
  #[error("PDF error: {0}")]
  Pdf(#[from] printpdf::Error),
  #[error("PDF buffer error: {0}")]
  Buffer(String),
  #[error("image buffer of {width}x{height} does not match its pixel data")]
  ImageBuffer { width: u32, height: u32 },
  #[error("document has no pages")]
  Empty,
}

/// 把绘制指令序列化为文档
pub trait Canvas {
  type Error: std::error::Error + Send + Sync + 'static;

  fn render(
    &self,
    title: &str,
    width: f32,
    height: f32,
    pages: &[PagePlan],
  ) -> Result<Vec<u8>, Self::Error>;
}

/// 内置 Helvetica 只能编码 ASCII，其余文本改用嵌入的 TrueType 字体
///
/// 默认字体为 DejaVu Sans，不含中日韩字形；需要时用 [`PdfCanvas::with_font`] 替换。
#[derive(Clone)]
pub struct PdfCanvas {
  unicode_font: Cow<'static, [u8]>,
}

impl Default for PdfCanvas {
  fn default() -> Self {
    Self {
      unicode_font: Cow::Borrowed(DEJAVU_SANS),
    }
  }
}

impl PdfCanvas {
  pub fn with_font(font: Vec<u8>) -> Self {
    Self {
      unicode_font: Cow::Owned(font),
    }
  }
}

fn mm(pt: f32) -> Mm {
  Mm(pt * 25.4 / 72.0)
}

fn color([r, g, b]: Shade) -> Color {
  Color::Rgb(Rgb::new(r, g, b, None))
}

struct Fonts {
  regular: IndirectFontRef,
  bold: IndirectFontRef,
  unicode: Option<IndirectFontRef>,
}

impl Fonts {
  fn get(&self, weight: FontWeight, text: &str) -> &IndirectFontRef {
    match (&self.unicode, weight) {
      (Some(unicode), _) if !text.is_ascii() => unicode,
      (_, FontWeight::Regular) => &self.regular,
      (_, FontWeight::Bold) => &self.bold,
    }
  }
}

fn rectangle(x: f32, y: f32, width: f32, height: f32) -> Vec<(Point, bool)> {
  [(x, y), (x + width, y), (x + width, y + height), (x, y + height)]
    .into_iter()
    .map(|(px, py)| (Point::new(mm(px), mm(py)), false))
    .collect()
}

/// printpdf 依赖的 image 版本与本项目不同，经原始字节转换
fn to_pdf_image(pixels: &RgbImage) -> Result<DynamicImage, RenderError> {
  let (width, height) = pixels.dimensions();
  PdfRgbImage::from_raw(width, height, pixels.as_raw().clone())
    .map(DynamicImage::ImageRgb8)
    .ok_or(RenderError::ImageBuffer { width, height })
}

fn draw(layer: &PdfLayerReference, fonts: &Fonts, op: &DrawOp) -> Result<(), RenderError> {
  match op {
    DrawOp::Text {
      text,
      x,
      y,
      size,
      weight,
    } => {
      layer.set_fill_color(color(INK));
      layer.use_text(text.as_str(), *size, mm(*x), mm(*y), fonts.get(*weight, text));
    }
    DrawOp::Rect {
      x,
      y,
      width,
      height,
      fill,
      stroke,
    } => {
      let mode = match (fill, stroke) {
        (Some(_), Some(_)) => PaintMode::FillStroke,
        (Some(_), None) => PaintMode::Fill,
        (None, Some(_)) => PaintMode::Stroke,
        (None, None) => return Ok(()),
      };
      if let Some(fill) = fill {
        layer.set_fill_color(color(*fill));
      }
      if let Some(stroke) = stroke {
        layer.set_outline_color(color(*stroke));
        layer.set_outline_thickness(OUTLINE_THICKNESS);
      }
      layer.add_polygon(Polygon {
        rings: vec![rectangle(*x, *y, *width, *height)],
        mode,
        winding_order: WindingOrder::NonZero,
      });
    }
    DrawOp::Line { from, to } => {
      layer.set_outline_color(color(INK));
      layer.set_outline_thickness(OUTLINE_THICKNESS);
      layer.add_line(Line {
        points: vec![
          (Point::new(mm(from.0), mm(from.1)), false),
          (Point::new(mm(to.0), mm(to.1)), false),
        ],
        is_closed: false,
      });
    }
    DrawOp::Image {
      pixels,
      x,
      y,
      width,
      height,
    } => {
      let (pw, ph) = pixels.dimensions();
      if pw == 0 || ph == 0 {
        return Ok(());
      }
      let image = Image::from_dynamic_image(&to_pdf_image(pixels)?);
      image.add_to_layer(
        layer.clone(),
        ImageTransform {
          translate_x: Some(mm(*x)),
          translate_y: Some(mm(*y)),
          scale_x: Some(width / pw as f32),
          scale_y: Some(height / ph as f32),
          dpi: Some(IMAGE_DPI),
          ..Default::default()
        },
      );
    }
  }
  Ok(())
}

impl Canvas for PdfCanvas {
  type Error = RenderError;

  fn render(
    &self,
    title: &str,
    width: f32,
    height: f32,
    pages: &[PagePlan],
  ) -> Result<Vec<u8>, Self::Error> {
    let (first, rest) = pages.split_first().ok_or(RenderError::Empty)?;

    let (doc, page, layer) = PdfDocument::new(title, mm(width), mm(height), LAYER_NAME);
    // 只有出现非 ASCII 文本时才嵌入字体
    let needs_unicode = pages
      .iter()
      .flat_map(|plan| plan.texts())
      .any(|text| !text.is_ascii());
    let unicode = if needs_unicode {
      debug!("嵌入 TrueType 字体用于非 ASCII 文本");
      Some(doc.add_external_font(Cursor::new(self.unicode_font.as_ref()))?)
    } else {
      None
    };
    let fonts = Fonts {
      regular: doc.add_builtin_font(BuiltinFont::Helvetica)?,
      bold: doc.add_builtin_font(BuiltinFont::HelveticaBold)?,
      unicode,
    };

    let layer = doc.get_page(page).get_layer(layer);
    for op in &first.ops {
      draw(&layer, &fonts, op)?;
    }

    for plan in rest {
      let (page, layer) = doc.add_page(mm(width), mm(height), LAYER_NAME);
      let layer = doc.get_page(page).get_layer(layer);
      for op in &plan.ops {
        draw(&layer, &fonts, op)?;
      }
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)?;
    let bytes = buf
      .into_inner()
      .map_err(|e| RenderError::Buffer(e.to_string()))?;
    debug!("PDF 序列化完成: {} 页, {} 字节", pages.len(), bytes.len());
    Ok(bytes)
  }
}
