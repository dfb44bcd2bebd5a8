// 该文件是 Shanan （山南西风） 项目的一部分。
// src/detection/yolo26.rs - RKNN YOLO26 检测后端
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
use std::sync::Mutex;

use image::imageops::{self, FilterType};
use rknpu::{Context, InitFlags, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detection::{DetectionModel, ModelOutput, RawDetection},
};

const YOLO26_NUM_INPUTS: u32 = 1;
const YOLO26_NUM_OUTPUTS: u32 = 6;
const YOLO26_DEFAULT_CLASS_NUM: usize = 80;
const YOLO26_INPUT_W: f32 = 640.0;
const YOLO26_INPUT_H: f32 = 640.0;
const YOLO26_HEAD_SIZES: [(usize, usize); 3] = [(80, 80), (40, 40), (20, 20)];
const YOLO26_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];
const YOLO26_OBJECT_THRESH: f32 = 0.5;

#[derive(Error, Debug)]
pub enum Yolo26Error {
  #[error("model load error: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("invalid model: {0}, error: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN error: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("model path error: {0}")]
  ModelPathError(String),
  #[error("image error: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("RKNN context poisoned")]
  Poisoned,
}

impl Yolo26Error {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    Yolo26Error::ModelInvalid(msg.to_string(), e)
  }
}

pub struct Yolo26 {
  context: Mutex<Context>,
  class_num: usize,
}

#[derive(Debug)]
pub struct Yolo26Builder {
  model_path: String,
  class_num: usize,
}

impl FromUrlWithScheme for Yolo26Builder {
  const SCHEME: &'static str = "yolo26";
}

impl FromUrl for Yolo26Builder {
  type Error = Yolo26Error;

  /// `yolo26:///models/damage.rknn?classes=6`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolo26Error::ModelPathError(format!(
        "model URL must use the {} scheme",
        Self::SCHEME
      )));
    }

    let class_num = url
      .query_pairs()
      .find(|(k, _)| k == "classes")
      .map(|(_, v)| {
        v.parse::<usize>()
          .map_err(|e| Yolo26Error::ModelPathError(format!("invalid classes: {}", e)))
      })
      .transpose()?
      .unwrap_or(YOLO26_DEFAULT_CLASS_NUM);

    Ok(Yolo26Builder {
      model_path: url.path().to_string(),
      class_num,
    })
  }
}

impl Yolo26Builder {
  pub fn build(self) -> Result<Yolo26, Yolo26Error> {
    info!("加载模型文件: {}", self.model_path);
    let mode_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      mode_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&mode_data, InitFlags::default())?;

    let num_inputs = context
      .num_inputs()
      .map_err(|e| Yolo26Error::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| Yolo26Error::invalid("无法获取输出数量", e))?;

    if num_inputs != YOLO26_NUM_INPUTS || num_outputs != YOLO26_NUM_OUTPUTS {
      error!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        YOLO26_NUM_INPUTS, YOLO26_NUM_OUTPUTS, num_inputs, num_outputs
      );
      return Err(Yolo26Error::invalid(
        &format!(
          "expected {}/{} inputs/outputs, found {}/{}",
          YOLO26_NUM_INPUTS, YOLO26_NUM_OUTPUTS, num_inputs, num_outputs
        ),
        rknpu::Error::InvalidModel,
      ));
    }

    info!("模型加载完成，类别数: {}", self.class_num);
    Ok(Yolo26 {
      context: Mutex::new(context),
      class_num: self.class_num,
    })
  }
}

/// 根据张量大小区分回归与分类输出
fn match_reg_cls_tensors<'a>(
  tensor1: &'a [f32],
  tensor2: &'a [f32],
  reg_expected: usize,
  cls_expected: usize,
) -> Option<(&'a [f32], &'a [f32])> {
  if tensor1.len() == reg_expected && tensor2.len() == cls_expected {
    Some((tensor1, tensor2))
  } else if tensor1.len() == cls_expected && tensor2.len() == reg_expected {
    Some((tensor2, tensor1))
  } else {
    None
  }
}

/// 解码单个检测头，输出归一化的 [x_min, y_min, x_max, y_max]
fn decode_head(
  reg: &[f32],
  cls: &[f32],
  class_num: usize,
  (map_h, map_w): (usize, usize),
  stride: f32,
) -> Vec<(u32, f32, [f32; 4])> {
  let spatial = map_h * map_w;
  let mut items = Vec::new();

  for h in 0..map_h {
    for w in 0..map_w {
      let idx = h * map_w + w;

      let (score, class_id) = {
        let mut max_logit = f32::MIN;
        let mut cls_idx = 0usize;
        for c in 0..class_num {
          let logit = cls[c * spatial + idx];
          if logit > max_logit {
            max_logit = logit;
            cls_idx = c;
          }
        }
        (sigmoid(max_logit), cls_idx as u32)
      };

      if score <= YOLO26_OBJECT_THRESH {
        continue;
      }

      let grid_x = (w as f32) + 0.5;
      let grid_y = (h as f32) + 0.5;

      let xmin = ((grid_x - reg[idx]) * stride).clamp(0.0, YOLO26_INPUT_W);
      let ymin = ((grid_y - reg[spatial + idx]) * stride).clamp(0.0, YOLO26_INPUT_H);
      let xmax = ((grid_x + reg[2 * spatial + idx]) * stride).clamp(0.0, YOLO26_INPUT_W);
      let ymax = ((grid_y + reg[3 * spatial + idx]) * stride).clamp(0.0, YOLO26_INPUT_H);

      items.push((
        class_id,
        score,
        [
          xmin / YOLO26_INPUT_W,
          ymin / YOLO26_INPUT_H,
          xmax / YOLO26_INPUT_W,
          ymax / YOLO26_INPUT_H,
        ],
      ));
    }
  }
  items
}

/// 归一化的角点坐标映射回原图像素，转为中心点格式
fn to_pixel_xywh([x0, y0, x1, y1]: [f32; 4], width: f32, height: f32) -> [f32; 4] {
  [
    (x0 + x1) / 2.0 * width,
    (y0 + y1) / 2.0 * height,
    (x1 - x0) * width,
    (y1 - y0) * height,
  ]
}

impl Yolo26 {
  /// 输出归一化的 [x_min, y_min, x_max, y_max]
  fn postprocess(&self, output: rknpu::Output) -> Vec<(u32, f32, [f32; 4])> {
    let mut items = Vec::new();

    for (head_idx, (&(map_h, map_w), stride)) in
      YOLO26_HEAD_SIZES.iter().zip(YOLO26_STRIDES).enumerate()
    {
      let spatial = map_h * map_w;
      let reg_expected = 4 * spatial;
      let cls_expected = self.class_num * spatial;

      let (Ok(tensor1), Ok(tensor2)) = (
        output.get_f32(head_idx * 2),
        output.get_f32(head_idx * 2 + 1),
      ) else {
        error!("获取检测头 {} 的输出失败", head_idx);
        continue;
      };

      let Some((reg, cls)) = match_reg_cls_tensors(tensor1, tensor2, reg_expected, cls_expected)
      else {
        error!(
          "检测头 {}: 输出大小不匹配 - {} / {}",
          head_idx,
          tensor1.len(),
          tensor2.len()
        );
        continue;
      };

      items.extend(decode_head(reg, cls, self.class_num, (map_h, map_w), stride));
    }

    debug!("检测到 {} 个物体", items.len());
    items
  }
}

impl DetectionModel for Yolo26 {
  type Error = Yolo26Error;

  fn infer(&self, image_path: &Path, _output_dir: &Path) -> Result<ModelOutput, Self::Error> {
    let image = image::open(image_path)?.to_rgb8();
    let (width, height) = (image.width() as f32, image.height() as f32);
    let input = imageops::resize(
      &image,
      YOLO26_INPUT_W as u32,
      YOLO26_INPUT_H as u32,
      FilterType::Triangle,
    );

    let items = {
      let context = self.context.lock().map_err(|_| Yolo26Error::Poisoned)?;
      debug!("设置模型输入");
      context.set_input(
        0,
        input.as_raw(),
        rknpu::TensorFormat::NHWC,
        TensorType::UInt8,
      )?;
      debug!("执行模型推理");
      context.run()?;
      let output = context.get_outputs()?;
      self.postprocess(output)
    };

    let detections = items
      .into_iter()
      .map(|(class_id, confidence, corners)| RawDetection {
        class_id,
        confidence,
        bbox: to_pixel_xywh(corners, width, height),
      })
      .collect();

    Ok(ModelOutput {
      detections,
      annotated: None,
    })
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}
