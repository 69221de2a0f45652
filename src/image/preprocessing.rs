use crate::Result;
use image::{imageops::FilterType, DynamicImage, GrayImage, Luma};
use ndarray::{Array4, ArrayD};

const DEFAULT_SIZE: usize = 224;
const DEFAULT_CHANNELS: usize = 3;

/// 通道排列方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    /// NHWC
    Last,
    /// NCHW
    First,
}

/// 模型期望的输入布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputLayout {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub order: ChannelOrder,
}

impl Default for InputLayout {
    fn default() -> Self {
        Self {
            height: DEFAULT_SIZE,
            width: DEFAULT_SIZE,
            channels: DEFAULT_CHANNELS,
            order: ChannelOrder::Last,
        }
    }
}

impl InputLayout {
    /// 根据模型声明的输入形状推断布局
    ///
    /// 动态维度（<= 0）回退到 224x224x3；非四维输入直接使用默认布局。
    pub fn from_shape(shape: Option<&[i64]>) -> Self {
        let shape = match shape {
            Some(s) if s.len() == 4 => s,
            _ => return Self::default(),
        };

        let is_channel_dim = |d: i64| d == 1 || d == 3;

        let (h, w, c, order) = if is_channel_dim(shape[3]) {
            (shape[1], shape[2], shape[3], ChannelOrder::Last)
        } else if is_channel_dim(shape[1]) {
            (shape[2], shape[3], shape[1], ChannelOrder::First)
        } else {
            (shape[1], shape[2], shape[3], ChannelOrder::Last)
        };

        Self {
            height: known_dim(h).unwrap_or(DEFAULT_SIZE),
            width: known_dim(w).unwrap_or(DEFAULT_SIZE),
            channels: known_dim(c).unwrap_or(DEFAULT_CHANNELS),
            order,
        }
    }

}

fn known_dim(d: i64) -> Option<usize> {
    if d > 0 {
        Some(d as usize)
    } else {
        None
    }
}

pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// 神经网络输入预处理：颜色转换、缩放、归一化到[0,1]、添加batch维度
    pub fn to_tensor(image: &DynamicImage, layout: &InputLayout) -> Result<ArrayD<f32>> {
        let (h, w) = (layout.height, layout.width);

        let nhwc = if layout.channels == 1 {
            // 先转灰度再缩放
            let gray = image::imageops::resize(
                &Self::to_luma(image),
                w as u32,
                h as u32,
                FilterType::Triangle,
            );
            Array4::from_shape_fn((1, h, w, 1), |(_, y, x, _)| {
                gray.get_pixel(x as u32, y as u32)[0] as f32 / 255.0
            })
        } else {
            let rgb = image
                .resize_exact(w as u32, h as u32, FilterType::Triangle)
                .to_rgb8();
            Array4::from_shape_fn((1, h, w, 3), |(_, y, x, c)| {
                rgb.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
            })
        };

        let tensor = match layout.order {
            ChannelOrder::Last => nhwc,
            ChannelOrder::First => nhwc
                .permuted_axes([0, 3, 1, 2])
                .as_standard_layout()
                .to_owned(),
        };

        tracing::debug!("Preprocessed tensor shape: {:?}", tensor.shape());
        Ok(tensor.into_dyn())
    }

    /// 特征提取用的灰度图：先转灰度，再用双三次插值缩放到固定尺寸
    pub fn to_gray(image: &DynamicImage, size: u32) -> GrayImage {
        image::imageops::resize(&Self::to_luma(image), size, size, FilterType::CatmullRom)
    }

    /// 8位灰度，彩色图按 ITU-R 601 权重 (299/587/114) 换算
    pub fn to_luma(image: &DynamicImage) -> GrayImage {
        match image {
            DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_) => image.to_luma8(),
            _ => {
                let rgb = image.to_rgb8();
                GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                    let [r, g, b] = rgb.get_pixel(x, y).0;
                    Luma([luma_601(r, g, b)])
                })
            }
        }
    }
}

/// 定点实现，与常见图像库的 RGB -> L 转换结果一致
fn luma_601(r: u8, g: u8, b: u8) -> u8 {
    let l = r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000;
    (l >> 16) as u8
}
