//! 传统分类器（帕金森模型）使用的手工特征。
//!
//! 特征顺序必须与模型训练时一致，顺序由 [`FEATURE_NAMES`] 固定，
//! 并通过 [`FEATURE_SCHEMA_VERSION`] 与模型文件在加载时互相校验。

use crate::image::ImagePreprocessor;
use crate::utils::error::ServiceError;
use crate::Result;
use image::{DynamicImage, GrayImage};
use serde::Serialize;

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// 特征提取前灰度图的边长
pub const FEATURE_IMAGE_SIZE: u32 = 128;

pub const INTENSITY_FEATURES: usize = 10;
pub const HISTOGRAM_BINS: usize = 16;
pub const TEXTURE_FEATURES: usize = 6;
pub const EDGE_FEATURES: usize = 8;

pub const FEATURE_COUNT: usize =
    INTENSITY_FEATURES + HISTOGRAM_BINS + TEXTURE_FEATURES + EDGE_FEATURES;

const HISTOGRAM_EPS: f64 = 1e-7;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "mean",
    "std",
    "median",
    "min",
    "max",
    "p10",
    "p25",
    "p75",
    "p90",
    "variance",
    "hist_00",
    "hist_01",
    "hist_02",
    "hist_03",
    "hist_04",
    "hist_05",
    "hist_06",
    "hist_07",
    "hist_08",
    "hist_09",
    "hist_10",
    "hist_11",
    "hist_12",
    "hist_13",
    "hist_14",
    "hist_15",
    "glcm_contrast",
    "glcm_dissimilarity",
    "glcm_homogeneity",
    "glcm_energy",
    "glcm_correlation",
    "glcm_asm",
    "edge_mean",
    "edge_std",
    "edge_density",
    "edge_max",
    "sobel_x_abs_mean",
    "sobel_y_abs_mean",
    "sobel_x_std",
    "sobel_y_std",
];

/// 可选特征组是否编译进来
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeatureCapabilities {
    pub texture: bool,
    pub edges: bool,
}

impl FeatureCapabilities {
    pub fn degraded(&self) -> bool {
        !(self.texture && self.edges)
    }
}

/// 一行特征
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 按名称取值
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|idx| self.0[idx])
    }
}

pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn capabilities() -> FeatureCapabilities {
        FeatureCapabilities {
            texture: cfg!(feature = "texture"),
            edges: cfg!(feature = "edges"),
        }
    }

    /// 解码后的图像 -> 128x128 灰度 -> 特征
    pub fn from_image(image: &DynamicImage) -> Result<FeatureVector> {
        let gray = ImagePreprocessor::to_gray(image, FEATURE_IMAGE_SIZE);
        Self::extract(&gray)
    }

    pub fn extract(gray: &GrayImage) -> Result<FeatureVector> {
        let pixels = gray.as_raw();
        if pixels.is_empty() {
            return Err(ServiceError::ImageProcessing(
                "Cannot extract features from an empty image".to_string(),
            ));
        }

        let mut feats = Vec::with_capacity(FEATURE_COUNT);
        feats.extend(intensity_stats(pixels));
        feats.extend(histogram(pixels));

        match texture_features(gray) {
            Some(texture) => feats.extend(texture),
            None => {
                tracing::warn!("Texture features unavailable, substituting zeros");
                feats.extend([0.0; TEXTURE_FEATURES]);
            }
        }

        match edge_features(gray) {
            Some(edges) => feats.extend(edges),
            None => {
                tracing::warn!("Edge features unavailable, substituting zeros");
                feats.extend([0.0; EDGE_FEATURES]);
            }
        }

        debug_assert_eq!(feats.len(), FEATURE_COUNT);
        Ok(FeatureVector(feats))
    }
}

fn mean_std<I: Iterator<Item = f64> + Clone>(values: I) -> (f64, f64) {
    let (sum, count) = values.clone().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;
    let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
    (mean, var.sqrt())
}

/// 排序数据上的线性插值分位数
fn percentile(sorted: &[u8], p: f64) -> f64 {
    let pos = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let (a, b) = (sorted[lo] as f64, sorted[hi] as f64);
    a + (b - a) * (pos - lo as f64)
}

fn intensity_stats(pixels: &[u8]) -> [f64; INTENSITY_FEATURES] {
    let mut sorted = pixels.to_vec();
    sorted.sort_unstable();

    let (mean, std) = mean_std(pixels.iter().map(|&p| p as f64));
    [
        mean,
        std,
        percentile(&sorted, 50.0),
        sorted[0] as f64,
        sorted[sorted.len() - 1] as f64,
        percentile(&sorted, 10.0),
        percentile(&sorted, 25.0),
        percentile(&sorted, 75.0),
        percentile(&sorted, 90.0),
        std * std,
    ]
}

fn histogram(pixels: &[u8]) -> [f64; HISTOGRAM_BINS] {
    let mut bins = [0.0; HISTOGRAM_BINS];
    let width = 256 / HISTOGRAM_BINS;
    for &p in pixels {
        bins[p as usize / width] += 1.0;
    }
    let total: f64 = bins.iter().sum::<f64>() + HISTOGRAM_EPS;
    for b in bins.iter_mut() {
        *b /= total;
    }
    bins
}

#[cfg(feature = "texture")]
fn texture_features(gray: &GrayImage) -> Option<[f64; TEXTURE_FEATURES]> {
    use ndarray::Array2;

    // 距离1、角度0、256级、对称、归一化
    let mut glcm = Array2::<f64>::zeros((256, 256));
    let (w, h) = gray.dimensions();
    for y in 0..h {
        for x in 0..w.saturating_sub(1) {
            let i = gray.get_pixel(x, y)[0] as usize;
            let j = gray.get_pixel(x + 1, y)[0] as usize;
            glcm[[i, j]] += 1.0;
            glcm[[j, i]] += 1.0;
        }
    }

    let total = glcm.sum();
    if total == 0.0 {
        return None;
    }
    glcm /= total;

    let (mut contrast, mut dissimilarity, mut homogeneity, mut asm) = (0.0, 0.0, 0.0, 0.0);
    let (mut mu_i, mut mu_j) = (0.0, 0.0);
    for ((i, j), &p) in glcm.indexed_iter() {
        if p == 0.0 {
            continue;
        }
        let d = i as f64 - j as f64;
        contrast += p * d * d;
        dissimilarity += p * d.abs();
        homogeneity += p / (1.0 + d * d);
        asm += p * p;
        mu_i += i as f64 * p;
        mu_j += j as f64 * p;
    }

    let (mut var_i, mut var_j, mut cov) = (0.0, 0.0, 0.0);
    for ((i, j), &p) in glcm.indexed_iter() {
        if p == 0.0 {
            continue;
        }
        let di = i as f64 - mu_i;
        let dj = j as f64 - mu_j;
        var_i += p * di * di;
        var_j += p * dj * dj;
        cov += p * di * dj;
    }

    let denom = var_i.sqrt() * var_j.sqrt();
    let correlation = if denom < 1e-15 { 1.0 } else { cov / denom };

    Some([
        contrast,
        dissimilarity,
        homogeneity,
        asm.sqrt(),
        correlation,
        asm,
    ])
}

#[cfg(not(feature = "texture"))]
fn texture_features(_gray: &GrayImage) -> Option<[f64; TEXTURE_FEATURES]> {
    None
}

#[cfg(feature = "edges")]
fn edge_features(gray: &GrayImage) -> Option<[f64; EDGE_FEATURES]> {
    use imageproc::{edges::canny, gradients};

    const CANNY_LOW: f32 = 50.0;
    const CANNY_HIGH: f32 = 150.0;

    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return None;
    }

    let edges = canny(gray, CANNY_LOW, CANNY_HIGH);
    let edge_values = edges.as_raw();
    let (edge_mean, edge_std) = mean_std(edge_values.iter().map(|&v| v as f64));
    let density =
        edge_values.iter().filter(|&&v| v > 0).count() as f64 / edge_values.len() as f64;
    let edge_max = edge_values.iter().copied().max().unwrap_or(0) as f64;

    let sx = gradients::horizontal_sobel(gray);
    let sy = gradients::vertical_sobel(gray);
    let abs_mean = |v: &[i16]| v.iter().map(|&g| (g as f64).abs()).sum::<f64>() / v.len() as f64;
    let (_, sx_std) = mean_std(sx.as_raw().iter().map(|&g| g as f64));
    let (_, sy_std) = mean_std(sy.as_raw().iter().map(|&g| g as f64));

    Some([
        edge_mean,
        edge_std,
        density,
        edge_max,
        abs_mean(sx.as_raw().as_slice()),
        abs_mean(sy.as_raw().as_slice()),
        sx_std,
        sy_std,
    ])
}

#[cfg(not(feature = "edges"))]
fn edge_features(_gray: &GrayImage) -> Option<[f64; EDGE_FEATURES]> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use proptest::prelude::*;

    const TEXTURE_START: usize = INTENSITY_FEATURES + HISTOGRAM_BINS;
    const EDGE_START: usize = TEXTURE_START + TEXTURE_FEATURES;

    fn gradient_image(size: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]))
    }

    #[test]
    fn names_cover_every_feature() {
        assert_eq!(FEATURE_NAMES.len(), FEATURE_COUNT);
        assert_eq!(FEATURE_COUNT, 40);
    }

    #[test]
    fn length_is_fixed_regardless_of_content() {
        let a = FeatureExtractor::extract(&gradient_image(128)).unwrap();
        let b = FeatureExtractor::extract(&GrayImage::new(128, 128)).unwrap();
        assert_eq!(a.len(), FEATURE_COUNT);
        assert_eq!(b.len(), FEATURE_COUNT);
    }

    #[test]
    fn extraction_is_deterministic() {
        let img = gradient_image(128);
        assert_eq!(
            FeatureExtractor::extract(&img).unwrap(),
            FeatureExtractor::extract(&img).unwrap()
        );
    }

    #[test]
    fn histogram_sums_to_one() {
        let feats = FeatureExtractor::extract(&gradient_image(64)).unwrap();
        let hist = &feats.as_slice()[INTENSITY_FEATURES..INTENSITY_FEATURES + HISTOGRAM_BINS];
        let sum: f64 = hist.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6, "histogram sum was {sum}");
    }

    #[test]
    fn tiny_images_zero_fill_edge_group() {
        for (w, h) in [(2, 2), (1, 7), (7, 1)] {
            let img = GrayImage::from_fn(w, h, |x, y| Luma([(x * 40 + y * 25) as u8]));
            let feats = FeatureExtractor::extract(&img).unwrap();
            assert_eq!(feats.len(), FEATURE_COUNT);
            assert!(
                feats.as_slice()[EDGE_START..].iter().all(|v| *v == 0.0),
                "edge slots not zero for {w}x{h}"
            );
        }
    }

    #[test]
    fn single_column_zero_fills_texture_group() {
        let img = GrayImage::from_fn(1, 9, |_, y| Luma([(y * 20) as u8]));
        let feats = FeatureExtractor::extract(&img).unwrap();
        assert_eq!(feats.len(), FEATURE_COUNT);
        assert!(feats.as_slice()[TEXTURE_START..].iter().all(|v| *v == 0.0));
        assert!(feats.get("max").unwrap() > 0.0);
    }

    proptest! {
        #[test]
        fn histogram_sums_to_one_for_any_image(
            (w, h, pixels) in (1u32..48, 1u32..48).prop_flat_map(|(w, h)| {
                (Just(w), Just(h), prop::collection::vec(any::<u8>(), (w * h) as usize))
            })
        ) {
            let img = GrayImage::from_raw(w, h, pixels).unwrap();
            let feats = FeatureExtractor::extract(&img).unwrap();
            prop_assert_eq!(feats.len(), FEATURE_COUNT);
            let sum: f64 = feats.as_slice()[INTENSITY_FEATURES..TEXTURE_START].iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-6, "histogram sum was {}", sum);
        }
    }

    #[test]
    fn intensity_stats_match_known_values() {
        // 0..=9 各出现一次
        let img = GrayImage::from_fn(10, 1, |x, _| Luma([x as u8]));
        let feats = FeatureExtractor::extract(&img).unwrap();
        assert!((feats.get("mean").unwrap() - 4.5).abs() < 1e-9);
        assert!((feats.get("median").unwrap() - 4.5).abs() < 1e-9);
        assert_eq!(feats.get("min").unwrap(), 0.0);
        assert_eq!(feats.get("max").unwrap(), 9.0);
        assert!((feats.get("p10").unwrap() - 0.9).abs() < 1e-9);
        assert!((feats.get("p90").unwrap() - 8.1).abs() < 1e-9);
        assert!((feats.get("variance").unwrap() - 8.25).abs() < 1e-9);
        assert_eq!(feats.len(), FEATURE_COUNT);
        assert!(feats.as_slice()[EDGE_START..].iter().all(|v| *v == 0.0));
    }

    #[cfg(feature = "texture")]
    #[test]
    fn glcm_of_constant_image() {
        let img = GrayImage::from_pixel(16, 16, Luma([100]));
        let feats = FeatureExtractor::extract(&img).unwrap();
        assert_eq!(feats.get("glcm_contrast").unwrap(), 0.0);
        assert_eq!(feats.get("glcm_dissimilarity").unwrap(), 0.0);
        assert!((feats.get("glcm_homogeneity").unwrap() - 1.0).abs() < 1e-12);
        assert!((feats.get("glcm_energy").unwrap() - 1.0).abs() < 1e-12);
        assert!((feats.get("glcm_asm").unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(feats.get("glcm_correlation").unwrap(), 1.0);
    }

    #[cfg(feature = "texture")]
    #[test]
    fn glcm_of_alternating_columns() {
        let img = GrayImage::from_fn(8, 8, |x, _| Luma([if x % 2 == 0 { 0 } else { 2 }]));
        let feats = FeatureExtractor::extract(&img).unwrap();
        assert!((feats.get("glcm_contrast").unwrap() - 4.0).abs() < 1e-12);
        assert!((feats.get("glcm_dissimilarity").unwrap() - 2.0).abs() < 1e-12);
        assert!((feats.get("glcm_correlation").unwrap() + 1.0).abs() < 1e-12);
    }

    #[cfg(feature = "edges")]
    #[test]
    fn flat_image_has_no_edges() {
        let img = GrayImage::from_pixel(32, 32, Luma([80]));
        let feats = FeatureExtractor::extract(&img).unwrap();
        assert_eq!(feats.get("edge_density").unwrap(), 0.0);
        assert_eq!(feats.get("sobel_x_abs_mean").unwrap(), 0.0);
    }

    #[test]
    fn capabilities_follow_cargo_features() {
        let caps = FeatureExtractor::capabilities();
        assert_eq!(caps.texture, cfg!(feature = "texture"));
        assert_eq!(caps.edges, cfg!(feature = "edges"));
    }
}
