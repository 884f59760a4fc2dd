//! 相似度指标：单窗口 SSIM 和基础像素差
//!
//! SSIM 用全图均值/方差/协方差（单窗口），下游阈值按这个公式标定，不要换成滑窗 SSIM。

use super::error::CompareError;
use super::frame::Frame;
use super::pixels::{GrayRaster, PixelSource};

pub const SSIM_C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
pub const SSIM_C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);
/// 基础比较前的轻度降噪
pub const BASIC_BLUR_SIGMA: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasicDiff {
    pub change_ratio: f64,
    pub diff_count: usize,
    pub total_pixels: usize,
}

/// 以 a 的原始尺寸为准，b 缩放到相同尺寸
pub fn ssim<P: PixelSource + ?Sized>(
    pixels: &P,
    a: &Frame,
    b: &Frame,
) -> Result<f64, CompareError> {
    let gray_a = pixels.grayscale(a)?;
    if gray_a.is_empty() {
        return Err(CompareError::EmptyRaster);
    }
    let gray_b = pixels.resize(b, gray_a.width(), gray_a.height())?;
    ssim_rasters(&gray_a, &gray_b)
}

pub fn ssim_rasters(a: &GrayRaster, b: &GrayRaster) -> Result<f64, CompareError> {
    check_pair(a, b)?;

    let n = a.pixel_count() as f64;
    let mean_a = a.data().iter().map(|&v| v as f64).sum::<f64>() / n;
    let mean_b = b.data().iter().map(|&v| v as f64).sum::<f64>() / n;

    let mut var_a = 0.0;
    let mut var_b = 0.0;
    let mut cov = 0.0;
    for (&x, &y) in a.data().iter().zip(b.data().iter()) {
        let dx = x as f64 - mean_a;
        let dy = y as f64 - mean_b;
        var_a += dx * dx;
        var_b += dy * dy;
        cov += dx * dy;
    }
    var_a /= n;
    var_b /= n;
    cov /= n;

    let numerator = (2.0 * mean_a * mean_b + SSIM_C1) * (2.0 * cov + SSIM_C2);
    let denominator =
        (mean_a * mean_a + mean_b * mean_b + SSIM_C1) * (var_a + var_b + SSIM_C2);
    Ok(numerator / denominator)
}

/// 两帧缩到 min(宽) x min(高)，模糊后逐像素比较
pub fn basic_diff<P: PixelSource + ?Sized>(
    pixels: &P,
    a: &Frame,
    b: &Frame,
    pixel_diff_threshold: u8,
) -> Result<BasicDiff, CompareError> {
    let dims_a = pixels.metadata(a)?;
    let dims_b = pixels.metadata(b)?;
    let width = dims_a.width.min(dims_b.width);
    let height = dims_a.height.min(dims_b.height);
    if width == 0 || height == 0 {
        return Err(CompareError::EmptyRaster);
    }

    let raster_a = pixels.blur(&pixels.resize(a, width, height)?, BASIC_BLUR_SIGMA);
    let raster_b = pixels.blur(&pixels.resize(b, width, height)?, BASIC_BLUR_SIGMA);
    diff_rasters(&raster_a, &raster_b, pixel_diff_threshold)
}

pub fn diff_rasters(
    a: &GrayRaster,
    b: &GrayRaster,
    pixel_diff_threshold: u8,
) -> Result<BasicDiff, CompareError> {
    check_pair(a, b)?;

    let diff_count = a
        .data()
        .iter()
        .zip(b.data().iter())
        .filter(|(&x, &y)| x.abs_diff(y) > pixel_diff_threshold)
        .count();
    let total_pixels = a.pixel_count();

    Ok(BasicDiff {
        change_ratio: diff_count as f64 / total_pixels as f64,
        diff_count,
        total_pixels,
    })
}

fn check_pair(a: &GrayRaster, b: &GrayRaster) -> Result<(), CompareError> {
    a.validate()?;
    b.validate()?;
    if a.dimensions() != b.dimensions() {
        return Err(CompareError::DimensionMismatch {
            left: (a.width(), a.height()),
            right: (b.width(), b.height()),
        });
    }
    if a.is_empty() {
        return Err(CompareError::EmptyRaster);
    }
    Ok(())
}
