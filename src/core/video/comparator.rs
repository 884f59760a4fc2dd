//! 帧比较器：大小闸门 -> pHash -> SSIM / 基础像素差，失败逐级降级

use super::config::{ComparisonMethod, EngineConfig};
use super::error::CompareError;
use super::frame::Frame;
use super::phash;
use super::pixels::{ImageDecoder, PixelSource};
use super::similarity;
use log::debug;

/// 产出结论的那一级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectionMethod {
    SizeIdentical,
    SizeDiff,
    PHash,
    SsimLike,
    Basic,
    ErrorFallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Auxiliary {
    None,
    Distance(u32),
    Similarity(f64),
    DiffCount { diff_count: usize, total_pixels: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    pub changed: bool,
    pub method: DetectionMethod,
    /// 含义取决于 method：大小比 / 汉明距离/64 / 1-SSIM / 差异像素比
    pub change_ratio: f64,
    pub auxiliary: Auxiliary,
    /// 降级前遇到的第一个错误
    pub fault: Option<CompareError>,
}

impl ComparisonResult {
    fn new(changed: bool, method: DetectionMethod, change_ratio: f64, auxiliary: Auxiliary) -> Self {
        Self {
            changed,
            method,
            change_ratio,
            auxiliary,
            fault: None,
        }
    }

    fn error_fallback(fault: CompareError) -> Self {
        Self {
            changed: true,
            method: DetectionMethod::ErrorFallback,
            change_ratio: 1.0,
            auxiliary: Auxiliary::None,
            fault: Some(fault),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.fault.is_some()
    }
}

/// |lenA - lenB| / max(lenA, lenB)，按编码后字节长度
pub fn size_ratio(len_a: usize, len_b: usize) -> f64 {
    let max = len_a.max(len_b);
    if max == 0 {
        return 0.0;
    }
    len_a.abs_diff(len_b) as f64 / max as f64
}

pub struct FrameComparator<P = ImageDecoder> {
    pixels: P,
    config: EngineConfig,
}

impl FrameComparator<ImageDecoder> {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_pixels(ImageDecoder::new(), config)
    }
}

impl<P: PixelSource> FrameComparator<P> {
    pub fn with_pixels(pixels: P, config: EngineConfig) -> Self {
        Self { pixels, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pixels(&self) -> &P {
        &self.pixels
    }

    pub fn compare(&self, a: &Frame, b: &Frame) -> ComparisonResult {
        self.compare_with(a, b, self.config.comparison_method)
    }

    pub fn compare_with(&self, a: &Frame, b: &Frame, method: ComparisonMethod) -> ComparisonResult {
        if let Some(result) = self.size_gate(a, b) {
            return result;
        }

        match method {
            ComparisonMethod::Basic => self
                .basic(a, b)
                .unwrap_or_else(ComparisonResult::error_fallback),
            ComparisonMethod::Default => match self.perceptual(a, b) {
                Ok(result) => result,
                Err(fault) => {
                    debug!(
                        "frames {}/{}: perceptual path failed ({}), falling back to basic",
                        a.index, b.index, fault
                    );
                    match self.basic(a, b) {
                        Ok(mut result) => {
                            result.fault = Some(fault);
                            result
                        }
                        Err(e) => {
                            debug!(
                                "frames {}/{}: basic diff failed too ({}), treating as changed",
                                a.index, b.index, e
                            );
                            ComparisonResult::error_fallback(fault)
                        }
                    }
                }
            },
        }
    }

    /// 不解码像素，只看字节长度
    fn size_gate(&self, a: &Frame, b: &Frame) -> Option<ComparisonResult> {
        let ratio = size_ratio(a.byte_len(), b.byte_len());
        if ratio < self.config.size_identical_threshold {
            return Some(ComparisonResult::new(
                false,
                DetectionMethod::SizeIdentical,
                ratio,
                Auxiliary::None,
            ));
        }
        if ratio > self.config.size_diff_threshold {
            return Some(ComparisonResult::new(
                true,
                DetectionMethod::SizeDiff,
                ratio,
                Auxiliary::None,
            ));
        }
        None
    }

    fn basic(&self, a: &Frame, b: &Frame) -> Result<ComparisonResult, CompareError> {
        let diff = similarity::basic_diff(&self.pixels, a, b, self.config.pixel_diff_threshold)?;
        Ok(ComparisonResult::new(
            diff.change_ratio > self.config.change_ratio_threshold,
            DetectionMethod::Basic,
            diff.change_ratio,
            Auxiliary::DiffCount {
                diff_count: diff.diff_count,
                total_pixels: diff.total_pixels,
            },
        ))
    }

    /// 距离大 -> 变化；距离 0 -> 不变；中间地带交给 SSIM
    fn perceptual(&self, a: &Frame, b: &Frame) -> Result<ComparisonResult, CompareError> {
        let hash_a = phash::hash(&self.pixels, a)?;
        let hash_b = phash::hash(&self.pixels, b)?;
        let distance = hash_a.hamming_distance(&hash_b)?;

        if distance > self.config.hamming_threshold_up {
            return Ok(ComparisonResult::new(
                true,
                DetectionMethod::PHash,
                distance as f64 / 64.0,
                Auxiliary::Distance(distance),
            ));
        }
        if distance == 0 {
            return Ok(ComparisonResult::new(
                false,
                DetectionMethod::PHash,
                0.0,
                Auxiliary::Distance(0),
            ));
        }

        let score = similarity::ssim(&self.pixels, a, b)?;
        Ok(ComparisonResult::new(
            score < self.config.ssim_threshold,
            DetectionMethod::SsimLike,
            (1.0 - score).clamp(0.0, 1.0),
            Auxiliary::Similarity(score),
        ))
    }
}
