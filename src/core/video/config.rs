use super::error::ConfigError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonMethod {
    /// pHash + SSIM
    #[default]
    Default,
    /// 逐像素差异
    Basic,
}

/// 引擎参数（扁平数值阈值 + 比较方法）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub comparison_method: ComparisonMethod,
    pub hamming_threshold_up: u32,
    pub ssim_threshold: f64,
    pub pixel_diff_threshold: u8,
    pub change_ratio_threshold: f64,
    pub enable_double_verification: bool,
    pub verification_count: u32,
    pub size_identical_threshold: f64,
    pub size_diff_threshold: f64,
    /// None = 核数 - 1
    pub workers: Option<usize>,
    /// None = 按 worker 数均分
    pub chunk_size: Option<usize>,
    pub min_chunk_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            comparison_method: ComparisonMethod::Default,
            hamming_threshold_up: 5,
            ssim_threshold: 0.999,
            pixel_diff_threshold: 30,
            change_ratio_threshold: 0.005,
            enable_double_verification: true,
            verification_count: 2,
            size_identical_threshold: 0.0005,
            size_diff_threshold: 0.05,
            workers: None,
            chunk_size: None,
            min_chunk_len: 32,
        }
    }
}

impl EngineConfig {
    /// 细微变化也算新幻灯片（例如逐行出现的要点）
    pub fn sensitive() -> Self {
        Self {
            hamming_threshold_up: 3,
            ssim_threshold: 0.9995,
            change_ratio_threshold: 0.002,
            pixel_diff_threshold: 20,
            ..Self::default()
        }
    }

    /// 录屏噪声大、动画多
    pub fn tolerant() -> Self {
        Self {
            hamming_threshold_up: 8,
            ssim_threshold: 0.995,
            change_ratio_threshold: 0.01,
            pixel_diff_threshold: 40,
            verification_count: 3,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn out_of_range(field: &'static str, value: impl ToString) -> ConfigError {
            ConfigError::OutOfRange {
                field,
                value: value.to_string(),
            }
        }

        if !(self.ssim_threshold > 0.0 && self.ssim_threshold <= 1.0) {
            return Err(out_of_range("ssim_threshold", self.ssim_threshold));
        }
        if !(0.0..=1.0).contains(&self.change_ratio_threshold) {
            return Err(out_of_range(
                "change_ratio_threshold",
                self.change_ratio_threshold,
            ));
        }
        if self.verification_count == 0 {
            return Err(out_of_range("verification_count", self.verification_count));
        }
        if !(self.size_identical_threshold.is_finite() && self.size_identical_threshold >= 0.0) {
            return Err(out_of_range(
                "size_identical_threshold",
                self.size_identical_threshold,
            ));
        }
        if !(self.size_diff_threshold.is_finite()
            && self.size_diff_threshold >= self.size_identical_threshold)
        {
            return Err(out_of_range("size_diff_threshold", self.size_diff_threshold));
        }
        if self.workers == Some(0) {
            return Err(out_of_range("workers", 0));
        }
        if self.chunk_size == Some(0) {
            return Err(out_of_range("chunk_size", 0));
        }
        if self.min_chunk_len == 0 {
            return Err(out_of_range("min_chunk_len", 0));
        }
        Ok(())
    }

    /// 并行 worker 数：可用核数 - 1，至少 1
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1))
            .max(1)
    }

    /// 去抖需要的确认次数（关闭二次确认时为 1）
    pub fn required_confirmations(&self) -> u32 {
        if self.enable_double_verification {
            self.verification_count.max(1)
        } else {
            1
        }
    }
}
