use thiserror::Error;

/// 像素源无法产出灰度栅格
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PixelError {
    #[error("Image decode failed: {0}")]
    Decode(String),
    #[error("Image has no pixels")]
    EmptyImage,
    #[error("Unsupported frame data: {0}")]
    Unsupported(String),
}

/// 单次比较中某一级失败的类型化结果
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompareError {
    #[error("Pixel access failed: {0}")]
    Pixel(#[from] PixelError),
    #[error("Hash length mismatch: {left} vs {right} bits")]
    HashLengthMismatch { left: u32, right: u32 },
    #[error("Raster is empty")]
    EmptyRaster,
    #[error("Raster dimensions differ: {left:?} vs {right:?}")]
    DimensionMismatch { left: (u32, u32), right: (u32, u32) },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: String },
    #[error("Config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Invalid config: {0}")]
    Config(#[from] ConfigError),
    #[error("Frame indices must be strictly increasing: {previous} then {next}")]
    UnorderedFrames { previous: u64, next: u64 },
    #[error("Worker pool error: {0}")]
    Pool(String),
}
