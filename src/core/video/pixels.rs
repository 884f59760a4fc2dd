//! 像素访问能力：解码、灰度、缩放、模糊
//!
//! 所有操作都是只读输入上的纯函数。解码失败时退化为默认尺寸的空白栅格，
//! 不让整条流水线失败。

use super::error::PixelError;
use super::frame::Frame;
use image::imageops::{self, FilterType};
use image::io::Reader as ImageReader;
use image::GrayImage;
use log::warn;
use std::io::Cursor;

/// 无法解码时使用的默认尺寸
pub const FALLBACK_WIDTH: u32 = 1280;
pub const FALLBACK_HEIGHT: u32 = 720;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// 灰度栅格，每像素一个亮度字节，行优先。长度始终等于 宽 x 高
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayRaster {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl GrayRaster {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, PixelError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(PixelError::Unsupported(format!(
                "raster {}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub(crate) fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// RGBA -> 灰度，亮度 = 0.299R + 0.587G + 0.114B
    pub fn from_rgba(width: u32, height: u32, rgba: &[u8]) -> Result<Self, PixelError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(PixelError::Unsupported(format!(
                "rgba {}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                rgba.len()
            )));
        }
        let data = rgba
            .chunks_exact(4)
            .map(|px| luminance(px[0], px[1], px[2]))
            .collect();
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 缓冲区长度与声明尺寸是否一致
    pub fn validate(&self) -> Result<(), PixelError> {
        let expected = self.dimensions().pixel_count();
        if self.data.len() != expected {
            return Err(PixelError::Unsupported(format!(
                "raster {}x{} holds {} bytes, expected {}",
                self.width,
                self.height,
                self.data.len(),
                expected
            )));
        }
        Ok(())
    }

    /// 最近邻缩放
    pub fn resize_nearest(&self, target_width: u32, target_height: u32) -> GrayRaster {
        if self.width == target_width && self.height == target_height {
            return self.clone();
        }
        let image = match GrayImage::from_raw(self.width, self.height, self.data.clone()) {
            Some(image) if !self.is_empty() && target_width > 0 && target_height > 0 => image,
            _ => return GrayRaster::filled(target_width, target_height, 0),
        };

        let resized = imageops::resize(&image, target_width, target_height, FilterType::Nearest);
        GrayRaster {
            width: target_width,
            height: target_height,
            data: resized.into_raw(),
        }
    }

    /// 可分离高斯模糊，半径 ceil(3σ)，边缘复制
    pub fn blur(&self, sigma: f32) -> GrayRaster {
        if sigma <= 0.0 || self.is_empty() {
            return self.clone();
        }

        let kernel = gaussian_kernel(sigma);
        let radius = (kernel.len() / 2) as isize;
        let w = self.width as usize;
        let h = self.height as usize;

        let mut horizontal = vec![0f32; w * h];
        for y in 0..h {
            let row = y * w;
            for x in 0..w {
                let mut acc = 0f32;
                for (k, weight) in kernel.iter().enumerate() {
                    let sx = (x as isize + k as isize - radius).clamp(0, w as isize - 1) as usize;
                    acc += self.data[row + sx] as f32 * weight;
                }
                horizontal[row + x] = acc;
            }
        }

        let mut data = vec![0u8; w * h];
        for y in 0..h {
            for x in 0..w {
                let mut acc = 0f32;
                for (k, weight) in kernel.iter().enumerate() {
                    let sy = (y as isize + k as isize - radius).clamp(0, h as isize - 1) as usize;
                    acc += horizontal[sy * w + x] * weight;
                }
                data[y * w + x] = acc.round().clamp(0.0, 255.0) as u8;
            }
        }

        GrayRaster {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

fn luminance(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}

fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as isize;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    for w in kernel.iter_mut() {
        *w /= sum;
    }
    kernel
}

/// 像素访问能力。比较器只通过这个接口读像素
pub trait PixelSource: Send + Sync {
    fn metadata(&self, frame: &Frame) -> Result<Dimensions, PixelError>;

    /// 原始尺寸的灰度栅格
    fn grayscale(&self, frame: &Frame) -> Result<GrayRaster, PixelError>;

    fn resize(&self, frame: &Frame, width: u32, height: u32) -> Result<GrayRaster, PixelError> {
        Ok(self.grayscale(frame)?.resize_nearest(width, height))
    }

    fn blur(&self, raster: &GrayRaster, sigma: f32) -> GrayRaster {
        raster.blur(sigma)
    }
}

/// 基于 image crate 的解码器（JPEG/PNG/BMP）
#[derive(Debug, Clone, Copy)]
pub struct ImageDecoder {
    fallback: Dimensions,
}

impl ImageDecoder {
    pub fn new() -> Self {
        Self {
            fallback: Dimensions::new(FALLBACK_WIDTH, FALLBACK_HEIGHT),
        }
    }

    /// 指定无法解码时的栅格尺寸（应与抽帧器输出分辨率一致，比较结果才有意义）
    pub fn with_fallback(width: u32, height: u32) -> Self {
        Self {
            fallback: Dimensions::new(width, height),
        }
    }

    pub fn fallback(&self) -> Dimensions {
        self.fallback
    }

    fn read_dimensions(frame: &Frame) -> Result<Dimensions, PixelError> {
        let reader = ImageReader::new(Cursor::new(frame.data.as_slice()))
            .with_guessed_format()
            .map_err(|e| PixelError::Decode(e.to_string()))?;
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| PixelError::Decode(e.to_string()))?;
        Ok(Dimensions::new(width, height))
    }

    fn decode(frame: &Frame) -> Result<GrayRaster, PixelError> {
        let img =
            image::load_from_memory(&frame.data).map_err(|e| PixelError::Decode(e.to_string()))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(PixelError::EmptyImage);
        }
        GrayRaster::from_rgba(width, height, rgba.as_raw())
    }
}

impl Default for ImageDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PixelSource for ImageDecoder {
    fn metadata(&self, frame: &Frame) -> Result<Dimensions, PixelError> {
        match Self::read_dimensions(frame) {
            Ok(dims) => Ok(dims),
            Err(e) => {
                warn!(
                    "frame {}: cannot read dimensions ({}), using {}x{}",
                    frame.index, e, self.fallback.width, self.fallback.height
                );
                Ok(self.fallback)
            }
        }
    }

    fn grayscale(&self, frame: &Frame) -> Result<GrayRaster, PixelError> {
        match Self::decode(frame) {
            Ok(raster) => Ok(raster),
            Err(e) => {
                warn!(
                    "frame {}: decode failed ({}), using blank {}x{} raster",
                    frame.index, e, self.fallback.width, self.fallback.height
                );
                Ok(GrayRaster::filled(
                    self.fallback.width,
                    self.fallback.height,
                    0,
                ))
            }
        }
    }
}
