//! 测试用的合成帧与像素源

use super::error::PixelError;
use super::frame::Frame;
use super::pixels::{Dimensions, GrayRaster, PixelSource};
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use once_cell::sync::Lazy;
use proptest::prelude::*;
use std::io::Cursor;

fn encode_png(img: RgbImage) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, ImageOutputFormat::Png)
        .unwrap();
    buffer.into_inner()
}

pub fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    encode_png(RgbImage::from_pixel(width, height, image::Rgb(rgb)))
}

pub fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    encode_png(RgbImage::from_fn(width, height, |x, y| {
        let v = ((x * 255) / width.max(1)) as u8;
        let w = ((y * 255) / height.max(1)) as u8;
        image::Rgb([v, w, v / 2 + w / 2])
    }))
}

/// 伪随机噪声图，压缩后明显比纯色/渐变大
pub fn noise_png(width: u32, height: u32, seed: u64) -> Vec<u8> {
    let mut rng = XorShift::new(seed);
    encode_png(RgbImage::from_fn(width, height, |_, _| {
        let v = rng.next_u64();
        image::Rgb([v as u8, (v >> 8) as u8, (v >> 16) as u8])
    }))
}

/// 三种压缩尺寸差距很大的图：纯色 < 渐变 < 噪声
pub fn palette() -> [Vec<u8>; 3] {
    [
        solid_png(48, 32, [128, 128, 128]),
        gradient_png(48, 32),
        noise_png(48, 32, 7),
    ]
}

/// 编码一次，供属性测试反复使用
pub static PALETTE: Lazy<[Vec<u8>; 3]> = Lazy::new(palette);

/// 像素路径用的三张互不相似的噪声图（大小接近，闸门不会短路）
pub static NOISE_PALETTE: Lazy<[Vec<u8>; 3]> =
    Lazy::new(|| [noise_png(48, 32, 11), noise_png(48, 32, 12), noise_png(48, 32, 13)]);

/// 由 (图号, 重复次数) 段展开成帧序列的图号模式；长度 1 的段就是闪烁
pub fn run_pattern(kinds: usize, max_runs: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec((0..kinds, 1usize..5), 1..=max_runs).prop_map(|runs| {
        runs.into_iter()
            .flat_map(|(kind, len)| std::iter::repeat(kind).take(len))
            .collect()
    })
}

/// 模式 + 递增且不重复的切分位置
pub fn pattern_with_boundaries(
    kinds: usize,
    max_runs: usize,
) -> impl Strategy<Value = (Vec<usize>, Vec<usize>)> {
    run_pattern(kinds, max_runs).prop_flat_map(|pattern| {
        let len = pattern.len();
        let boundaries = prop::collection::btree_set(1..len.max(2), 0..=(len.max(2) - 1).min(5))
            .prop_map(|set| set.into_iter().collect::<Vec<_>>());
        (Just(pattern), boundaries)
    })
}

pub fn frames_from(images: &[Vec<u8>], pattern: &[usize]) -> Vec<Frame> {
    pattern
        .iter()
        .enumerate()
        .map(|(i, &k)| Frame::new(i as u64, images[k].clone()))
        .collect()
}

/// 生成噪声图像素用的确定性序列
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1)
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}

/// 声明 10x10，却只给出 10 个像素的 RGBA 缓冲
pub struct ShortRgbaPixels;

impl PixelSource for ShortRgbaPixels {
    fn metadata(&self, _frame: &Frame) -> Result<Dimensions, PixelError> {
        Ok(Dimensions::new(10, 10))
    }

    fn grayscale(&self, _frame: &Frame) -> Result<GrayRaster, PixelError> {
        GrayRaster::from_rgba(10, 10, &[0; 40])
    }
}

/// 总是失败的像素源
pub struct FailingPixels;

impl PixelSource for FailingPixels {
    fn metadata(&self, _frame: &Frame) -> Result<Dimensions, PixelError> {
        Err(PixelError::Unsupported("test".into()))
    }

    fn grayscale(&self, _frame: &Frame) -> Result<GrayRaster, PixelError> {
        Err(PixelError::Unsupported("test".into()))
    }
}

/// 只在缩放到指定尺寸时失败（用于让哈希失败而基础比较成功）
pub struct FailOnResize<P> {
    pub inner: P,
    pub width: u32,
    pub height: u32,
}

impl<P: PixelSource> PixelSource for FailOnResize<P> {
    fn metadata(&self, frame: &Frame) -> Result<Dimensions, PixelError> {
        self.inner.metadata(frame)
    }

    fn grayscale(&self, frame: &Frame) -> Result<GrayRaster, PixelError> {
        self.inner.grayscale(frame)
    }

    fn resize(&self, frame: &Frame, width: u32, height: u32) -> Result<GrayRaster, PixelError> {
        if width == self.width && height == self.height {
            return Err(PixelError::Unsupported("resize disabled".into()));
        }
        self.inner.resize(frame, width, height)
    }
}
