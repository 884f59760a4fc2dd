//! DCT 感知哈希
//!
//! 32x32 灰度 -> 二维 DCT-II（正交归一）-> 左上 8x8 低频块去掉直流项，
//! 63 个系数与中位数比较，逐位输出。

use super::error::CompareError;
use super::frame::Frame;
use super::pixels::{GrayRaster, PixelSource};
use once_cell::sync::Lazy;
use rustdct::{Dct2, DctPlanner, TransformType2And3};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub const HASH_SIZE: usize = 32;
pub const LOW_FREQ_SIZE: usize = 8;
pub const HASH_BITS: u32 = (LOW_FREQ_SIZE * LOW_FREQ_SIZE - 1) as u32;

static DCT_PLAN: Lazy<Arc<dyn TransformType2And3<f64>>> =
    Lazy::new(|| DctPlanner::new().plan_dct2(HASH_SIZE));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PerceptualHash {
    bits: u64,
    len: u32,
}

impl PerceptualHash {
    /// bit i 对应第 i 个系数
    pub fn from_bits(bits: u64, len: u32) -> Self {
        let len = len.min(64);
        let mask = if len == 64 { u64::MAX } else { (1u64 << len) - 1 };
        Self {
            bits: bits & mask,
            len,
        }
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bit(&self, i: u32) -> bool {
        i < self.len && (self.bits >> i) & 1 == 1
    }

    pub fn complement(&self) -> Self {
        Self::from_bits(!self.bits, self.len)
    }

    pub fn hamming_distance(&self, other: &PerceptualHash) -> Result<u32, CompareError> {
        hamming_distance(self, other)
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.len {
            f.write_str(if self.bit(i) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl FromStr for PerceptualHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > 64 {
            return Err(format!("hash too long: {} bits", s.len()));
        }
        let mut bits = 0u64;
        for (i, c) in s.chars().enumerate() {
            match c {
                '1' => bits |= 1 << i,
                '0' => {}
                other => return Err(format!("invalid hash digit {:?}", other)),
            }
        }
        Ok(Self::from_bits(bits, s.len() as u32))
    }
}

pub fn hamming_distance(a: &PerceptualHash, b: &PerceptualHash) -> Result<u32, CompareError> {
    if a.len != b.len {
        return Err(CompareError::HashLengthMismatch {
            left: a.len,
            right: b.len,
        });
    }
    Ok((a.bits ^ b.bits).count_ones())
}

/// 从帧计算哈希（经由像素源缩放到 32x32）
pub fn hash<P: PixelSource + ?Sized>(
    pixels: &P,
    frame: &Frame,
) -> Result<PerceptualHash, CompareError> {
    let raster = pixels.resize(frame, HASH_SIZE as u32, HASH_SIZE as u32)?;
    hash_raster(&raster)
}

pub fn hash_raster(raster: &GrayRaster) -> Result<PerceptualHash, CompareError> {
    raster.validate()?;
    if raster.is_empty() {
        return Err(CompareError::EmptyRaster);
    }
    let small = raster.resize_nearest(HASH_SIZE as u32, HASH_SIZE as u32);
    let mut block: Vec<f64> = small.data().iter().map(|&v| v as f64).collect();
    dct_2d(&mut block);

    let mut coeffs = Vec::with_capacity(HASH_BITS as usize);
    for row in 0..LOW_FREQ_SIZE {
        for col in 0..LOW_FREQ_SIZE {
            if row == 0 && col == 0 {
                continue;
            }
            coeffs.push(block[row * HASH_SIZE + col]);
        }
    }

    let mut sorted = coeffs.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let median = sorted[sorted.len() / 2];

    let mut bits = 0u64;
    for (i, &c) in coeffs.iter().enumerate() {
        if c >= median {
            bits |= 1 << i;
        }
    }

    Ok(PerceptualHash::from_bits(bits, HASH_BITS))
}

/// 原地二维 DCT-II，F(u,v) = (2/N)·c(u)·c(v)·ΣΣ f(x,y)·cos·cos
fn dct_2d(block: &mut [f64]) {
    let n = HASH_SIZE;

    for row in block.chunks_exact_mut(n) {
        DCT_PLAN.process_dct2(row);
    }
    transpose(block, n);
    for row in block.chunks_exact_mut(n) {
        DCT_PLAN.process_dct2(row);
    }
    transpose(block, n);

    let scale = 2.0 / n as f64;
    for v in 0..n {
        for u in 0..n {
            block[v * n + u] *= scale * norm(u) * norm(v);
        }
    }
}

fn norm(k: usize) -> f64 {
    if k == 0 {
        std::f64::consts::FRAC_1_SQRT_2
    } else {
        1.0
    }
}

fn transpose(block: &mut [f64], n: usize) {
    for y in 0..n {
        for x in (y + 1)..n {
            block.swap(y * n + x, x * n + y);
        }
    }
}
