use std::sync::Arc;

/// 帧数据结构（外部抽帧器产出的已编码图像，只读）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub index: u64,
    pub data: Vec<u8>, // 编码后的图像字节（JPEG/PNG/BMP）
    pub source: Option<Arc<str>>,
}

impl Frame {
    pub fn new(index: u64, data: Vec<u8>) -> Self {
        Self {
            index,
            data,
            source: None,
        }
    }

    pub fn with_source(index: u64, data: Vec<u8>, source: impl Into<Arc<str>>) -> Self {
        Self {
            index,
            data,
            source: Some(source.into()),
        }
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// 字节完全一致（比较器是字节的纯函数，所以结论也一致）
    pub fn same_content(&self, other: &Frame) -> bool {
        self.data == other.data
    }
}

/// 已提交的幻灯片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slide {
    pub sequence_index: u64,
    /// 触发提交的帧（确认帧）
    pub frame_index: u64,
    /// 最先被记为候选的帧
    pub candidate_index: u64,
    pub data: Vec<u8>,
    pub source: Option<Arc<str>>,
}

impl Slide {
    pub(crate) fn from_frame(sequence_index: u64, frame: &Frame, candidate_index: u64) -> Self {
        Self {
            sequence_index,
            frame_index: frame.index,
            candidate_index,
            data: frame.data.clone(),
            source: frame.source.clone(),
        }
    }

    /// 检测延迟（帧数）
    pub fn latency(&self) -> u64 {
        self.frame_index.saturating_sub(self.candidate_index)
    }
}
