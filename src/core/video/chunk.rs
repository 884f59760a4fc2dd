//! 分块与单块处理（worker）

use super::comparator::FrameComparator;
use super::config::EngineConfig;
use super::control::{CancelToken, ProgressReporter};
use super::error::CompareError;
use super::frame::{Frame, Slide};
use super::pixels::PixelSource;
use super::state_machine::{SlideStateMachine, StateAction, StateSnapshot, StreamState};

/// 连续、不重叠的一段帧
#[derive(Debug, Clone)]
pub struct Chunk<'a> {
    pub ordinal: usize,
    /// 在整个序列中的起始位置
    pub start: usize,
    pub frames: &'a [Frame],
    /// 上一块最后一帧的拷贝
    pub boundary_predecessor: Option<Frame>,
}

impl Chunk<'_> {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn initial_state(&self) -> StreamState {
        match &self.boundary_predecessor {
            Some(predecessor) => StreamState::continuing_from(predecessor.clone()),
            None => StreamState::sequence_start(),
        }
    }
}

/// 块长：显式配置优先，否则按 worker 数均分，且不小于 min_chunk_len
pub fn chunk_len_for(total: usize, config: &EngineConfig) -> usize {
    if let Some(size) = config.chunk_size {
        return size.max(1);
    }
    let workers = config.worker_count();
    total.div_ceil(workers).max(config.min_chunk_len).max(1)
}

pub fn plan_chunks(frames: &[Frame], chunk_len: usize) -> Vec<Chunk<'_>> {
    let chunk_len = chunk_len.max(1);
    let boundaries: Vec<usize> = (chunk_len..frames.len()).step_by(chunk_len).collect();
    plan_chunks_at(frames, &boundaries)
}

/// 在给定位置切分（位置需递增，越界/重复的忽略）
pub fn plan_chunks_at<'a>(frames: &'a [Frame], boundaries: &[usize]) -> Vec<Chunk<'a>> {
    let mut chunks = Vec::with_capacity(boundaries.len() + 1);
    let mut start = 0;

    for &end in boundaries.iter().chain(std::iter::once(&frames.len())) {
        if end <= start || end > frames.len() {
            continue;
        }
        chunks.push(Chunk {
            ordinal: chunks.len(),
            start,
            frames: &frames[start..end],
            boundary_predecessor: start.checked_sub(1).map(|p| frames[p].clone()),
        });
        start = end;
    }

    chunks
}

/// 单块的投机执行结果
#[derive(Debug, Clone)]
pub struct ChunkRun {
    pub ordinal: usize,
    pub start: usize,
    pub len: usize,
    pub slides: Vec<Slide>,
    /// 第 i 项：处理完块内第 i 帧后的状态
    pub snapshots: Vec<StateSnapshot>,
    /// 第 i 项：处理完块内第 i 帧时累计的故障数
    pub fault_marks: Vec<usize>,
    pub end_state: StreamState,
    pub first_fault: Option<CompareError>,
    pub cancelled: bool,
}

impl ChunkRun {
    pub fn processed(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.processed() == self.len
    }

    pub fn fault_count(&self) -> usize {
        self.fault_marks.last().copied().unwrap_or(0)
    }
}

pub fn run_chunk<P: PixelSource>(
    comparator: &FrameComparator<P>,
    chunk: &Chunk<'_>,
    cancel: &CancelToken,
    progress: &ProgressReporter,
) -> ChunkRun {
    let mut machine =
        SlideStateMachine::resume(comparator, chunk.initial_state()).with_cancel(cancel.clone());
    let mut slides = Vec::new();
    let mut snapshots = Vec::with_capacity(chunk.len());
    let mut fault_marks = Vec::with_capacity(chunk.len());
    let mut cancelled = false;

    for frame in chunk.frames {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        match machine.process_frame(frame) {
            StateAction::Commit(slide) => slides.push(slide),
            StateAction::Cancelled => {
                cancelled = true;
                break;
            }
            _ => {}
        }
        snapshots.push(machine.snapshot());
        fault_marks.push(machine.faults().count);
        progress.advance();
    }

    let first_fault = machine.faults().first.clone();
    ChunkRun {
        ordinal: chunk.ordinal,
        start: chunk.start,
        len: chunk.len(),
        slides,
        snapshots,
        fault_marks,
        end_state: machine.into_stream_state(),
        first_fault,
        cancelled,
    }
}
