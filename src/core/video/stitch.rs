//! 拼接各块结果
//!
//! 每块以"上一块最后一帧"为参考帧、无候选的状态投机执行。拼接时按块顺序携带真实的
//! 结束状态（参考帧 + 候选 + 计数）：起点等价则整块采用；否则从真实状态顺序重放，
//! 直到与投机执行在同一帧后的状态一致，再接上剩余的投机结果。跨块的候选因此不会丢，
//! 结果与单线程顺序执行完全一致。

use super::chunk::ChunkRun;
use super::comparator::FrameComparator;
use super::control::CancelToken;
use super::error::CompareError;
use super::frame::{Frame, Slide};
use super::pixels::PixelSource;
use super::state_machine::{SlideStateMachine, StateAction, StateSnapshot, StreamState};
use log::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct DegradedChunk {
    pub chunk_index: usize,
    /// 块首帧在序列中的位置
    pub start_index: usize,
    pub faults: usize,
    pub first_fault: Option<CompareError>,
}

#[derive(Debug, Clone, Default)]
pub struct StitchOutcome {
    pub slides: Vec<Slide>,
    /// 从序列开头起、结果已确定的帧数
    pub processed: usize,
    pub cancelled: bool,
    pub degraded: Vec<DegradedChunk>,
    /// 因起点不一致而重放的帧数
    pub replayed: usize,
}

/// 单线程顺序执行，作为拼接结果的基准
pub fn run_sequential<P: PixelSource>(comparator: &FrameComparator<P>, frames: &[Frame]) -> Vec<Slide> {
    SlideStateMachine::new(comparator).run(frames)
}

pub fn stitch<P: PixelSource>(
    comparator: &FrameComparator<P>,
    frames: &[Frame],
    mut runs: Vec<ChunkRun>,
    cancel: &CancelToken,
) -> StitchOutcome {
    runs.sort_by_key(|run| run.ordinal);

    let mut outcome = StitchOutcome::default();
    let mut carried = StreamState::sequence_start();

    for run in runs {
        if run.start != outcome.processed {
            // 前面有块没跑完，后面的结果无法接上
            break;
        }
        let chunk_frames = &frames[run.start..run.start + run.len];
        let predecessor = run.start.checked_sub(1).map(|p| &frames[p]);

        let chunk_faults;
        let mut first_fault = run.first_fault.clone();

        if starts_match(&carried, predecessor) {
            outcome.slides.extend(run.slides.iter().cloned());
            outcome.processed += run.processed();
            chunk_faults = run.fault_count();
            carried = run.end_state.clone();
        } else {
            debug!(
                "chunk {}: carried state differs from speculative start, replaying",
                run.ordinal
            );
            let mut machine =
                SlideStateMachine::resume(comparator, carried).with_cancel(cancel.clone());
            let mut merged_at = None;
            let mut handled = 0;

            for (i, frame) in chunk_frames.iter().take(run.processed()).enumerate() {
                if cancel.is_cancelled() {
                    outcome.cancelled = true;
                    break;
                }
                match machine.process_frame(frame) {
                    StateAction::Commit(slide) => outcome.slides.push(slide),
                    StateAction::Cancelled => {
                        outcome.cancelled = true;
                        break;
                    }
                    _ => {}
                }
                handled = i + 1;
                outcome.replayed += 1;

                if converged(machine.stream_state(), run.snapshots[i], predecessor, chunk_frames) {
                    merged_at = Some(i);
                    break;
                }
            }

            let replay_faults = machine.faults().count;
            if first_fault.is_none() {
                first_fault = machine.faults().first.clone();
            }

            match merged_at {
                Some(i) => {
                    let merge_index = chunk_frames[i].index;
                    debug!(
                        "chunk {}: converged after {} replayed frames",
                        run.ordinal,
                        i + 1
                    );
                    outcome.slides.extend(
                        run.slides
                            .iter()
                            .filter(|slide| slide.frame_index > merge_index)
                            .cloned(),
                    );
                    outcome.processed += run.processed();
                    chunk_faults = replay_faults + run.fault_count() - run.fault_marks[i];
                    carried = run.end_state.clone();
                }
                None => {
                    outcome.processed += handled;
                    chunk_faults = replay_faults;
                    carried = machine.into_stream_state();
                }
            }
        }

        if chunk_faults > 0 {
            warn!(
                "chunk {} (start {}) degraded: {} comparison faults",
                run.ordinal, run.start, chunk_faults
            );
            outcome.degraded.push(DegradedChunk {
                chunk_index: run.ordinal,
                start_index: run.start,
                faults: chunk_faults,
                first_fault,
            });
        }

        if outcome.cancelled || !run.is_complete() {
            outcome.cancelled = true;
            break;
        }
    }

    for (i, slide) in outcome.slides.iter_mut().enumerate() {
        slide.sequence_index = i as u64;
    }
    outcome
}

/// 携带的状态是否等价于投机起点（无候选，参考帧字节相同）
fn starts_match(carried: &StreamState, predecessor: Option<&Frame>) -> bool {
    if carried.verification.candidate().is_some() {
        return false;
    }
    match (&carried.reference, predecessor) {
        (None, None) => true,
        (Some(reference), Some(predecessor)) => reference.same_content(predecessor),
        _ => false,
    }
}

/// 重放状态与投机快照是否一致。候选按帧号比（它决定输出），参考帧按字节比（它只影响比较）
fn converged(
    replay: &StreamState,
    snapshot: StateSnapshot,
    predecessor: Option<&Frame>,
    chunk_frames: &[Frame],
) -> bool {
    let current = replay.snapshot();
    if current.pending != snapshot.pending {
        return false;
    }
    match (&replay.reference, snapshot.reference) {
        (None, None) => true,
        (Some(reference), Some(index)) => {
            if reference.index == index {
                return true;
            }
            lookup(index, predecessor, chunk_frames).is_some_and(|f| reference.same_content(f))
        }
        _ => false,
    }
}

fn lookup<'a>(index: u64, predecessor: Option<&'a Frame>, chunk_frames: &'a [Frame]) -> Option<&'a Frame> {
    if let Some(p) = predecessor.filter(|p| p.index == index) {
        return Some(p);
    }
    chunk_frames
        .binary_search_by_key(&index, |f| f.index)
        .ok()
        .map(|pos| &chunk_frames[pos])
}
