//! 去抖状态机：变化必须被连续确认 verification_count 次才提交为幻灯片

use super::comparator::{ComparisonResult, FrameComparator};
use super::control::CancelToken;
use super::error::CompareError;
use super::frame::{Frame, Slide};
use super::pixels::PixelSource;
use log::debug;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum VerificationState {
    #[default]
    Idle,
    Pending { candidate: Frame, count: u32 },
}

impl VerificationState {
    pub fn pending_count(&self) -> u32 {
        match self {
            VerificationState::Idle => 0,
            VerificationState::Pending { count, .. } => *count,
        }
    }

    pub fn candidate(&self) -> Option<&Frame> {
        match self {
            VerificationState::Idle => None,
            VerificationState::Pending { candidate, .. } => Some(candidate),
        }
    }
}

/// 一条流的全部状态：参考帧 + 去抖状态。chunk 之间靠它接续
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamState {
    pub reference: Option<Frame>,
    pub verification: VerificationState,
}

impl StreamState {
    /// 整个序列的起点，第一帧无条件提交
    pub fn sequence_start() -> Self {
        Self::default()
    }

    /// 从上一个 chunk 的最后一帧接着走
    pub fn continuing_from(predecessor: Frame) -> Self {
        Self {
            reference: Some(predecessor),
            verification: VerificationState::Idle,
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            reference: self.reference.as_ref().map(|f| f.index),
            pending: match &self.verification {
                VerificationState::Idle => None,
                VerificationState::Pending { candidate, count } => Some((candidate.index, *count)),
            },
        }
    }
}

/// 只记录帧号的轻量状态，用于拼接时判断两条执行是否已经汇合
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSnapshot {
    pub reference: Option<u64>,
    pub pending: Option<(u64, u32)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateAction {
    /// 与参考帧一致
    Continue,
    /// 候选待确认
    Hold { count: u32 },
    /// 回到参考帧，候选作废
    Reverted,
    Commit(Slide),
    /// 提交前发现取消，本帧不生效
    Cancelled,
}

#[derive(Debug, Clone, Default)]
pub struct FaultLog {
    pub count: usize,
    pub first: Option<CompareError>,
}

impl FaultLog {
    fn record(&mut self, verdict: &ComparisonResult) {
        if let Some(fault) = &verdict.fault {
            self.count += 1;
            if self.first.is_none() {
                self.first = Some(fault.clone());
            }
        }
    }
}

pub struct SlideStateMachine<'c, P: PixelSource> {
    comparator: &'c FrameComparator<P>,
    required: u32,
    state: StreamState,
    frame_counter: u64,
    committed: u64,
    faults: FaultLog,
    cancel: Option<CancelToken>,
}

impl<'c, P: PixelSource> SlideStateMachine<'c, P> {
    pub fn new(comparator: &'c FrameComparator<P>) -> Self {
        Self::resume(comparator, StreamState::sequence_start())
    }

    pub fn resume(comparator: &'c FrameComparator<P>, state: StreamState) -> Self {
        Self {
            comparator,
            required: comparator.config().required_confirmations(),
            state,
            frame_counter: 0,
            committed: 0,
            faults: FaultLog::default(),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn process_frame(&mut self, frame: &Frame) -> StateAction {
        self.frame_counter += 1;

        let reference = match self.state.reference.as_ref() {
            Some(reference) => reference,
            None => {
                if self.cancelled() {
                    return StateAction::Cancelled;
                }
                return self.commit(frame.clone(), frame);
            }
        };

        match std::mem::take(&mut self.state.verification) {
            VerificationState::Idle => {
                let verdict = self.comparator.compare(reference, frame);
                self.faults.record(&verdict);
                if !verdict.changed {
                    return StateAction::Continue;
                }
                self.start_candidate(frame)
            }
            VerificationState::Pending { candidate, count } => {
                // 有候选时和候选比，而不是和参考帧比
                let verdict = self.comparator.compare(&candidate, frame);
                self.faults.record(&verdict);
                if !verdict.changed {
                    let count = count + 1;
                    if count >= self.required {
                        if self.cancelled() {
                            self.state.verification = VerificationState::Pending {
                                candidate,
                                count: count - 1,
                            };
                            return StateAction::Cancelled;
                        }
                        return self.commit(candidate, frame);
                    }
                    self.state.verification = VerificationState::Pending { candidate, count };
                    return StateAction::Hold { count };
                }

                let back = self.comparator.compare(reference, frame);
                self.faults.record(&back);
                if !back.changed {
                    debug!(
                        "frame {}: reverted, dropping candidate {}",
                        frame.index, candidate.index
                    );
                    return StateAction::Reverted;
                }
                self.start_candidate(frame)
            }
        }
    }

    /// 顺序跑完一段帧，返回提交的幻灯片（取消时提前停止）
    pub fn run<'f>(&mut self, frames: impl IntoIterator<Item = &'f Frame>) -> Vec<Slide> {
        let mut slides = Vec::new();
        for frame in frames {
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                break;
            }
            match self.process_frame(frame) {
                StateAction::Commit(slide) => slides.push(slide),
                StateAction::Cancelled => break,
                _ => {}
            }
        }
        slides
    }

    fn start_candidate(&mut self, frame: &Frame) -> StateAction {
        if self.required <= 1 {
            if self.cancelled() {
                return StateAction::Cancelled;
            }
            return self.commit(frame.clone(), frame);
        }
        self.state.verification = VerificationState::Pending {
            candidate: frame.clone(),
            count: 1,
        };
        StateAction::Hold { count: 1 }
    }

    fn commit(&mut self, candidate: Frame, confirming: &Frame) -> StateAction {
        let slide = Slide::from_frame(self.committed, confirming, candidate.index);
        debug!(
            "slide #{} committed at frame {} (candidate {})",
            slide.sequence_index, slide.frame_index, slide.candidate_index
        );
        self.committed += 1;
        self.state.reference = Some(candidate);
        self.state.verification = VerificationState::Idle;
        StateAction::Commit(slide)
    }

    /// 取消时撤销本帧计数
    fn cancelled(&mut self) -> bool {
        let cancelled = self.cancel.as_ref().is_some_and(|c| c.is_cancelled());
        if cancelled {
            self.frame_counter -= 1;
        }
        cancelled
    }

    pub fn current_state(&self) -> &VerificationState {
        &self.state.verification
    }

    pub fn stream_state(&self) -> &StreamState {
        &self.state
    }

    pub fn into_stream_state(self) -> StreamState {
        self.state
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    pub fn committed_count(&self) -> u64 {
        self.committed
    }

    pub fn faults(&self) -> &FaultLog {
        &self.faults
    }

    pub fn reset(&mut self) {
        self.state = StreamState::sequence_start();
        self.frame_counter = 0;
        self.committed = 0;
        self.faults = FaultLog::default();
    }
}
