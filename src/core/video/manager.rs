//! 幻灯片提取管理器：分块 -> 并行 worker -> 拼接

use super::chunk::{chunk_len_for, plan_chunks, run_chunk, ChunkRun};
use super::comparator::FrameComparator;
use super::config::EngineConfig;
use super::control::{CancelToken, ExtractionProgress, ProgressCallback, ProgressReporter};
use super::error::ExtractError;
use super::frame::{Frame, Slide};
use super::pixels::{ImageDecoder, PixelSource};
use super::stitch::{stitch, DegradedChunk};
use log::{info, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Complete,
    /// 被取消，只包含已确定的前缀
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionReport {
    pub slides: Vec<Slide>,
    pub status: RunStatus,
    pub processed_frames: usize,
    pub total_frames: usize,
    pub degraded_chunks: Vec<DegradedChunk>,
    pub chunk_count: usize,
    /// 因跨块状态不一致而重放的帧数
    pub replayed_frames: usize,
}

impl ExtractionReport {
    pub fn is_partial(&self) -> bool {
        self.status == RunStatus::Cancelled
    }
}

/// 提取统计（跨多次运行累计）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub processed_frames: u64,
    pub extracted_slides: u64,
    pub runs: u64,
}

pub struct SlideExtractorManager<P: PixelSource = ImageDecoder> {
    comparator: FrameComparator<P>,
    stats: Arc<Mutex<ExtractionStats>>,
    progress: ProgressReporter,
    current: Mutex<CancelToken>,
}

impl SlideExtractorManager<ImageDecoder> {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_pixels(ImageDecoder::new(), config)
    }
}

impl Default for SlideExtractorManager<ImageDecoder> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl<P: PixelSource> SlideExtractorManager<P> {
    pub fn with_pixels(pixels: P, config: EngineConfig) -> Self {
        Self {
            comparator: FrameComparator::with_pixels(pixels, config),
            stats: Arc::new(Mutex::new(ExtractionStats::default())),
            progress: ProgressReporter::new(),
            current: Mutex::new(CancelToken::new()),
        }
    }

    /// 每处理一帧回调一次（在 worker 线程上调用）
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress = ProgressReporter::with_callback(callback);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        self.comparator.config()
    }

    pub fn comparator(&self) -> &FrameComparator<P> {
        &self.comparator
    }

    /// 提取幻灯片。每次运行使用新的取消令牌，`cancel()` 只影响进行中的运行
    pub fn extract(&self, frames: &[Frame]) -> Result<ExtractionReport, ExtractError> {
        let cancel = CancelToken::new();
        *self.lock_current() = cancel.clone();
        self.extract_with_cancel(frames, &cancel)
    }

    pub fn extract_with_cancel(
        &self,
        frames: &[Frame],
        cancel: &CancelToken,
    ) -> Result<ExtractionReport, ExtractError> {
        let config = self.comparator.config();
        config.validate()?;
        check_order(frames)?;

        self.progress.start(frames.len());
        let chunk_len = chunk_len_for(frames.len(), config);
        let chunks = plan_chunks(frames, chunk_len);
        info!(
            "extracting slides: {} frames, {} chunks of up to {}",
            frames.len(),
            chunks.len(),
            chunk_len
        );

        let runs: Vec<ChunkRun> = if chunks.len() <= 1 {
            chunks
                .iter()
                .map(|chunk| run_chunk(&self.comparator, chunk, cancel, &self.progress))
                .collect()
        } else {
            let pool = ThreadPoolBuilder::new()
                .num_threads(config.worker_count().min(chunks.len()))
                .build()
                .map_err(|e| ExtractError::Pool(e.to_string()))?;
            pool.install(|| {
                chunks
                    .par_iter()
                    .map(|chunk| run_chunk(&self.comparator, chunk, cancel, &self.progress))
                    .collect::<Vec<_>>()
            })
        };

        let outcome = stitch(&self.comparator, frames, runs, cancel);
        let status = if outcome.cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Complete
        };

        match status {
            RunStatus::Complete => info!(
                "extraction finished: {} slides from {} frames ({} replayed)",
                outcome.slides.len(),
                outcome.processed,
                outcome.replayed
            ),
            RunStatus::Cancelled => warn!(
                "extraction cancelled after {}/{} frames, {} slides kept",
                outcome.processed,
                frames.len(),
                outcome.slides.len()
            ),
        }

        {
            let mut stats = self.lock_stats();
            stats.processed_frames += outcome.processed as u64;
            stats.extracted_slides += outcome.slides.len() as u64;
            stats.runs += 1;
        }

        Ok(ExtractionReport {
            slides: outcome.slides,
            status,
            processed_frames: outcome.processed,
            total_frames: frames.len(),
            degraded_chunks: outcome.degraded,
            chunk_count: chunks.len(),
            replayed_frames: outcome.replayed,
        })
    }

    pub fn cancel(&self) {
        self.lock_current().cancel();
    }

    pub fn progress(&self) -> ExtractionProgress {
        self.progress.snapshot()
    }

    pub fn get_stats(&self) -> ExtractionStats {
        self.lock_stats().clone()
    }

    pub fn reset(&self) {
        *self.lock_stats() = ExtractionStats::default();
        self.progress.start(0);
    }

    fn lock_stats(&self) -> MutexGuard<'_, ExtractionStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_current(&self) -> MutexGuard<'_, CancelToken> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 帧号必须严格递增（拼接按帧号识别候选帧）
fn check_order(frames: &[Frame]) -> Result<(), ExtractError> {
    match frames.windows(2).find(|pair| pair[0].index >= pair[1].index) {
        Some(pair) => Err(ExtractError::UnorderedFrames {
            previous: pair[0].index,
            next: pair[1].index,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::error::ConfigError;
    use crate::core::video::stitch::run_sequential;
    use crate::core::video::test_support::{
        frames_from, palette, run_pattern, FailingPixels, ShortRgbaPixels, PALETTE,
    };
    use proptest::prelude::*;

    fn parallel(workers: usize, chunk_size: usize) -> EngineConfig {
        EngineConfig {
            workers: Some(workers),
            chunk_size: Some(chunk_size),
            ..Default::default()
        }
    }

    fn frame_indices(slides: &[Slide]) -> Vec<u64> {
        slides.iter().map(|s| s.frame_index).collect()
    }

    #[test]
    fn test_manager_creation() {
        let manager = SlideExtractorManager::new(EngineConfig::default());
        assert_eq!(manager.get_stats(), ExtractionStats::default());
        assert_eq!(manager.progress(), ExtractionProgress::default());
    }

    #[test]
    fn test_identical_frames_give_one_slide() {
        let manager = SlideExtractorManager::new(parallel(4, 7));
        let frames = frames_from(&palette(), &[2; 40]);

        let report = manager.extract(&frames).unwrap();
        assert_eq!(frame_indices(&report.slides), vec![0]);
        assert_eq!(report.status, RunStatus::Complete);
        assert_eq!(report.chunk_count, 6);
        assert_eq!(report.processed_frames, 40);
        assert!(report.degraded_chunks.is_empty());
    }

    #[test]
    fn test_debounced_slides_across_chunks() {
        let frames = frames_from(&palette(), &[0, 0, 0, 0, 1, 1, 1, 0, 0, 0]);
        for (workers, chunk_size) in [(1, 10), (2, 5), (3, 3), (4, 1)] {
            let manager = SlideExtractorManager::new(parallel(workers, chunk_size));
            let report = manager.extract(&frames).unwrap();

            assert_eq!(frame_indices(&report.slides), vec![0, 5, 8]);
            let sequence: Vec<u64> = report.slides.iter().map(|s| s.sequence_index).collect();
            assert_eq!(sequence, vec![0, 1, 2]);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn test_parallel_matches_sequential(
            pattern in run_pattern(3, 20),
            workers in 1usize..=4,
            chunk_size in 1usize..=16,
        ) {
            let frames = frames_from(&*PALETTE, &pattern);
            let expected = run_sequential(&FrameComparator::new(EngineConfig::default()), &frames);

            let manager = SlideExtractorManager::new(parallel(workers, chunk_size));
            let report = manager.extract(&frames).unwrap();
            prop_assert_eq!(report.status, RunStatus::Complete);
            prop_assert_eq!(report.slides, expected);
        }
    }

    #[test]
    fn test_malformed_raster_does_not_abort_run() {
        let manager = SlideExtractorManager::with_pixels(
            ShortRgbaPixels,
            EngineConfig {
                size_identical_threshold: 0.0,
                size_diff_threshold: 1.0,
                ..parallel(2, 3)
            },
        );
        let frames: Vec<Frame> = (0..6).map(|i| Frame::new(i, vec![i as u8; 16])).collect();

        let report = manager.extract(&frames).unwrap();
        assert_eq!(report.status, RunStatus::Complete);
        assert_eq!(report.processed_frames, 6);
        assert!(!report.degraded_chunks.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let manager = SlideExtractorManager::new(EngineConfig::default());
        let report = manager.extract(&[]).unwrap();
        assert!(report.slides.is_empty());
        assert_eq!(report.status, RunStatus::Complete);
        assert_eq!(report.chunk_count, 0);
    }

    #[test]
    fn test_cancelled_before_start() {
        let manager = SlideExtractorManager::new(parallel(2, 4));
        let frames = frames_from(&palette(), &[0, 1, 1, 2, 2, 0, 0, 1]);
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = manager.extract_with_cancel(&frames, &cancel).unwrap();
        assert!(report.is_partial());
        assert_eq!(report.processed_frames, 0);
        assert!(report.slides.is_empty());
    }

    #[test]
    fn test_cancel_mid_run_keeps_prefix() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let manager = SlideExtractorManager::new(parallel(1, 100)).with_progress_callback(
            Arc::new(move |p: ExtractionProgress| {
                if p.processed == 5 {
                    trigger.cancel();
                }
            }),
        );
        let frames = frames_from(&palette(), &[0, 0, 1, 1, 1, 2, 2, 2, 0, 0]);

        let report = manager.extract_with_cancel(&frames, &cancel).unwrap();
        assert!(report.is_partial());
        assert_eq!(report.processed_frames, 5);
        assert_eq!(frame_indices(&report.slides), vec![0, 3]);
        assert_eq!(manager.get_stats().processed_frames, 5);
    }

    #[test]
    fn test_rejects_unordered_frames() {
        let manager = SlideExtractorManager::new(EngineConfig::default());
        let frames = vec![Frame::new(3, vec![1]), Frame::new(3, vec![2])];

        let err = manager.extract(&frames).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::UnorderedFrames {
                previous: 3,
                next: 3
            }
        ));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let manager = SlideExtractorManager::new(EngineConfig {
            verification_count: 0,
            ..Default::default()
        });
        let err = manager.extract(&[]).unwrap_err();
        assert!(matches!(err, ExtractError::Config(ConfigError::OutOfRange { .. })));
    }

    #[test]
    fn test_degraded_chunks_reported() {
        let manager = SlideExtractorManager::with_pixels(
            FailingPixels,
            EngineConfig {
                size_identical_threshold: 0.0,
                size_diff_threshold: 1.0,
                ..parallel(2, 4)
            },
        );
        let frames: Vec<Frame> = (0..8).map(|i| Frame::new(i, vec![i as u8; 16])).collect();

        let report = manager.extract(&frames).unwrap();
        assert_eq!(report.status, RunStatus::Complete);
        assert_eq!(report.degraded_chunks.len(), 2);
        assert_eq!(report.degraded_chunks[1].start_index, 4);
    }

    #[test]
    fn test_stats_accumulate_and_reset() {
        let manager = SlideExtractorManager::new(parallel(2, 3));
        let frames = frames_from(&palette(), &[0, 1, 1, 2, 2]);

        manager.extract(&frames).unwrap();
        manager.extract(&frames).unwrap();
        let stats = manager.get_stats();
        assert_eq!(stats.runs, 2);
        assert_eq!(stats.processed_frames, 10);
        assert_eq!(stats.extracted_slides, 6);
        assert_eq!(manager.progress().processed, 5);

        manager.reset();
        assert_eq!(manager.get_stats(), ExtractionStats::default());
        assert_eq!(manager.progress().processed, 0);
    }
}
