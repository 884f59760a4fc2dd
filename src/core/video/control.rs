//! 取消信号与进度通知

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// 协作式取消：每帧处理前、每次提交前检查
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtractionProgress {
    pub processed: usize,
    pub total: usize,
}

impl ExtractionProgress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(ExtractionProgress) + Send + Sync>;

/// 各 worker 共享的进度计数（只增不减，不参与比较逻辑）
#[derive(Clone, Default)]
pub struct ProgressReporter {
    processed: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
            ..Self::default()
        }
    }

    pub fn start(&self, total: usize) {
        self.processed.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
        self.notify(ExtractionProgress {
            processed: 0,
            total,
        });
    }

    pub fn advance(&self) {
        let processed = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        self.notify(ExtractionProgress {
            processed,
            total: self.total.load(Ordering::SeqCst),
        });
    }

    pub fn snapshot(&self) -> ExtractionProgress {
        ExtractionProgress {
            processed: self.processed.load(Ordering::SeqCst),
            total: self.total.load(Ordering::SeqCst),
        }
    }

    fn notify(&self, progress: ExtractionProgress) {
        if let Some(callback) = &self.callback {
            callback(progress);
        }
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("progress", &self.snapshot())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_progress_counts_and_notifies() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let reporter = ProgressReporter::with_callback(Arc::new(move |p| {
            sink.lock().unwrap().push(p);
        }));

        reporter.start(3);
        reporter.advance();
        reporter.advance();

        assert_eq!(
            reporter.snapshot(),
            ExtractionProgress {
                processed: 2,
                total: 3
            }
        );
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].processed, 0);
        assert_eq!(seen[2].processed, 2);
    }

    #[test]
    fn test_fraction() {
        assert_eq!(ExtractionProgress::default().fraction(), 1.0);
        let p = ExtractionProgress {
            processed: 1,
            total: 4,
        };
        assert_eq!(p.fraction(), 0.25);
    }
}
