pub mod chunk;
pub mod comparator;
pub mod config;
pub mod control;
pub mod error;
pub mod frame;
pub mod manager;
pub mod phash;
pub mod pixels;
pub mod similarity;
pub mod state_machine;
pub mod stitch;

#[cfg(test)]
mod test_support;

pub use comparator::{Auxiliary, ComparisonResult, DetectionMethod, FrameComparator};
pub use config::{ComparisonMethod, EngineConfig};
pub use control::{CancelToken, ExtractionProgress, ProgressCallback};
pub use error::{CompareError, ConfigError, ExtractError, PixelError};
pub use frame::{Frame, Slide};
pub use manager::{ExtractionReport, ExtractionStats, RunStatus, SlideExtractorManager};
pub use phash::PerceptualHash;
pub use pixels::{Dimensions, GrayRaster, ImageDecoder, PixelSource};
pub use state_machine::{SlideStateMachine, StateAction, VerificationState};
pub use stitch::DegradedChunk;
