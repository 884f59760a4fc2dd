//! 视频幻灯片提取器

use crate::core::video::{
    ConfigError, EngineConfig, ExtractError, ExtractionProgress, ExtractionReport,
    ExtractionStats, Frame, Slide, SlideExtractorManager,
};
use log::info;
use std::path::Path;

/// 一次提取的结果，带回调用方传入的视频路径
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSlides {
    pub video_path: String,
    pub report: ExtractionReport,
}

impl VideoSlides {
    pub fn slides(&self) -> &[Slide] {
        &self.report.slides
    }

    /// 每张幻灯片的保存文件名
    pub fn file_names(&self) -> Vec<String> {
        self.report
            .slides
            .iter()
            .map(|slide| slide_file_name(&self.video_path, slide))
            .collect()
    }
}

/// 视频幻灯片提取器 - 大小闸门 + pHash/SSIM + 二次确认去抖
///
/// ```no_run
/// use slide_lib::api::video::SlideExtractor;
/// # let frames = Vec::new();
/// let extractor = SlideExtractor::create();
/// let result = extractor.process_video("/sdcard/lecture.mp4", &frames)?;
/// for name in result.file_names() {
///     println!("{}", name);
/// }
/// # Ok::<(), slide_lib::core::video::ExtractError>(())
/// ```
pub struct SlideExtractor {
    manager: SlideExtractorManager,
}

impl SlideExtractor {
    /// 使用默认参数创建
    pub fn create() -> Self {
        info!("🎬 SlideExtractor: created");
        Self {
            manager: SlideExtractorManager::new(EngineConfig::default()),
        }
    }

    pub fn with_config(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            "🎬 SlideExtractor: created ({:?}, {} confirmations)",
            config.comparison_method,
            config.required_confirmations()
        );
        Ok(Self {
            manager: SlideExtractorManager::new(config),
        })
    }

    /// 从已抽取的帧中提取幻灯片
    pub fn process_video(&self, video_path: &str, frames: &[Frame]) -> Result<VideoSlides, ExtractError> {
        info!("📹 {}: {} frames", video_path, frames.len());
        let report = self.manager.extract(frames)?;
        info!(
            "✅ {}: {} slides{}",
            video_path,
            report.slides.len(),
            if report.is_partial() { " (cancelled)" } else { "" }
        );
        Ok(VideoSlides {
            video_path: video_path.to_string(),
            report,
        })
    }

    pub fn stats(&self) -> ExtractionStats {
        self.manager.get_stats()
    }

    pub fn progress(&self) -> ExtractionProgress {
        self.manager.progress()
    }

    /// 取消进行中的提取，已确定的幻灯片保留
    pub fn cancel(&self) {
        info!("⏹️ SlideExtractor: cancel requested");
        self.manager.cancel()
    }

    pub fn reset(&self) {
        self.manager.reset()
    }

    pub fn config(&self) -> &EngineConfig {
        self.manager.config()
    }
}

impl Default for SlideExtractor {
    fn default() -> Self {
        Self::create()
    }
}

impl Drop for SlideExtractor {
    fn drop(&mut self) {
        info!("🗑️ SlideExtractor: released");
    }
}

/// `<视频文件名>_slide_<序号:04>_f<帧号>.jpg`
pub fn slide_file_name(video_path: &str, slide: &Slide) -> String {
    let stem = Path::new(video_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("video");
    format!(
        "{}_slide_{:04}_f{}.jpg",
        stem, slide.sequence_index, slide.frame_index
    )
}
