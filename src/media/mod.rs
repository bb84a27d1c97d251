// Media processing over the ffmpeg engine
//
// - Plan: pure filter graph and argument composition
// - Escape: quoting rules for filter option values
// - Commands: command builders and process supervision
// - Processor: the engine-backed implementation of the trait below

pub mod commands;
pub mod escape;
pub mod plan;
pub mod processor;

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc::UnboundedSender;

pub use commands::*;
pub use plan::*;
pub use processor::*;

use crate::boundary::RequestWindow;
use crate::config::{BoundaryConfig, MediaConfig};
use crate::error::Result;
use crate::progress::{ProgressTracker, ProgressUpdate};
use crate::silence::SilenceMap;

/// Main trait for media processing operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProcessorTrait: Send + Sync {
    /// Check if media processor is available
    fn check_availability(&self) -> Result<()>;

    /// Get media processor version information
    async fn get_version_info(&self) -> Result<String>;

    /// Detect silence around `request`, in source time
    async fn detect_silence(
        &self,
        source: &Path,
        request: RequestWindow,
        boundary: &BoundaryConfig,
    ) -> Result<SilenceMap>;

    /// Produce the cached watermark copy a plan refers to
    async fn prescale_watermark(&self, prescale: &WatermarkPrescale) -> Result<()>;

    /// Execute a render plan, driving `tracker` from engine output
    async fn render(
        &self,
        plan: &RenderPlan,
        source: &Path,
        output: &Path,
        tracker: &mut ProgressTracker,
        updates: Option<UnboundedSender<ProgressUpdate>>,
    ) -> Result<()>;
}

/// Factory for creating media processor instances
pub struct MediaProcessorFactory;

impl MediaProcessorFactory {
    /// Create the default media processor implementation (FFmpeg-based)
    pub fn create_processor(config: MediaConfig) -> Box<dyn MediaProcessorTrait> {
        Box::new(processor::MediaProcessorImpl::new(config))
    }
}
