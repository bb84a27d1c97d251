use async_trait::async_trait;
use std::path::Path;
use std::process::Command;
use tokio::fs;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::boundary::RequestWindow;
use crate::config::{BoundaryConfig, MediaConfig};
use crate::error::{ClipError, Result};
use crate::progress::{ProgressTracker, ProgressUpdate};
use crate::silence::SilenceMap;

use super::plan::{RenderPlan, WatermarkPrescale};
use super::{MediaCommandBuilder, MediaProcessorTrait};

/// Concrete implementation of media processor (FFmpeg-based)
pub struct MediaProcessorImpl {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl MediaProcessorImpl {
    /// Create a new media processor implementation
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config);

        Self {
            config,
            command_builder,
        }
    }
}

/// Source-time region scanned for silence around a request
pub fn silence_search_region(request: RequestWindow, radius: f64) -> (f64, f64) {
    let start = (request.start - radius).max(0.0);
    (start, request.end + radius)
}

#[async_trait]
impl MediaProcessorTrait for MediaProcessorImpl {
    /// Check if media processor is available
    fn check_availability(&self) -> Result<()> {
        let output = Command::new(&self.config.binary_path)
            .arg("-version")
            .output()
            .map_err(|e| ClipError::Config(format!("Media processor '{}' not found: {}", self.config.binary_path, e)))?;

        if output.status.success() {
            info!("Media processor is available");
            Ok(())
        } else {
            Err(ClipError::Config("Media processor version check failed".to_string()))
        }
    }

    /// Get media processor version information
    async fn get_version_info(&self) -> Result<String> {
        debug!("Getting media processor version information");

        let command = self.command_builder.version_check();
        let output = tokio::process::Command::new(&command.binary_path)
            .args(&command.args)
            .output()
            .await
            .map_err(|e| ClipError::Config(format!("Failed to execute media processor: {}", e)))?;

        if output.status.success() {
            let version_info = String::from_utf8_lossy(&output.stdout);
            // First line carries the version
            let first_line = version_info.lines().next().unwrap_or("Unknown version");
            Ok(first_line.to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(ClipError::Engine {
                description: command.description,
                exit_code: output.status.code(),
                excerpt: super::error_excerpt(&stderr, self.config.error_tail_lines),
            })
        }
    }

    async fn detect_silence(
        &self,
        source: &Path,
        request: RequestWindow,
        boundary: &BoundaryConfig,
    ) -> Result<SilenceMap> {
        let (start, end) = silence_search_region(request, boundary.silence_search_radius);
        info!("Detecting silence in {} over [{:.3}, {:.3}]", source.display(), start, end);

        let command = self.command_builder.detect_silence(
            source,
            start,
            end - start,
            boundary.silence_noise_db,
            boundary.silence_min_duration,
        );
        let diagnostics = command.execute().await?;

        // Markers are relative to the seek point
        let map = SilenceMap::parse(&diagnostics, boundary.silence_min_duration).shifted(start);
        info!("Found {} silence intervals", map.len());
        Ok(map)
    }

    async fn prescale_watermark(&self, prescale: &WatermarkPrescale) -> Result<()> {
        if let Some(parent) = prescale.target.parent() {
            fs::create_dir_all(parent).await?;
        }
        info!(
            "Pre-scaling watermark {} to {}px -> {}",
            prescale.source.display(),
            prescale.width,
            prescale.target.display()
        );
        // Readers only ever see a complete file at `target`
        let staging = prescale.staging_path();
        if let Err(e) = self.command_builder.prescale_watermark(prescale, &staging).execute().await {
            let _ = fs::remove_file(&staging).await;
            return Err(e);
        }
        if let Err(e) = fs::rename(&staging, &prescale.target).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn render(
        &self,
        plan: &RenderPlan,
        source: &Path,
        output: &Path,
        tracker: &mut ProgressTracker,
        updates: Option<UnboundedSender<ProgressUpdate>>,
    ) -> Result<()> {
        info!("Rendering {} -> {}", source.display(), output.display());

        let command = self.command_builder.render(plan, source, output);
        command.execute_with_progress(tracker, updates.as_ref()).await?;

        info!("Render completed successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_search_region() {
        let request = RequestWindow::new(10.0, 15.0).unwrap();
        assert_eq!(silence_search_region(request, 2.0), (8.0, 17.0));

        let early = RequestWindow::new(0.5, 3.0).unwrap();
        assert_eq!(silence_search_region(early, 2.0), (0.0, 5.0));
    }

    #[tokio::test]
    async fn test_unavailable_binary() {
        let processor = MediaProcessorImpl::new(MediaConfig {
            binary_path: "/nonexistent/clipsnap-engine".to_string(),
            ..MediaConfig::default()
        });

        assert!(processor.check_availability().is_err());
        assert!(processor.get_version_info().await.is_err());
    }
}
