use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::MediaConfig;
use crate::error::{ClipError, Result};
use crate::progress::{ProgressTracker, ProgressUpdate};

use super::plan::{RenderPlan, WatermarkPrescale};

/// Captured stderr beyond this is dropped from the front unless the caller
/// needs the whole stream
const MAX_CAPTURED_STDERR: usize = 64 * 1024;

/// Abstract media processing command representation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
    pub timeout_secs: u64,
    pub error_tail_lines: usize,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
            timeout_secs: 600,
            error_tail_lines: 6,
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Keep diagnostics free of the build banner
    pub fn quiet(self) -> Self {
        self.arg("-hide_banner").arg("-nostdin")
    }

    /// Seek the next input to `start` and read `duration` seconds of it
    pub fn seek(self, start: f64, duration: f64) -> Self {
        self.arg("-ss").arg(format!("{:.3}", start)).arg("-t").arg(format!("{:.3}", duration))
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Add video filter
    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    /// Add audio filter
    pub fn audio_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-af").arg(filter)
    }

    /// Decode without writing anything
    pub fn null_output(self) -> Self {
        self.arg("-f").arg("null").arg("-")
    }

    /// Run to completion and return everything written to stderr
    pub async fn execute(&self) -> Result<String> {
        self.run(true, |_| {}).await
    }

    /// Run while feeding stderr to `tracker`, forwarding updates to `updates`
    pub async fn execute_with_progress(
        &self,
        tracker: &mut ProgressTracker,
        updates: Option<&UnboundedSender<ProgressUpdate>>,
    ) -> Result<String> {
        let forward = |update: Option<ProgressUpdate>| {
            if let (Some(update), Some(sender)) = (update, updates) {
                debug!("{} progress: {:.0}%", update.stage, update.percent);
                // Receiver gone means nobody is watching; the render goes on
                let _ = sender.send(update);
            }
        };

        let stderr = self.run(false, |chunk| forward(tracker.feed(chunk))).await?;
        forward(tracker.finish());
        Ok(stderr)
    }

    async fn run<F: FnMut(&str)>(&self, keep_all: bool, mut on_chunk: F) -> Result<String> {
        debug!("Executing media processing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let mut child = Command::new(&self.binary_path)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.engine_error(None, format!("failed to start {}: {}", self.binary_path, e)))?;

        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| self.engine_error(None, "stderr was not captured".to_string()))?;

        let mut captured = String::new();
        let drive = async {
            let mut buffer = [0u8; 8192];
            let mut pending = Vec::new();
            loop {
                let read = stderr.read(&mut buffer).await?;
                let chunk = if read == 0 {
                    String::from_utf8_lossy(&std::mem::take(&mut pending)).into_owned()
                } else {
                    decode_chunk(&mut pending, &buffer[..read])
                };
                if !chunk.is_empty() {
                    on_chunk(chunk.as_str());
                    captured.push_str(&chunk);
                    if !keep_all {
                        trim_front(&mut captured, MAX_CAPTURED_STDERR);
                    }
                }
                if read == 0 {
                    break;
                }
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>(status)
        };

        let outcome = timeout(Duration::from_secs(self.timeout_secs), drive).await;
        let status = match outcome {
            Ok(status) => status?,
            Err(_) => {
                warn!("{} exceeded {}s, killing the engine", self.description, self.timeout_secs);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill timed-out engine: {}", e);
                }
                return Err(ClipError::EngineTimeout(self.description.clone(), self.timeout_secs));
            }
        };

        if !status.success() {
            return Err(self.engine_error(status.code(), error_excerpt(&captured, self.error_tail_lines)));
        }
        Ok(captured)
    }

    fn engine_error(&self, exit_code: Option<i32>, excerpt: String) -> ClipError {
        ClipError::Engine { description: self.description.clone(), exit_code, excerpt }
    }
}

/// Last `lines` non-empty stderr lines joined into one message
pub fn error_excerpt(stderr: &str, lines: usize) -> String {
    let tail: Vec<&str> = stderr
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let start = tail.len().saturating_sub(lines.max(1));
    if tail.is_empty() {
        "no diagnostics".to_string()
    } else {
        tail[start..].join(" | ")
    }
}

/// Decode `bytes` after whatever `pending` held, keeping an unfinished
/// trailing UTF-8 sequence in `pending` for the next read
fn decode_chunk(pending: &mut Vec<u8>, bytes: &[u8]) -> String {
    pending.extend_from_slice(bytes);
    let complete = pending.len() - incomplete_tail(pending);
    let text = String::from_utf8_lossy(&pending[..complete]).into_owned();
    pending.drain(..complete);
    text
}

/// Length of a multibyte sequence cut off at the end of `bytes`
fn incomplete_tail(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xF0..=0xF7 => 4,
            0xE0..=0xEF => 3,
            0xC0..=0xDF => 2,
            _ => 1,
        };
        return if width > back { back } else { 0 };
    }
    0
}

fn trim_front(text: &mut String, limit: usize) {
    if text.len() > limit {
        let mut start = text.len() - limit;
        while !text.is_char_boundary(start) {
            start += 1;
        }
        text.drain(..start);
    }
}

/// Builder for the engine invocations the pipeline needs
pub struct MediaCommandBuilder {
    binary_path: String,
    timeout_secs: u64,
    error_tail_lines: usize,
}

impl MediaCommandBuilder {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            binary_path: config.binary_path.clone(),
            timeout_secs: config.engine_timeout_secs,
            error_tail_lines: config.error_tail_lines,
        }
    }

    fn command<S: Into<String>>(&self, description: S) -> MediaCommand {
        let mut command = MediaCommand::new(&self.binary_path, description);
        command.timeout_secs = self.timeout_secs;
        command.error_tail_lines = self.error_tail_lines;
        command
    }

    /// Build the clip render command from a plan
    pub fn render<P: AsRef<Path>>(&self, plan: &RenderPlan, source: P, output: P) -> MediaCommand {
        self.command("Clip render")
            .quiet()
            .args(plan.ffmpeg_args(source.as_ref(), output.as_ref()))
    }

    /// Build a silencedetect pass over `[start, start + duration)`
    pub fn detect_silence<P: AsRef<Path>>(
        &self,
        source: P,
        start: f64,
        duration: f64,
        noise_db: f64,
        min_duration: f64,
    ) -> MediaCommand {
        self.command("Silence detection")
            .quiet()
            .seek(start, duration)
            .input(source)
            .no_video()
            .audio_filter(format!("silencedetect=noise={}dB:d={}", noise_db, min_duration))
            .null_output()
    }

    /// Build the watermark downscale, written to `output`
    pub fn prescale_watermark<P: AsRef<Path>>(&self, prescale: &WatermarkPrescale, output: P) -> MediaCommand {
        self.command("Watermark prescale")
            .quiet()
            .overwrite()
            .input(&prescale.source)
            .video_filter(format!("scale={}:-1", prescale.width))
            .output(output)
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        self.command("Version check").arg("-version")
    }
}
