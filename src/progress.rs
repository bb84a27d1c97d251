use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::debug;

use crate::config::ProgressConfig;
use crate::error::{Result, ClipError};

static TIME_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"time=(\d{2,}):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid time marker pattern")
});

/// Partial lines longer than this only keep their tail
const MAX_PARTIAL_LINE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Slice of the global 0-100 scale owned by one stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageBounds {
    pub name: String,
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub stage: String,
    pub percent: f64,
}

/// Incremental parser mapping engine output to throttled global progress.
///
/// Callers push text chunks in and get at most one update back per call.
/// Reported values only grow, each by at least `threshold` points, and never
/// leave the current stage's bounds.
#[derive(Debug)]
pub struct ProgressTracker {
    stages: Vec<StageBounds>,
    threshold: f64,
    state: TrackerState,
    current: Option<usize>,
    stage_total: f64,
    last_reported: Option<f64>,
    partial_line: String,
}

impl ProgressTracker {
    pub fn new(stages: Vec<StageBounds>, threshold: f64) -> Self {
        Self {
            stages,
            threshold,
            state: TrackerState::Idle,
            current: None,
            stage_total: 0.0,
            last_reported: None,
            partial_line: String::new(),
        }
    }

    pub fn from_config(config: &ProgressConfig) -> Self {
        let stages = config
            .stages
            .iter()
            .map(|s| StageBounds { name: s.name.clone(), low: s.low, high: s.high })
            .collect();
        Self::new(stages, config.threshold)
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn last_reported(&self) -> Option<f64> {
        self.last_reported
    }

    /// Enter `name`, whose local progress is measured against `total_seconds`
    /// of engine time (zero when the stage reports fractions directly).
    pub fn begin_stage(&mut self, name: &str, total_seconds: f64) -> Result<Option<ProgressUpdate>> {
        if matches!(self.state, TrackerState::Completed | TrackerState::Failed) {
            return Err(ClipError::Config(format!("cannot begin stage '{}' after the operation ended", name)));
        }
        let index = self
            .stages
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| ClipError::Config(format!("unknown progress stage '{}'", name)))?;

        debug!("Progress stage '{}' started", name);
        self.state = TrackerState::Running;
        self.current = Some(index);
        self.stage_total = total_seconds;
        self.partial_line.clear();
        Ok(self.report_fraction(0.0))
    }

    /// Consume a chunk of engine output.
    ///
    /// Only complete lines (ended by `\r` or `\n`) are scanned; the rest is
    /// kept for the next chunk. Chunks without a time marker are ignored.
    pub fn feed(&mut self, chunk: &str) -> Option<ProgressUpdate> {
        if self.state != TrackerState::Running {
            return None;
        }
        self.partial_line.push_str(chunk);

        let Some(cut) = self.partial_line.rfind(['\r', '\n']) else {
            self.trim_partial_line();
            return None;
        };
        let complete: String = self.partial_line.drain(..=cut).collect();
        self.trim_partial_line();

        let seconds = last_time_marker(&complete)?;
        self.report_seconds(seconds)
    }

    /// Scan whatever partial line is left once the stream has ended
    pub fn finish(&mut self) -> Option<ProgressUpdate> {
        let remaining = std::mem::take(&mut self.partial_line);
        if self.state != TrackerState::Running {
            return None;
        }
        let seconds = last_time_marker(&remaining)?;
        self.report_seconds(seconds)
    }

    /// Report local completion of the current stage as a fraction
    pub fn report_fraction(&mut self, fraction: f64) -> Option<ProgressUpdate> {
        if self.state != TrackerState::Running {
            return None;
        }
        let stage = &self.stages[self.current?];
        let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
        let percent = stage.low + fraction * (stage.high - stage.low);

        if let Some(last) = self.last_reported {
            if percent < last + self.threshold {
                return None;
            }
        }
        self.last_reported = Some(percent);
        Some(ProgressUpdate { stage: stage.name.clone(), percent })
    }

    /// Mark the operation finished; reports the current stage's upper bound if due
    pub fn complete(&mut self) -> Option<ProgressUpdate> {
        let update = self.report_fraction(1.0);
        self.state = TrackerState::Completed;
        update
    }

    pub fn fail(&mut self) {
        self.state = TrackerState::Failed;
    }

    fn report_seconds(&mut self, seconds: f64) -> Option<ProgressUpdate> {
        if self.stage_total <= 0.0 {
            return None;
        }
        self.report_fraction(seconds / self.stage_total)
    }

    fn trim_partial_line(&mut self) {
        if self.partial_line.len() > MAX_PARTIAL_LINE {
            let mut start = self.partial_line.len() - MAX_PARTIAL_LINE;
            while !self.partial_line.is_char_boundary(start) {
                start += 1;
            }
            self.partial_line.drain(..start);
        }
    }
}

/// Seconds of the last `time=HH:MM:SS.ff` marker in `text`
pub fn last_time_marker(text: &str) -> Option<f64> {
    let captures = TIME_MARKER.captures_iter(text).last()?;
    let hours: f64 = captures[1].parse().ok()?;
    let minutes: f64 = captures[2].parse().ok()?;
    let seconds: f64 = captures[3].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}
