use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

static SILENCE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"silence_(start|end):\s*(-?\d+(?:\.\d+)?)").expect("valid silence marker pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SilenceInterval {
    pub start: f64,
    pub end: f64,
}

impl SilenceInterval {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Start-ordered silence evidence for one media file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SilenceMap {
    intervals: Vec<SilenceInterval>,
}

impl SilenceMap {
    pub fn new(mut intervals: Vec<SilenceInterval>) -> Self {
        intervals.retain(|i| i.start.is_finite() && i.end.is_finite() && i.end > i.start);
        intervals.sort_by(|a, b| a.start.total_cmp(&b.start));
        Self { intervals }
    }

    /// Parse silencedetect diagnostics into intervals of at least `min_duration`.
    ///
    /// Markers are paired in stream order. An end without a pending start and a
    /// start that never ends are discarded; garbage yields an empty map.
    pub fn parse(diagnostics: &str, min_duration: f64) -> Self {
        let mut intervals = Vec::new();
        let mut pending_start: Option<f64> = None;

        for captures in SILENCE_MARKER.captures_iter(diagnostics) {
            let Ok(value) = captures[2].parse::<f64>() else {
                continue;
            };
            match &captures[1] {
                "start" => pending_start = Some(value.max(0.0)),
                _ => {
                    if let Some(start) = pending_start.take() {
                        let interval = SilenceInterval { start, end: value };
                        if interval.duration() >= min_duration {
                            intervals.push(interval);
                        }
                    }
                }
            }
        }

        let map = Self::new(intervals);
        debug!("Parsed {} silence intervals", map.len());
        map
    }

    /// Move every interval by `offset` seconds, for maps detected on a seeked region
    pub fn shifted(&self, offset: f64) -> Self {
        Self::new(
            self.intervals
                .iter()
                .map(|i| SilenceInterval { start: (i.start + offset).max(0.0), end: i.end + offset })
                .collect(),
        )
    }

    pub fn intervals(&self) -> &[SilenceInterval] {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}
