// Cut boundary resolution
//
// Each strategy turns a coarse request window into exact cut points:
// - word_snap: align to word onsets/offsets from the transcript
// - silence_snap: land inside detected silence next to each boundary
// - padding: widen the raw window by fixed pads ("loose cut")
//
// Strategies are plain functions so each one is testable on its own;
// BoundaryResolver selects one and owns the fallback chain between them.

pub mod padding;
pub mod silence_snap;
pub mod word_snap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{BoundaryConfig, BoundaryStrategy};
use crate::error::{Result, ClipError};
use crate::silence::SilenceMap;
use crate::timeline::WordTimeline;

/// Coarse window supplied by the caller, in seconds of source media
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RequestWindow {
    pub start: f64,
    pub end: f64,
}

impl RequestWindow {
    /// Negative starts are clamped to zero; anything else unusable is rejected
    pub fn new(start: f64, end: f64) -> Result<Self> {
        if !start.is_finite() || !end.is_finite() {
            return Err(ClipError::InputIncomplete(format!(
                "request window must be finite, got [{}, {}]",
                start, end
            )));
        }
        let start = start.max(0.0);
        if end <= start {
            return Err(ClipError::InputIncomplete(format!(
                "request window end {:.3}s does not follow start {:.3}s",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Exact extraction window handed to caption synthesis and the engine.
///
/// `lead_in` and `tail` are the margins actually left between the cut and
/// the audible content it protects; fades must fit inside them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CutWindow {
    pub cut_start: f64,
    pub cut_end: f64,
    pub lead_in: f64,
    pub tail: f64,
}

impl CutWindow {
    pub fn duration(&self) -> f64 {
        self.cut_end - self.cut_start
    }

    /// Fail with `BoundaryDegenerate` unless the window is usable downstream
    pub fn validate(&self, min_duration: f64) -> Result<()> {
        let finite = self.cut_start.is_finite() && self.cut_end.is_finite();
        if !finite || self.cut_start < 0.0 || self.cut_end <= self.cut_start || self.duration() < min_duration {
            return Err(ClipError::BoundaryDegenerate {
                cut_start: self.cut_start,
                cut_end: self.cut_end,
            });
        }
        Ok(())
    }

    pub(crate) fn from_edges(start: Edge, end: Edge) -> Self {
        Self {
            cut_start: start.cut,
            cut_end: end.cut,
            lead_in: start.margin,
            tail: end.margin,
        }
    }

    fn is_inverted(&self) -> bool {
        self.cut_end <= self.cut_start
    }
}

/// One resolved boundary: where to cut, and how much safe margin that leaves
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Edge {
    pub cut: f64,
    pub margin: f64,
}

impl Edge {
    /// Cut `pad` seconds before content starting at `content`, never below zero
    pub(crate) fn before(content: f64, pad: f64) -> Self {
        let cut = (content - pad).max(0.0);
        Self { cut, margin: content - cut }
    }

    /// Cut `pad` seconds after content ending at `content`
    pub(crate) fn after(content: f64, pad: f64) -> Self {
        Self { cut: content + pad, margin: pad }
    }
}

pub struct BoundaryResolver {
    config: BoundaryConfig,
}

impl BoundaryResolver {
    pub fn new(config: BoundaryConfig) -> Self {
        Self { config }
    }

    /// Resolve `request` into a validated cut window.
    ///
    /// Missing evidence never fails: silence snap falls back to word snap per
    /// boundary, and word snap falls back to the loose cut. Only a window that
    /// is still degenerate after every fallback is an error.
    pub fn resolve(
        &self,
        request: RequestWindow,
        strategy: BoundaryStrategy,
        timeline: &WordTimeline,
        silence: Option<&SilenceMap>,
    ) -> Result<CutWindow> {
        let window = match strategy {
            BoundaryStrategy::Loose => self.loose(request),
            BoundaryStrategy::WordSnap => self.word_snap(request, timeline),
            BoundaryStrategy::SilenceSnap => {
                let empty = SilenceMap::default();
                let silence = silence.unwrap_or(&empty);
                let window = silence_snap::resolve(silence, timeline, request, &self.config);
                if window.is_inverted() {
                    debug!("Silence snap crossed over inside [{:.3}, {:.3}], using word snap", request.start, request.end);
                    self.word_snap(request, timeline)
                } else {
                    window
                }
            }
        };

        window.validate(self.config.min_clip_duration)?;
        info!(
            "Resolved [{:.3}, {:.3}] with {:?} to [{:.3}, {:.3}]",
            request.start, request.end, strategy, window.cut_start, window.cut_end
        );
        Ok(window)
    }

    fn loose(&self, request: RequestWindow) -> CutWindow {
        padding::resolve(request, self.config.loose_pad_start, self.config.loose_pad_end)
    }

    fn word_snap(&self, request: RequestWindow, timeline: &WordTimeline) -> CutWindow {
        if timeline.is_empty() {
            debug!("No transcript words, using loose cut");
            return self.loose(request);
        }
        let window = word_snap::resolve(timeline, request, &self.config);
        if window.is_inverted() {
            // No word inside the request: keep the raw window with word pads
            debug!("No words inside [{:.3}, {:.3}], padding raw window", request.start, request.end);
            return padding::resolve(request, self.config.word_pad_start, self.config.word_pad_end);
        }
        window
    }
}
