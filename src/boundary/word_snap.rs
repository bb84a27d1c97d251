use crate::config::{BoundaryConfig, PartialWordPolicy};
use crate::timeline::WordTimeline;

use super::{CutWindow, Edge, RequestWindow};

/// Onset of the first word the clip should open on.
///
/// The word containing `raw_start` wins (unless `Skip` drops a word already
/// under way), then the next word starting after `raw_start`, then
/// `raw_start` itself.
pub fn snap_start(timeline: &WordTimeline, raw_start: f64, policy: PartialWordPolicy) -> f64 {
    let containing = timeline.word_containing(raw_start);
    if let Some(word) = containing {
        if policy == PartialWordPolicy::Keep || word.start >= raw_start {
            return word.start;
        }
    }
    timeline
        .first_starting_after(raw_start)
        .or(containing)
        .map(|w| w.start)
        .unwrap_or(raw_start)
}

/// Offset of the last word the clip should close on.
///
/// The word containing `raw_end`, then the nearest word ending before it,
/// then `raw_end` itself.
pub fn snap_end(timeline: &WordTimeline, raw_end: f64) -> f64 {
    timeline
        .last_word_containing(raw_end)
        .or_else(|| timeline.last_ending_before(raw_end))
        .map(|w| w.end)
        .unwrap_or(raw_end)
}

pub(crate) fn start_edge(timeline: &WordTimeline, raw_start: f64, config: &BoundaryConfig) -> Edge {
    Edge::before(snap_start(timeline, raw_start, config.partial_start_word), config.word_pad_start)
}

pub(crate) fn end_edge(timeline: &WordTimeline, raw_end: f64, config: &BoundaryConfig) -> Edge {
    Edge::after(snap_end(timeline, raw_end), config.word_pad_end)
}

/// Snap both boundaries to words and pad them.
///
/// The result can be inverted when no word lies inside the request; the
/// resolver checks for that and falls back.
pub fn resolve(timeline: &WordTimeline, request: RequestWindow, config: &BoundaryConfig) -> CutWindow {
    CutWindow::from_edges(
        start_edge(timeline, request.start, config),
        end_edge(timeline, request.end, config),
    )
}
