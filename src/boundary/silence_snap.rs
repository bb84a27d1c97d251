use tracing::debug;

use crate::config::BoundaryConfig;
use crate::silence::{SilenceInterval, SilenceMap};
use crate::timeline::WordTimeline;

use super::{padding, word_snap, CutWindow, Edge, RequestWindow};

/// Silence that ends closest to `raw_start` within `radius`, among those
/// that began at or before it
pub fn start_interval(silence: &SilenceMap, raw_start: f64, radius: f64) -> Option<SilenceInterval> {
    silence
        .intervals()
        .iter()
        .filter(|i| i.start <= raw_start && (i.end - raw_start).abs() <= radius)
        .min_by(|a, b| (a.end - raw_start).abs().total_cmp(&(b.end - raw_start).abs()))
        .copied()
}

/// Silence that starts closest to `raw_end` within `radius`, among those
/// that last until at least `raw_end`
pub fn end_interval(silence: &SilenceMap, raw_end: f64, radius: f64) -> Option<SilenceInterval> {
    silence
        .intervals()
        .iter()
        .filter(|i| i.end >= raw_end && (i.start - raw_end).abs() <= radius)
        .min_by(|a, b| (a.start - raw_end).abs().total_cmp(&(b.start - raw_end).abs()))
        .copied()
}

/// Cut `buffer` before speech resumes, never earlier than the silence began
pub fn snap_start(interval: SilenceInterval, buffer: f64) -> f64 {
    (interval.end - buffer).max(interval.start)
}

/// Cut `buffer` after speech stops, never later than the silence ends
pub fn snap_end(interval: SilenceInterval, buffer: f64) -> f64 {
    (interval.start + buffer).min(interval.end)
}

fn fallback_start(timeline: &WordTimeline, raw_start: f64, config: &BoundaryConfig) -> Edge {
    if timeline.is_empty() {
        padding::start_edge(raw_start, config.loose_pad_start)
    } else {
        word_snap::start_edge(timeline, raw_start, config)
    }
}

fn fallback_end(timeline: &WordTimeline, raw_end: f64, config: &BoundaryConfig) -> Edge {
    if timeline.is_empty() {
        padding::end_edge(raw_end, config.loose_pad_end)
    } else {
        word_snap::end_edge(timeline, raw_end, config)
    }
}

/// Snap each boundary into nearby silence, falling back per boundary to
/// word snap (or the loose cut without a transcript).
pub fn resolve(
    silence: &SilenceMap,
    timeline: &WordTimeline,
    request: RequestWindow,
    config: &BoundaryConfig,
) -> CutWindow {
    let radius = config.silence_search_radius;

    let start = match start_interval(silence, request.start, radius) {
        Some(interval) => {
            let cut = snap_start(interval, config.silence_buffer);
            Edge { cut, margin: interval.end - cut }
        }
        None => {
            debug!("No silence within {:.2}s of start {:.3}", radius, request.start);
            fallback_start(timeline, request.start, config)
        }
    };

    let end = match end_interval(silence, request.end, radius) {
        Some(interval) => {
            let cut = snap_end(interval, config.silence_buffer);
            Edge { cut, margin: cut - interval.start }
        }
        None => {
            debug!("No silence within {:.2}s of end {:.3}", radius, request.end);
            fallback_end(timeline, request.end, config)
        }
    };

    CutWindow::from_edges(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::Word;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn map(intervals: &[(f64, f64)]) -> SilenceMap {
        SilenceMap::new(intervals.iter().map(|&(start, end)| SilenceInterval { start, end }).collect())
    }

    #[test]
    fn test_worked_example_start() {
        let silence = map(&[(9.0, 9.6)]);
        let interval = start_interval(&silence, 9.55, 2.0).unwrap();
        let cut = snap_start(interval, 0.1);

        assert!(approx(cut, 9.5));
        assert!(cut >= 9.0);
    }

    #[test]
    fn test_buffer_clamped_to_interval() {
        let interval = SilenceInterval { start: 4.0, end: 4.05 };
        assert_eq!(snap_start(interval, 0.1), 4.0);
        assert_eq!(snap_end(interval, 0.1), 4.05);
    }

    #[test]
    fn test_picks_closest_qualifying_interval() {
        let silence = map(&[(5.0, 6.0), (7.0, 7.8), (8.1, 9.0), (12.0, 13.0)]);

        // (8.1, 9.0) begins after the request start so it cannot protect it
        assert_eq!(start_interval(&silence, 8.0, 2.0), Some(SilenceInterval { start: 7.0, end: 7.8 }));
        // (12.0, 13.0) starts 2.5s away, beyond the radius
        assert_eq!(end_interval(&silence, 9.5, 2.0), None);
        assert_eq!(end_interval(&silence, 10.5, 2.0), Some(SilenceInterval { start: 12.0, end: 13.0 }));
    }

    #[test]
    fn test_resolved_edges_stay_inside_intervals() {
        let silence = map(&[(9.0, 9.6), (15.3, 16.0)]);
        let config = BoundaryConfig::default();
        let window = resolve(&silence, &WordTimeline::default(), RequestWindow::new(9.55, 15.1).unwrap(), &config);

        assert!(window.cut_start >= 9.0 && window.cut_start <= 9.6);
        assert!(window.cut_end >= 15.3 && window.cut_end <= 16.0);
        assert!(approx(window.cut_end, 15.4));
        assert!(approx(window.lead_in, 0.1));
        assert!(approx(window.tail, 0.1));
    }

    #[test]
    fn test_missing_silence_falls_back_per_boundary() {
        let silence = map(&[(9.0, 9.6)]);
        let timeline = WordTimeline::new(vec![Word::new(9.6, 10.0, "start"), Word::new(20.0, 20.5, "stop")]);
        let config = BoundaryConfig::default();
        let window = resolve(&silence, &timeline, RequestWindow::new(9.55, 20.4).unwrap(), &config);

        assert!(approx(window.cut_start, 9.5));
        // no silence near 20.4: word snap to 20.5 + 0.15
        assert!(approx(window.cut_end, 20.65));
    }

    #[test]
    fn test_empty_map_and_transcript_use_loose_pads() {
        let config = BoundaryConfig::default();
        let window = resolve(&SilenceMap::default(), &WordTimeline::default(), RequestWindow::new(3.0, 4.0).unwrap(), &config);

        assert!(approx(window.cut_start, 2.75));
        assert!(approx(window.cut_end, 4.4));
    }
}
