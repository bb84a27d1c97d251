// Caption synthesis
//
// Words inside the cut window are grouped into cues under a character
// budget and a pause policy, then serialized as either:
// - srt: numbered, time-coded plain text blocks
// - karaoke: ASS dialogue lines with per-word \k reveal timing

pub mod karaoke;
pub mod srt;

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use crate::boundary::CutWindow;
use crate::config::{CaptionConfig, CaptionFormat, CaptionStyle};
use crate::error::Result;
use crate::timeline::WordTimeline;

/// One timed piece of a cue. Empty text marks a pause between words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionSegment {
    pub text: String,
    pub centiseconds: u32,
}

impl CaptionSegment {
    pub fn is_pause(&self) -> bool {
        self.text.is_empty()
    }
}

/// One caption display unit, offsets in seconds relative to the cut start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionCue {
    pub start_offset: f64,
    pub end_offset: f64,
    pub segments: Vec<CaptionSegment>,
}

impl CaptionCue {
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter(|s| !s.is_pause()).map(|s| s.text.as_str())
    }

    pub fn text(&self) -> String {
        self.words().collect::<Vec<_>>().join(" ")
    }

    #[cfg(test)]
    fn total_centiseconds(&self) -> u32 {
        self.segments.iter().map(|s| s.centiseconds).sum()
    }
}

/// Start-ascending, non-overlapping cues
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptionTrack {
    cues: Vec<CaptionCue>,
}

impl CaptionTrack {
    pub fn cues(&self) -> &[CaptionCue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Serialize the track; `resolution` sets the karaoke canvas
    pub fn render(&self, format: CaptionFormat, style: &CaptionStyle, resolution: (u32, u32)) -> String {
        match format {
            CaptionFormat::Plain => srt::render(self),
            CaptionFormat::Karaoke => karaoke::render(self, style, resolution),
        }
    }
}

/// File extension the engine's subtitle filter expects for a format
pub fn file_extension(format: CaptionFormat) -> &'static str {
    match format {
        CaptionFormat::Plain => "srt",
        CaptionFormat::Karaoke => "ass",
    }
}

/// Write a serialized track to `output_path`
pub async fn write_track<P: AsRef<Path>>(
    track: &CaptionTrack,
    format: CaptionFormat,
    style: &CaptionStyle,
    resolution: (u32, u32),
    output_path: P,
) -> Result<()> {
    let output_path = output_path.as_ref();
    info!("Writing {} caption cues to {}", track.len(), output_path.display());

    fs::write(output_path, track.render(format, style, resolution)).await?;
    Ok(())
}

/// A word clipped to the cut window
struct TimedWord<'a> {
    text: &'a str,
    start: f64,
    end: f64,
}

pub struct CaptionSynthesizer {
    max_chars: usize,
    pause_threshold: f64,
}

impl CaptionSynthesizer {
    pub fn new(config: &CaptionConfig) -> Self {
        Self {
            max_chars: config.max_chars.max(1),
            pause_threshold: config.pause_threshold,
        }
    }

    /// Group the words visible in `window` into cues.
    ///
    /// Words ending at or before the cut start, or starting at or after the
    /// cut end, are skipped; words straddling either edge are clamped to it.
    /// A word overlapping its predecessor is pushed to start where that one
    /// ends, so cues never overlap.
    pub fn synthesize(&self, timeline: &WordTimeline, window: &CutWindow) -> CaptionTrack {
        let mut cues = Vec::new();
        let mut pending: Vec<TimedWord<'_>> = Vec::new();
        let mut chars = 0usize;
        let mut previous_end = window.cut_start;

        for word in timeline.words() {
            if word.end <= window.cut_start || word.start >= window.cut_end {
                continue;
            }
            let start = word.start.max(previous_end);
            let end = word.end.min(window.cut_end);
            if end <= start {
                continue;
            }

            let len = word.text.chars().count();
            if let Some(last) = pending.last() {
                let over_budget = chars + 1 + len > self.max_chars;
                let paused = start - last.end > self.pause_threshold;
                if over_budget || paused {
                    self.flush(&mut pending, window.cut_start, &mut cues);
                    chars = 0;
                }
            }

            chars = if pending.is_empty() { len } else { chars + 1 + len };
            pending.push(TimedWord { text: &word.text, start, end });
            previous_end = end;
        }
        self.flush(&mut pending, window.cut_start, &mut cues);

        debug!("Synthesized {} cues", cues.len());
        CaptionTrack { cues }
    }

    fn flush(&self, pending: &mut Vec<TimedWord<'_>>, cut_start: f64, cues: &mut Vec<CaptionCue>) {
        let words = std::mem::take(pending);
        let (Some(first), Some(last)) = (words.first(), words.last()) else {
            return;
        };

        let start_offset = (first.start - cut_start).max(0.0);
        let end_offset = (last.end - cut_start).max(0.0);
        if end_offset <= start_offset {
            return;
        }

        // Durations come from rounded boundaries relative to the cue start so
        // the tags of a cue add up to its rounded length. A single tag may be
        // one centisecond off round(word duration * 100) as a result.
        let origin = first.start;
        let boundary = |t: f64| ((t - origin) * 100.0).round().max(0.0) as u32;
        let mut segments = Vec::with_capacity(words.len() * 2);
        let mut previous_end: Option<u32> = None;
        for word in &words {
            let (start, end) = (boundary(word.start), boundary(word.end));
            if let Some(previous_end) = previous_end {
                if start > previous_end {
                    segments.push(CaptionSegment { text: String::new(), centiseconds: start - previous_end });
                }
            }
            segments.push(CaptionSegment {
                text: word.text.to_string(),
                centiseconds: end.saturating_sub(start),
            });
            previous_end = Some(end);
        }

        cues.push(CaptionCue { start_offset, end_offset, segments });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::Word;

    fn synthesizer(max_chars: usize) -> CaptionSynthesizer {
        CaptionSynthesizer::new(&CaptionConfig { max_chars, ..CaptionConfig::default() })
    }

    fn window(cut_start: f64, cut_end: f64) -> CutWindow {
        CutWindow { cut_start, cut_end, lead_in: 0.1, tail: 0.15 }
    }

    fn sentence() -> WordTimeline {
        WordTimeline::new(vec![
            Word::new(10.3, 10.9, "world"),
            Word::new(9.8, 10.3, "hello"),
            Word::new(11.0, 11.4, "this"),
            Word::new(11.45, 11.6, "is"),
            Word::new(11.65, 12.3, "karaoke"),
            Word::new(13.5, 14.0, "after"),
            Word::new(14.05, 14.6, "a"),
            Word::new(14.7, 15.2, "pause"),
        ])
    }

    #[test]
    fn test_budget_and_pause_breaks() {
        let track = synthesizer(16).synthesize(&sentence(), &window(10.0, 15.35));
        let texts: Vec<String> = track.cues().iter().map(|c| c.text()).collect();

        assert_eq!(texts, vec!["hello world this", "is karaoke", "after a pause"]);
        for cue in track.cues() {
            assert!(cue.text().chars().count() <= 16);
        }
    }

    #[test]
    fn test_offsets_relative_to_cut_start() {
        let track = synthesizer(22).synthesize(&sentence(), &window(10.0, 15.35));
        let first = &track.cues()[0];

        // "hello" began before the cut and is clamped to it
        assert_eq!(first.start_offset, 0.0);
        assert_eq!(first.text(), "hello world this is");
        assert!((first.end_offset - 1.6).abs() < 1e-9);
        assert_eq!(first.segments[0], CaptionSegment { text: "hello".to_string(), centiseconds: 30 });
    }

    #[test]
    fn test_words_before_cut_are_skipped() {
        let timeline = sentence();
        let track = synthesizer(22).synthesize(&timeline, &window(11.0, 15.35));

        for word in timeline.words().iter().filter(|w| w.end <= 11.0) {
            assert!(track.cues().iter().all(|c| c.words().all(|t| t != word.text)));
        }
        assert_eq!(track.cues()[0].words().next(), Some("this"));
    }

    #[test]
    fn test_words_after_cut_end_are_dropped() {
        let track = synthesizer(22).synthesize(&sentence(), &window(10.0, 12.0));
        let last = track.cues().last().unwrap();

        assert_eq!(last.words().last(), Some("karaoke"));
        assert!((last.end_offset - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_cues_are_ordered_and_non_degenerate() {
        let overlapping = WordTimeline::new(vec![
            Word::new(1.0, 2.0, "one"),
            Word::new(1.5, 1.9, "swallowed"),
            Word::new(1.8, 2.6, "two"),
            Word::new(4.0, 4.0, "instant"),
        ]);
        let track = synthesizer(5).synthesize(&overlapping, &window(0.5, 5.0));

        let mut previous_end = 0.0;
        for cue in track.cues() {
            assert!(cue.end_offset > cue.start_offset);
            assert!(cue.start_offset >= previous_end);
            previous_end = cue.end_offset;
        }
        assert_eq!(track.cues().iter().map(|c| c.text()).collect::<Vec<_>>(), vec!["one", "two"]);
    }

    #[test]
    fn test_karaoke_tags_sum_to_cue_length() {
        let track = synthesizer(22).synthesize(&sentence(), &window(10.0, 15.35));

        for cue in track.cues() {
            let expected = (cue.end_offset - cue.start_offset) * 100.0;
            assert!((cue.total_centiseconds() as f64 - expected).abs() <= 1.0, "{:?}", cue);
        }
    }

    #[test]
    fn test_short_word_tag_follows_rounded_boundaries() {
        let timeline = WordTimeline::new(vec![Word::new(0.0, 0.5, "so"), Word::new(0.514, 0.526, "uh")]);
        let track = synthesizer(22).synthesize(&timeline, &window(0.0, 1.0));
        let cue = &track.cues()[0];

        // "uh" alone rounds to 1cs, but spans boundaries 51 and 53
        assert_eq!(
            cue.segments,
            vec![
                CaptionSegment { text: "so".to_string(), centiseconds: 50 },
                CaptionSegment { text: String::new(), centiseconds: 1 },
                CaptionSegment { text: "uh".to_string(), centiseconds: 2 },
            ]
        );
        assert_eq!(cue.total_centiseconds(), 53);
    }

    #[test]
    fn test_degenerate_inputs() {
        let empty = synthesizer(22).synthesize(&WordTimeline::default(), &window(0.0, 5.0));
        assert!(empty.is_empty());

        let single = WordTimeline::new(vec![Word::new(0.0, 5.0, "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")]);
        let track = synthesizer(22).synthesize(&single, &window(0.0, 5.0));
        assert_eq!(track.len(), 1);
        assert_eq!(track.cues()[0].end_offset, 5.0);
    }

    #[test]
    fn test_write_track_uses_format_serialization() {
        let temp = tempfile::TempDir::new().unwrap();
        let track = synthesizer(22).synthesize(&sentence(), &window(10.0, 15.35));
        let style = CaptionStyle::default();

        let srt_path = temp.path().join(format!("captions.{}", file_extension(CaptionFormat::Plain)));
        tokio_test::block_on(write_track(&track, CaptionFormat::Plain, &style, (1080, 1920), &srt_path)).unwrap();
        let srt = std::fs::read_to_string(&srt_path).unwrap();
        assert!(srt.starts_with("1\n00:00:00,000 --> "));

        let ass_path = temp.path().join(format!("captions.{}", file_extension(CaptionFormat::Karaoke)));
        tokio_test::block_on(write_track(&track, CaptionFormat::Karaoke, &style, (1080, 1920), &ass_path)).unwrap();
        let ass = std::fs::read_to_string(&ass_path).unwrap();
        assert_eq!(ass.matches("Dialogue: ").count(), track.len());
    }
}
