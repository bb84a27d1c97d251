use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{Result, ClipError};

/// One transcribed word with absolute timing in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Word {
    pub fn new<S: Into<String>>(start: f64, end: f64, text: S) -> Self {
        Self { start, end, text: text.into() }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Accepted transcript shapes: a bare array, or an object carrying `words`
#[derive(Deserialize)]
#[serde(untagged)]
enum TranscriptPayload {
    Bare(Vec<Word>),
    Wrapped { words: Vec<Word> },
}

impl From<TranscriptPayload> for WordTimeline {
    fn from(payload: TranscriptPayload) -> Self {
        match payload {
            TranscriptPayload::Bare(words) | TranscriptPayload::Wrapped { words } => WordTimeline::new(words),
        }
    }
}

/// Start-ordered, read-only word timing for one request.
///
/// Input order is not trusted: construction sorts by start, trims text,
/// drops words with non-finite timing or empty text, and repairs
/// `end < start` to a zero-length word.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "TranscriptPayload")]
pub struct WordTimeline {
    words: Vec<Word>,
}

impl WordTimeline {
    pub fn new(words: Vec<Word>) -> Self {
        let received = words.len();
        let mut words: Vec<Word> = words
            .into_iter()
            .filter(|w| w.start.is_finite() && w.end.is_finite())
            .filter_map(|mut w| {
                let text = w.text.trim();
                if text.is_empty() {
                    return None;
                }
                w.text = text.to_string();
                if w.end < w.start {
                    w.end = w.start;
                }
                Some(w)
            })
            .collect();

        if words.len() != received {
            warn!("Dropped {} unusable words from transcript", received - words.len());
        }

        words.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.end.total_cmp(&b.end)));
        Self { words }
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load a transcript from a JSON file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ClipError::FileNotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path).await?;
        let timeline = Self::from_json_str(&content)?;
        debug!("Loaded {} words from {}", timeline.len(), path.display());
        Ok(timeline)
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Earliest-starting word whose `[start, end]` contains `t`
    pub fn word_containing(&self, t: f64) -> Option<&Word> {
        self.words.iter().find(|w| w.contains(t))
    }

    /// Latest-starting word whose `[start, end]` contains `t`
    pub fn last_word_containing(&self, t: f64) -> Option<&Word> {
        self.words.iter().rev().find(|w| w.contains(t))
    }

    /// First word starting strictly after `t`
    pub fn first_starting_after(&self, t: f64) -> Option<&Word> {
        self.words.iter().find(|w| w.start > t)
    }

    /// Word with the latest end strictly before `t`
    pub fn last_ending_before(&self, t: f64) -> Option<&Word> {
        self.words
            .iter()
            .filter(|w| w.end < t)
            .max_by(|a, b| a.end.total_cmp(&b.end))
    }
}
