use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::error::{Result, ClipError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub boundary: BoundaryConfig,
    pub captions: CaptionConfig,
    pub render: RenderConfig,
    pub progress: ProgressConfig,
    pub media: MediaConfig,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Strategy used when a job does not name one
    pub strategy: BoundaryStrategy,
    /// Whether a word already under way at the requested start is kept in the clip
    pub partial_start_word: PartialWordPolicy,
    /// Seconds added before the snapped start (word snap)
    pub word_pad_start: f64,
    /// Seconds added after the snapped end (word snap)
    pub word_pad_end: f64,
    /// Maximum distance (seconds) between a request boundary and a usable silence
    pub silence_search_radius: f64,
    /// Seconds of silence kept between the cut and the speech it protects
    pub silence_buffer: f64,
    /// Shortest silence (seconds) accepted as evidence
    pub silence_min_duration: f64,
    /// Noise floor for silence detection, in dB
    pub silence_noise_db: f64,
    /// Seconds added before the raw start (loose cut)
    pub loose_pad_start: f64,
    /// Seconds added after the raw end (loose cut)
    pub loose_pad_end: f64,
    /// Shortest window accepted downstream
    pub min_clip_duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryStrategy {
    /// Snap to word boundaries from the transcript, then apply a small pad
    WordSnap,
    /// Snap into detected silence around each boundary
    SilenceSnap,
    /// No evidence: widen the raw window by fixed pads
    Loose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialWordPolicy {
    /// Start at the onset of the word containing the requested start
    Keep,
    /// Drop that word and start at the onset of the next one
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    /// Serialization used when a job does not name one
    pub format: CaptionFormat,
    /// Character budget of one cue, separating spaces included
    pub max_chars: usize,
    /// Gap between words (seconds) that always starts a new cue
    pub pause_threshold: f64,
    pub style: CaptionStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionFormat {
    /// Numbered SRT blocks
    Plain,
    /// ASS dialogue lines with per-word \k reveal tags
    Karaoke,
}

/// Look of the karaoke track. Colors are `RRGGBB` hex.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionStyle {
    pub font_name: String,
    pub font_size: u32,
    pub primary_color: String,
    pub highlight_color: String,
    pub outline_color: String,
    pub outline_width: f64,
    pub bold: bool,
    /// Distance from the bottom edge in pixels
    pub margin_v: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Spatial transform used when a job does not name one
    pub style: RenderStyle,
    pub width: u32,
    pub height: u32,
    /// boxblur luma radius of the blurred background
    pub blur_radius: u32,
    /// eq brightness of the blurred background (negative darkens)
    pub background_brightness: f64,
    /// Characters per title line
    pub title_max_chars: usize,
    pub title_font_size: u32,
    /// Optional font file for the title; ffmpeg's default font otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_font_file: Option<String>,
    /// Title distance from the top edge in pixels
    pub title_top_offset: u32,
    pub watermark_corner: Corner,
    pub watermark_margin: u32,
    /// Width the watermark is scaled to, in pixels
    pub watermark_width: u32,
    pub watermark_opacity: f64,
    /// Watermark files larger than this are pre-scaled once and cached
    pub watermark_prescale_bytes: u64,
    /// Audio fade-in length in seconds, capped by the applied lead-in pad
    pub fade_in: f64,
    /// Audio fade-out length in seconds, capped by the applied tail pad
    pub fade_out: f64,
    /// Seconds of audio kept after the fade-out completes
    pub audio_pad_end: f64,
    /// Encoder options appended after the filter graph
    /// Common options: ["-c:v", "libx264", "-preset", "veryfast", "-crf", "20"]
    pub encoding_options: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStyle {
    /// Blurred, darkened fill behind the fitted source
    Blur,
    /// Height-matched source, center-cropped to the target width
    Crop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Minimum gain in global percentage points between two reports
    pub threshold: f64,
    pub stages: Vec<StageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Wall-clock budget of one ffmpeg invocation, in seconds
    pub engine_timeout_secs: u64,
    /// Non-empty stderr lines surfaced when ffmpeg fails
    pub error_tail_lines: usize,
    /// Directory holding pre-scaled watermark copies
    pub cache_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub target: PublishTarget,
    /// Destination directory for the directory publisher
    pub directory: String,
    /// Upload endpoint for the HTTP publisher; objects are PUT to `<base_url>/<key>`
    pub base_url: String,
    /// Public prefix of published objects; `base_url` when empty
    pub public_base_url: String,
    pub content_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishTarget {
    Directory,
    Http,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            strategy: BoundaryStrategy::WordSnap,
            partial_start_word: PartialWordPolicy::Keep,
            word_pad_start: 0.10,
            word_pad_end: 0.15,
            silence_search_radius: 2.0,
            silence_buffer: 0.10,
            silence_min_duration: 0.25,
            silence_noise_db: -35.0,
            loose_pad_start: 0.25,
            loose_pad_end: 0.40,
            min_clip_duration: 0.10,
        }
    }
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            format: CaptionFormat::Karaoke,
            max_chars: 22,
            pause_threshold: 0.5,
            style: CaptionStyle::default(),
        }
    }
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_name: "Arial".to_string(),
            font_size: 72,
            primary_color: "FFFFFF".to_string(),
            highlight_color: "FFD400".to_string(),
            outline_color: "000000".to_string(),
            outline_width: 4.0,
            bold: true,
            margin_v: 420,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            style: RenderStyle::Blur,
            width: 1080,
            height: 1920,
            blur_radius: 20,
            background_brightness: -0.15,
            title_max_chars: 24,
            title_font_size: 64,
            title_font_file: None,
            title_top_offset: 180,
            watermark_corner: Corner::TopRight,
            watermark_margin: 40,
            watermark_width: 220,
            watermark_opacity: 0.6,
            watermark_prescale_bytes: 512 * 1024,
            fade_in: 0.05,
            fade_out: 0.10,
            audio_pad_end: 0.0,
            encoding_options: vec![
                "-c:v".to_string(), "libx264".to_string(),
                "-preset".to_string(), "veryfast".to_string(),
                "-crf".to_string(), "20".to_string(),
                "-pix_fmt".to_string(), "yuv420p".to_string(),
                "-c:a".to_string(), "aac".to_string(),
                "-b:a".to_string(), "160k".to_string(),
                "-movflags".to_string(), "+faststart".to_string(),
            ],
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            threshold: 5.0,
            stages: vec![
                StageConfig { name: "download".to_string(), low: 0.0, high: 40.0 },
                StageConfig { name: "captions".to_string(), low: 40.0, high: 55.0 },
                StageConfig { name: "transcode".to_string(), low: 55.0, high: 95.0 },
                StageConfig { name: "publish".to_string(), low: 95.0, high: 100.0 },
            ],
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            engine_timeout_secs: 600,
            error_tail_lines: 6,
            cache_dir: ".clipsnap/cache".to_string(),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            target: PublishTarget::Directory,
            directory: "output".to_string(),
            base_url: String::new(),
            public_base_url: String::new(),
            content_type: "video/mp4".to_string(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClipError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ClipError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ClipError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ClipError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Reject tunables no component can work with
    pub fn validate(&self) -> Result<()> {
        let b = &self.boundary;
        let pads = [
            ("word_pad_start", b.word_pad_start),
            ("word_pad_end", b.word_pad_end),
            ("silence_buffer", b.silence_buffer),
            ("silence_search_radius", b.silence_search_radius),
            ("loose_pad_start", b.loose_pad_start),
            ("loose_pad_end", b.loose_pad_end),
            ("fade_in", self.render.fade_in),
            ("fade_out", self.render.fade_out),
            ("audio_pad_end", self.render.audio_pad_end),
        ];
        for (name, value) in pads {
            if !value.is_finite() || value < 0.0 {
                return Err(ClipError::Config(format!("{} must be a non-negative number, got {}", name, value)));
            }
        }
        if self.captions.max_chars == 0 {
            return Err(ClipError::Config("captions.max_chars must be at least 1".to_string()));
        }
        if self.render.width == 0 || self.render.height == 0 {
            return Err(ClipError::Config("render target resolution must be non-zero".to_string()));
        }
        if !(0.0..=1.0).contains(&self.render.watermark_opacity) {
            return Err(ClipError::Config("render.watermark_opacity must be within 0..=1".to_string()));
        }
        if self.progress.threshold <= 0.0 {
            return Err(ClipError::Config("progress.threshold must be positive".to_string()));
        }
        for stage in &self.progress.stages {
            if !(0.0..=100.0).contains(&stage.low) || !(0.0..=100.0).contains(&stage.high) || stage.low > stage.high {
                return Err(ClipError::Config(format!(
                    "progress stage '{}' has an invalid range {}..{}",
                    stage.name, stage.low, stage.high
                )));
            }
        }
        Ok(())
    }
}

pub fn parse_boundary_strategy(value: &str) -> Result<BoundaryStrategy> {
    match value.to_lowercase().replace('-', "_").as_str() {
        "word_snap" | "word" => Ok(BoundaryStrategy::WordSnap),
        "silence_snap" | "silence" => Ok(BoundaryStrategy::SilenceSnap),
        "loose" => Ok(BoundaryStrategy::Loose),
        _ => Err(ClipError::Config(format!(
            "Invalid boundary strategy '{}'. Valid strategies: word-snap, silence-snap, loose",
            value
        ))),
    }
}

pub fn parse_render_style(value: &str) -> Result<RenderStyle> {
    match value.to_lowercase().as_str() {
        "blur" => Ok(RenderStyle::Blur),
        "crop" => Ok(RenderStyle::Crop),
        _ => Err(ClipError::Config(format!(
            "Invalid render style '{}'. Valid styles: blur, crop",
            value
        ))),
    }
}

pub fn parse_caption_format(value: &str) -> Result<CaptionFormat> {
    match value.to_lowercase().as_str() {
        "plain" | "srt" => Ok(CaptionFormat::Plain),
        "karaoke" | "ass" => Ok(CaptionFormat::Karaoke),
        _ => Err(ClipError::Config(format!(
            "Invalid caption format '{}'. Valid formats: plain, karaoke",
            value
        ))),
    }
}
