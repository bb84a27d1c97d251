use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::boundary::CutWindow;
use crate::config::{Corner, RenderConfig, RenderStyle};
use crate::error::{ClipError, Result};

use super::escape::{escape_drawtext, escape_filter_path, wrap_title};

/// Fades shorter than this are left out of the audio graph
const MIN_FADE: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxiliaryKind {
    /// Opened by the subtitles filter, not passed as `-i`
    Captions,
    /// Extra `-i` input composited by the watermark stage
    Watermark,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuxiliaryInput {
    pub kind: AuxiliaryKind,
    pub path: PathBuf,
}

/// Watermark image as found on disk
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkSource {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Modification time in seconds since the Unix epoch
    pub modified_secs: u64,
}

impl WatermarkSource {
    /// Stat the image at `path`, keeping its canonical location
    pub async fn inspect(path: &Path) -> Result<Self> {
        let path = fs::canonicalize(path)
            .await
            .map_err(|_| ClipError::FileNotFound(path.display().to_string()))?;
        let metadata = fs::metadata(&path).await?;
        let modified_secs = metadata
            .modified()?
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Ok(Self { path, size_bytes: metadata.len(), modified_secs })
    }

    /// Identifies this exact image: another file or an edit changes it
    pub fn fingerprint(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.path.to_string_lossy().hash(&mut hasher);
        self.size_bytes.hash(&mut hasher);
        self.modified_secs.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

/// A scaled watermark copy the plan references and the caller must provide
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatermarkPrescale {
    pub source: PathBuf,
    pub target: PathBuf,
    pub width: u32,
}

impl WatermarkPrescale {
    /// Private sibling of `target` for one write; renamed into place when done
    pub fn staging_path(&self) -> PathBuf {
        let name = self
            .target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "watermark.png".to_string());
        self.target.with_file_name(format!(".{}-{}", Uuid::new_v4().simple(), name))
    }
}

/// Everything one render needs besides the source file
#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    pub style: RenderStyle,
    pub window: CutWindow,
    pub captions: Option<&'a Path>,
    pub title: Option<&'a str>,
    pub watermark: Option<&'a WatermarkSource>,
}

/// Engine-ready description of one render
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderPlan {
    pub video_filter_graph: String,
    pub audio_filter_graph: String,
    pub auxiliary_inputs: Vec<AuxiliaryInput>,
    /// Pad label of the final video stream in the graph
    pub output_label: String,
    pub prescale: Option<WatermarkPrescale>,
    pub window: CutWindow,
    pub encoding_options: Vec<String>,
}

impl RenderPlan {
    /// Full engine argument list for extracting `window` from `source`
    pub fn ffmpeg_args(&self, source: &Path, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-ss".to_string(),
            format!("{:.3}", self.window.cut_start),
            "-t".to_string(),
            format!("{:.3}", self.window.duration()),
            "-i".to_string(),
            source.to_string_lossy().to_string(),
        ];
        for input in self.auxiliary_inputs.iter().filter(|i| i.kind == AuxiliaryKind::Watermark) {
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }
        args.extend([
            "-filter_complex".to_string(),
            self.video_filter_graph.clone(),
            "-map".to_string(),
            format!("[{}]", self.output_label),
            "-map".to_string(),
            "0:a:0?".to_string(),
            "-af".to_string(),
            self.audio_filter_graph.clone(),
        ]);
        args.extend(self.encoding_options.iter().cloned());
        args.push(output.to_string_lossy().to_string());
        args
    }
}

/// Labels graph statements so every stage reads the previous stage's output
struct GraphChain {
    statements: Vec<String>,
    current: String,
    counter: usize,
}

impl GraphChain {
    fn new() -> Self {
        Self { statements: Vec::new(), current: "0:v".to_string(), counter: 0 }
    }

    fn label(&mut self, stem: &str) -> String {
        self.counter += 1;
        format!("{}{}", stem, self.counter)
    }

    /// Append `[current]filters[next]` and advance
    fn push(&mut self, stem: &str, filters: &str) {
        let next = self.label(stem);
        self.statements.push(format!("[{}]{}[{}]", self.current, filters, next));
        self.current = next;
    }

    fn push_raw(&mut self, statement: String, output: String) {
        self.statements.push(statement);
        self.current = output;
    }

    fn finish(self) -> (String, String) {
        (self.statements.join(";"), self.current)
    }
}

pub struct RenderPlanBuilder {
    config: RenderConfig,
    cache_dir: PathBuf,
}

impl RenderPlanBuilder {
    pub fn new(config: RenderConfig, cache_dir: impl Into<PathBuf>) -> Self {
        Self { config, cache_dir: cache_dir.into() }
    }

    /// Compose the render plan.
    ///
    /// Stage order is fixed: spatial transform, captions, title, watermark.
    pub fn build(&self, request: &RenderRequest<'_>) -> RenderPlan {
        let mut chain = GraphChain::new();
        let mut auxiliary_inputs = Vec::new();
        let mut prescale = None;

        match request.style {
            RenderStyle::Crop => self.crop_stage(&mut chain),
            RenderStyle::Blur => self.blur_stage(&mut chain),
        }

        if let Some(captions) = request.captions {
            chain.push("cap", &format!("subtitles=filename='{}'", escape_filter_path(captions)));
            auxiliary_inputs.push(AuxiliaryInput { kind: AuxiliaryKind::Captions, path: captions.to_path_buf() });
        }

        if let Some(title) = request.title {
            let lines = wrap_title(title, self.config.title_max_chars);
            if !lines.is_empty() {
                chain.push("title", &self.title_filter(&lines));
            }
        }

        if let Some(watermark) = request.watermark {
            let (input_path, scale) = if watermark.size_bytes > self.config.watermark_prescale_bytes {
                let target = self.prescaled_path(watermark);
                prescale = Some(WatermarkPrescale {
                    source: watermark.path.clone(),
                    target: target.clone(),
                    width: self.config.watermark_width,
                });
                (target, String::new())
            } else {
                (watermark.path.clone(), format!("scale={}:-1,", self.config.watermark_width))
            };
            auxiliary_inputs.push(AuxiliaryInput { kind: AuxiliaryKind::Watermark, path: input_path });

            // Source is input 0; watermark inputs follow in auxiliary order
            let input_index = auxiliary_inputs.iter().filter(|i| i.kind == AuxiliaryKind::Watermark).count();
            let mark = chain.label("wm");
            let merged = chain.label("marked");
            chain.push_raw(
                format!(
                    "[{input_index}:v]{scale}format=rgba,colorchannelmixer=aa={opacity:.2}[{mark}];[{base}][{mark}]overlay={position}[{merged}]",
                    opacity = self.config.watermark_opacity,
                    base = chain.current,
                    position = self.watermark_position(),
                ),
                merged,
            );
        }

        let (video_filter_graph, output_label) = chain.finish();
        let audio_filter_graph = self.audio_graph(&request.window);
        debug!("Video filter graph: {}", video_filter_graph);
        debug!("Audio filter graph: {}", audio_filter_graph);

        RenderPlan {
            video_filter_graph,
            audio_filter_graph,
            auxiliary_inputs,
            output_label,
            prescale,
            window: request.window,
            encoding_options: self.config.encoding_options.clone(),
        }
    }

    /// Fill the frame by height, then center-crop the width
    fn crop_stage(&self, chain: &mut GraphChain) {
        let (w, h) = (self.config.width, self.config.height);
        chain.push(
            "base",
            &format!("scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1"),
        );
    }

    /// Fitted foreground over a blurred, darkened fill of the same source
    fn blur_stage(&self, chain: &mut GraphChain) {
        let (w, h) = (self.config.width, self.config.height);
        let background_src = chain.label("bgsrc");
        let foreground_src = chain.label("fgsrc");
        let background = chain.label("bg");
        let foreground = chain.label("fg");
        let base = chain.label("base");
        let statement = [
            format!("[{}]split=2[{background_src}][{foreground_src}]", chain.current),
            format!(
                "[{background_src}]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},boxblur={radius}:5,eq=brightness={brightness:.2}[{background}]",
                radius = self.config.blur_radius,
                brightness = self.config.background_brightness,
            ),
            format!("[{foreground_src}]scale={w}:-2[{foreground}]"),
            format!("[{background}][{foreground}]overlay=(W-w)/2:(H-h)/2,setsar=1[{base}]"),
        ]
        .join(";");
        chain.push_raw(statement, base);
    }

    fn title_filter(&self, lines: &[String]) -> String {
        let mut filter = format!(
            "drawtext=text='{}':fontsize={}:fontcolor=white:borderw=4:bordercolor=black:line_spacing=12:x=(w-text_w)/2:y={}",
            escape_drawtext(&lines.join("\n")),
            self.config.title_font_size,
            self.config.title_top_offset,
        );
        if let Some(font_file) = &self.config.title_font_file {
            filter.push_str(&format!(":fontfile='{}'", escape_filter_path(Path::new(font_file))));
        }
        filter
    }

    fn watermark_position(&self) -> String {
        let m = self.config.watermark_margin;
        match self.config.watermark_corner {
            Corner::TopLeft => format!("{m}:{m}"),
            Corner::TopRight => format!("W-w-{m}:{m}"),
            Corner::BottomLeft => format!("{m}:H-h-{m}"),
            Corner::BottomRight => format!("W-w-{m}:H-h-{m}"),
        }
    }

    /// Cached pre-scaled copy location, keyed by image fingerprint and width
    pub fn prescaled_path(&self, source: &WatermarkSource) -> PathBuf {
        let stem = source
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "watermark".to_string());
        self.cache_dir
            .join(format!("{}_{}_{}w.png", stem, source.fingerprint(), self.config.watermark_width))
    }

    /// Fade in over the lead-in pad and out over the tail pad.
    ///
    /// The fade-out ends exactly at `duration - audio_pad_end`; both fades are
    /// capped by the margin the resolver actually left, so neither reaches
    /// into word audio.
    fn audio_graph(&self, window: &CutWindow) -> String {
        let duration = window.duration();
        let fade_in = self.config.fade_in.min(window.lead_in).max(0.0);
        let audio_pad_end = self.config.audio_pad_end.min(window.tail).max(0.0);
        let fade_out = self.config.fade_out.min(window.tail - audio_pad_end).max(0.0);
        let fade_out_end = duration - audio_pad_end;

        let mut filters = Vec::new();
        if fade_in >= MIN_FADE {
            filters.push(format!("afade=t=in:st=0:d={:.3}", fade_in));
        }
        if fade_out >= MIN_FADE {
            filters.push(format!("afade=t=out:st={:.3}:d={:.3}", fade_out_end - fade_out, fade_out));
        }
        if filters.is_empty() {
            "anull".to_string()
        } else {
            filters.join(",")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> CutWindow {
        CutWindow { cut_start: 10.2, cut_end: 15.35, lead_in: 0.1, tail: 0.15 }
    }

    fn builder() -> RenderPlanBuilder {
        RenderPlanBuilder::new(RenderConfig::default(), "/cache")
    }

    fn mark(path: &str, size_bytes: u64) -> WatermarkSource {
        WatermarkSource { path: PathBuf::from(path), size_bytes, modified_secs: 1_700_000_000 }
    }

    fn request<'a>(style: RenderStyle) -> RenderRequest<'a> {
        RenderRequest { style, window: window(), captions: None, title: None, watermark: None }
    }

    #[test]
    fn test_crop_is_single_chain() {
        let plan = builder().build(&request(RenderStyle::Crop));

        assert_eq!(
            plan.video_filter_graph,
            "[0:v]scale=1080:1920:force_original_aspect_ratio=increase,crop=1080:1920,setsar=1[base1]"
        );
        assert_eq!(plan.output_label, "base1");
        assert!(plan.auxiliary_inputs.is_empty());
    }

    #[test]
    fn test_blur_splits_and_merges() {
        let plan = builder().build(&request(RenderStyle::Blur));
        let graph = &plan.video_filter_graph;

        assert!(graph.starts_with("[0:v]split=2[bgsrc1][fgsrc2];"));
        assert!(graph.contains("boxblur=20:5,eq=brightness=-0.15[bg3]"));
        assert!(graph.contains("[fgsrc2]scale=1080:-2[fg4]"));
        assert!(graph.ends_with("[bg3][fg4]overlay=(W-w)/2:(H-h)/2,setsar=1[base5]"));
        assert_eq!(plan.output_label, "base5");
    }

    #[test]
    fn test_stage_order_and_escaping() {
        let captions = PathBuf::from("/tmp/job:1/captions.ass");
        let logo = mark("/assets/logo.png", 10_000);
        let plan = builder().build(&RenderRequest {
            style: RenderStyle::Crop,
            window: window(),
            captions: Some(&captions),
            title: Some("Don't miss: 100% real"),
            watermark: Some(&logo),
        });
        let graph = &plan.video_filter_graph;

        let spatial = graph.find("crop=").unwrap();
        let subtitles = graph.find("subtitles=").unwrap();
        let title = graph.find("drawtext=").unwrap();
        let overlay = graph.find("colorchannelmixer").unwrap();
        assert!(spatial < subtitles && subtitles < title && title < overlay);

        assert!(graph.contains("[base1]subtitles=filename='/tmp/job\\:1/captions.ass'[cap2]"));
        assert!(graph.contains("[cap2]drawtext=text='Don'\\''t miss\\: 100%% real':"));
        assert!(graph.contains("[1:v]scale=220:-1,format=rgba,colorchannelmixer=aa=0.60[wm4];[title3][wm4]overlay=W-w-40:40[marked5]"));
        assert_eq!(plan.output_label, "marked5");
        assert_eq!(
            plan.auxiliary_inputs,
            vec![
                AuxiliaryInput { kind: AuxiliaryKind::Captions, path: captions.clone() },
                AuxiliaryInput { kind: AuxiliaryKind::Watermark, path: PathBuf::from("/assets/logo.png") },
            ]
        );
        assert!(plan.prescale.is_none());
    }

    #[test]
    fn test_large_watermark_uses_prescaled_copy() {
        let large = mark("/assets/logo.png", 4 * 1024 * 1024);
        let plan = builder().build(&RenderRequest { watermark: Some(&large), ..request(RenderStyle::Crop) });

        let prescale = plan.prescale.clone().unwrap();
        assert_eq!(prescale.source, PathBuf::from("/assets/logo.png"));
        assert_eq!(
            prescale.target,
            PathBuf::from(format!("/cache/logo_{}_220w.png", large.fingerprint()))
        );
        assert_eq!(plan.auxiliary_inputs[0].path, prescale.target);
        assert!(plan.video_filter_graph.contains("[1:v]format=rgba"));
    }

    #[test]
    fn test_prescaled_copies_are_distinct_per_image() {
        let planner = builder();
        let brand_a = mark("/brand_a/logo.png", 4 * 1024 * 1024);
        let brand_b = mark("/brand_b/logo.png", 4 * 1024 * 1024);
        let edited = WatermarkSource { modified_secs: brand_a.modified_secs + 60, ..brand_a.clone() };

        let target_a = planner.prescaled_path(&brand_a);
        assert_ne!(target_a, planner.prescaled_path(&brand_b));
        assert_ne!(target_a, planner.prescaled_path(&edited));
        assert_eq!(target_a, planner.prescaled_path(&brand_a.clone()));
    }

    #[test]
    fn test_staging_paths_are_private_siblings() {
        let prescale = WatermarkPrescale {
            source: PathBuf::from("/assets/logo.png"),
            target: PathBuf::from("/cache/logo_00ff_220w.png"),
            width: 220,
        };
        let first = prescale.staging_path();
        let second = prescale.staging_path();

        assert_ne!(first, second);
        assert_eq!(first.parent(), Some(Path::new("/cache")));
        assert!(first.to_string_lossy().ends_with("-logo_00ff_220w.png"));
    }

    #[tokio::test]
    async fn test_inspect_reads_size_and_mtime() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("logo.png");
        std::fs::write(&path, [0u8; 64]).unwrap();

        let source = WatermarkSource::inspect(&path).await.unwrap();
        assert_eq!(source.size_bytes, 64);
        assert!(source.modified_secs > 0);
        assert!(source.path.is_absolute());

        let missing = WatermarkSource::inspect(&temp.path().join("absent.png")).await;
        assert!(matches!(missing, Err(ClipError::FileNotFound(_))));
    }

    #[test]
    fn test_title_wraps_without_splitting_words() {
        let plan = builder().build(&RenderRequest {
            title: Some("Three simple habits that changed everything"),
            ..request(RenderStyle::Crop)
        });
        assert!(plan.video_filter_graph.contains("text='Three simple habits that\nchanged everything'"));
    }

    #[test]
    fn test_audio_fades_fit_inside_pads() {
        let plan = builder().build(&request(RenderStyle::Crop));
        assert_eq!(plan.audio_filter_graph, "afade=t=in:st=0:d=0.050,afade=t=out:st=5.050:d=0.100");

        let tight = CutWindow { cut_start: 0.0, cut_end: 4.0, lead_in: 0.0, tail: 0.04 };
        let plan = builder().build(&RenderRequest { window: tight, ..request(RenderStyle::Crop) });
        assert_eq!(plan.audio_filter_graph, "afade=t=out:st=3.960:d=0.040");

        let none = CutWindow { cut_start: 0.0, cut_end: 4.0, lead_in: 0.0, tail: 0.0 };
        let plan = builder().build(&RenderRequest { window: none, ..request(RenderStyle::Crop) });
        assert_eq!(plan.audio_filter_graph, "anull");
    }

    #[test]
    fn test_ffmpeg_args() {
        let logo = mark("/assets/logo.png", 1);
        let plan = builder().build(&RenderRequest { watermark: Some(&logo), ..request(RenderStyle::Crop) });
        let args = plan.ffmpeg_args(Path::new("/in/source.mp4"), Path::new("/out/clip.mp4"));

        assert_eq!(&args[..9], &["-y", "-ss", "10.200", "-t", "5.150", "-i", "/in/source.mp4", "-i", "/assets/logo.png"]);
        let map = args.iter().position(|a| a == "-map").unwrap();
        assert_eq!(args[map + 1], "[marked3]");
        assert_eq!(args[map + 3], "0:a:0?");
        assert_eq!(args.last().unwrap(), "/out/clip.mp4");
    }
}
