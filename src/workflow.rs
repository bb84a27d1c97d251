use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::boundary::{BoundaryResolver, CutWindow, RequestWindow};
use crate::captions::{self, CaptionSynthesizer};
use crate::config::{BoundaryStrategy, CaptionFormat, Config, RenderStyle};
use crate::error::{ClipError, Result};
use crate::media::{MediaProcessorFactory, MediaProcessorTrait, RenderPlanBuilder, RenderRequest, WatermarkSource};
use crate::progress::{ProgressTracker, ProgressUpdate};
use crate::publish::{object_key, Publisher, PublisherFactory};
use crate::silence::SilenceMap;
use crate::timeline::WordTimeline;

/// One clip to cut, as read from a JSON manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderJob {
    /// Local path or http(s) URL of the source media
    pub source: String,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub words: WordTimeline,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<BoundaryStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<RenderStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption_format: Option<CaptionFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Uuid>,
}

impl RenderJob {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ClipError::FileNotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    fn is_remote(&self) -> bool {
        self.source.starts_with("http://") || self.source.starts_with("https://")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub execution_id: Uuid,
    pub url: String,
    pub window: CutWindow,
    pub cues: usize,
}

fn emit(updates: Option<&UnboundedSender<ProgressUpdate>>, update: Option<ProgressUpdate>) {
    if let (Some(sender), Some(update)) = (updates, update) {
        let _ = sender.send(update);
    }
}

pub struct Workflow {
    config: Config,
    media: Box<dyn MediaProcessorTrait>,
    publisher: Box<dyn Publisher>,
    resolver: BoundaryResolver,
    synthesizer: CaptionSynthesizer,
    planner: RenderPlanBuilder,
    client: reqwest::Client,
}

impl Workflow {
    pub fn new(config: Config) -> Result<Self> {
        let media = MediaProcessorFactory::create_processor(config.media.clone());

        // Check dependencies
        media.check_availability()?;

        let publisher = PublisherFactory::create(&config.publish)?;
        Ok(Self::with_components(config, media, publisher))
    }

    pub fn with_components(
        config: Config,
        media: Box<dyn MediaProcessorTrait>,
        publisher: Box<dyn Publisher>,
    ) -> Self {
        Self {
            resolver: BoundaryResolver::new(config.boundary.clone()),
            synthesizer: CaptionSynthesizer::new(&config.captions),
            planner: RenderPlanBuilder::new(config.render.clone(), &config.media.cache_dir),
            client: reqwest::Client::new(),
            config,
            media,
            publisher,
        }
    }

    /// Run one job end to end: fetch, resolve, caption, render, publish.
    ///
    /// Intermediate files live in a per-job temporary directory that is
    /// removed however the job ends.
    pub async fn process_job(
        &self,
        job: &RenderJob,
        updates: Option<UnboundedSender<ProgressUpdate>>,
    ) -> Result<JobOutcome> {
        let execution_id = job.execution_id.unwrap_or_else(Uuid::new_v4);
        info!("Starting job {} for {}", execution_id, job.source);

        let work_dir = tempfile::Builder::new()
            .prefix(&format!("clipsnap-{}-", execution_id))
            .tempdir()?;
        let mut tracker = ProgressTracker::from_config(&self.config.progress);

        let result = self
            .run_stages(job, execution_id, work_dir.path(), &mut tracker, updates.as_ref())
            .await;
        match &result {
            Ok(outcome) => info!("Job {} published to {}", execution_id, outcome.url),
            Err(e) => {
                tracker.fail();
                warn!("Job {} failed: {}", execution_id, e);
            }
        }
        result
    }

    async fn run_stages(
        &self,
        job: &RenderJob,
        execution_id: Uuid,
        work_dir: &Path,
        tracker: &mut ProgressTracker,
        updates: Option<&UnboundedSender<ProgressUpdate>>,
    ) -> Result<JobOutcome> {
        let request = RequestWindow::new(job.start, job.end)?;
        let strategy = job.strategy.unwrap_or(self.config.boundary.strategy);

        // Step 1: Source media
        emit(updates, tracker.begin_stage("download", 0.0)?);
        let source = self.fetch_source(job, work_dir, tracker, updates).await?;
        emit(updates, tracker.report_fraction(1.0));

        // Step 2: Boundaries
        let silence = match strategy {
            BoundaryStrategy::SilenceSnap => self.detect_silence(&source, request).await,
            _ => None,
        };
        let window = self.resolver.resolve(request, strategy, &job.words, silence.as_ref())?;

        // Step 3: Captions
        emit(updates, tracker.begin_stage("captions", 0.0)?);
        let track = self.synthesizer.synthesize(&job.words, &window);
        let captions_path = if track.is_empty() {
            debug!("No words inside the cut, skipping caption overlay");
            None
        } else {
            let format = job.caption_format.unwrap_or(self.config.captions.format);
            let path = work_dir.join(format!("captions.{}", captions::file_extension(format)));
            let resolution = (self.config.render.width, self.config.render.height);
            captions::write_track(&track, format, &self.config.captions.style, resolution, &path).await?;
            Some(path)
        };
        emit(updates, tracker.report_fraction(1.0));

        // Step 4: Plan and render
        let watermark = match &job.watermark {
            Some(path) => Some(WatermarkSource::inspect(path).await?),
            None => None,
        };
        let plan = self.planner.build(&RenderRequest {
            style: job.style.unwrap_or(self.config.render.style),
            window,
            captions: captions_path.as_deref(),
            title: job.title.as_deref(),
            watermark: watermark.as_ref(),
        });
        if let Some(prescale) = &plan.prescale {
            if fs::metadata(&prescale.target).await.is_err() {
                self.media.prescale_watermark(prescale).await?;
            }
        }

        emit(updates, tracker.begin_stage("transcode", window.duration())?);
        let output = work_dir.join("clip.mp4");
        self.media.render(&plan, &source, &output, tracker, updates.cloned()).await?;

        // Step 5: Publish
        emit(updates, tracker.begin_stage("publish", 0.0)?);
        let bytes = fs::read(&output).await?;
        let key = object_key(&execution_id, Utc::now());
        let url = self.publisher.publish(bytes, &self.config.publish.content_type, &key).await?;
        emit(updates, tracker.complete());

        Ok(JobOutcome { execution_id, url, window, cues: track.len() })
    }

    /// Missing silence evidence is not fatal; resolution falls back per boundary
    async fn detect_silence(&self, source: &Path, request: RequestWindow) -> Option<SilenceMap> {
        match self.media.detect_silence(source, request, &self.config.boundary).await {
            Ok(map) => Some(map),
            Err(e) => {
                warn!("Silence detection failed, snapping to words instead: {}", e);
                None
            }
        }
    }

    async fn fetch_source(
        &self,
        job: &RenderJob,
        work_dir: &Path,
        tracker: &mut ProgressTracker,
        updates: Option<&UnboundedSender<ProgressUpdate>>,
    ) -> Result<PathBuf> {
        if !job.is_remote() {
            let path = PathBuf::from(&job.source);
            if !path.exists() {
                return Err(ClipError::FileNotFound(path.display().to_string()));
            }
            return Ok(path);
        }

        let url = reqwest::Url::parse(&job.source)
            .map_err(|e| ClipError::InputIncomplete(format!("invalid source URL '{}': {}", job.source, e)))?;
        let extension = Path::new(url.path())
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "mp4".to_string());
        let target = work_dir.join(format!("source.{}", extension));
        info!("Downloading {} -> {}", job.source, target.display());

        let mut response = self.client.get(url).send().await?.error_for_status()?;
        let total_size = response.content_length().unwrap_or(0);
        let mut file = fs::File::create(&target).await?;
        let mut downloaded: u64 = 0;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            if total_size > 0 {
                emit(updates, tracker.report_fraction(downloaded as f64 / total_size as f64));
            }
        }
        file.flush().await?;

        info!("Downloaded {} bytes", downloaded);
        Ok(target)
    }

    /// Run every `*.json` manifest below `input_dir`, one task per job
    pub async fn process_directory<P: AsRef<Path>>(
        self: Arc<Self>,
        input_dir: P,
    ) -> Result<Vec<(PathBuf, Result<JobOutcome>)>> {
        let input_dir = input_dir.as_ref();
        info!("Processing directory: {}", input_dir.display());

        if !input_dir.is_dir() {
            return Err(ClipError::Config("Input path is not a directory".to_string()));
        }

        let manifests: Vec<PathBuf> = WalkDir::new(input_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")))
            .collect();

        info!("Found {} job manifests to process", manifests.len());

        let mut jobs = JoinSet::new();
        for manifest in manifests {
            let workflow = Arc::clone(&self);
            jobs.spawn(async move {
                let outcome = match RenderJob::load(&manifest).await {
                    Ok(job) => workflow.process_job(&job, None).await,
                    Err(e) => Err(e),
                };
                (manifest, outcome)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok((manifest, outcome)) => {
                    match &outcome {
                        Ok(done) => info!("Successfully processed: {} -> {}", manifest.display(), done.url),
                        Err(e) => warn!("Failed to process {}: {}", manifest.display(), e),
                    }
                    results.push((manifest, outcome));
                }
                Err(e) => warn!("Job task aborted: {}", e),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MockMediaProcessorTrait;
    use crate::publish::MockPublisher;
    use crate::timeline::Word;
    use tempfile::TempDir;

    fn job(source: &Path) -> RenderJob {
        RenderJob {
            source: source.to_string_lossy().to_string(),
            start: 10.0,
            end: 15.0,
            words: WordTimeline::new(vec![
                Word::new(9.5, 9.9, "so"),
                Word::new(10.2, 10.6, "three"),
                Word::new(10.7, 11.2, "habits"),
                Word::new(14.6, 15.2, "matter"),
            ]),
            strategy: Some(BoundaryStrategy::WordSnap),
            style: Some(RenderStyle::Crop),
            caption_format: None,
            title: Some("Three habits".to_string()),
            watermark: None,
            execution_id: Some(Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap()),
        }
    }

    fn source_file(temp: &TempDir) -> PathBuf {
        let path = temp.path().join("source.mp4");
        std::fs::write(&path, b"not really video").unwrap();
        path
    }

    fn rendering_media() -> MockMediaProcessorTrait {
        let mut media = MockMediaProcessorTrait::new();
        media.expect_render().times(1).returning(|plan, _, output, _, _| {
            assert!(plan.video_filter_graph.contains("subtitles=filename="));
            std::fs::write(output, b"rendered clip").unwrap();
            Ok(())
        });
        media
    }

    #[tokio::test]
    async fn test_job_runs_every_stage() {
        let temp = TempDir::new().unwrap();
        let source = source_file(&temp);

        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .withf(|bytes, content_type, key| {
                bytes.as_slice() == b"rendered clip"
                    && content_type == "video/mp4"
                    && key.starts_with("clips/")
                    && key.ends_with("/67e55044-10b1-426f-9247-bb680e5fe0c8.mp4")
            })
            .times(1)
            .returning(|_, _, key| Ok(format!("https://cdn.example.com/{}", key)));

        let workflow = Workflow::with_components(Config::default(), Box::new(rendering_media()), Box::new(publisher));
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
        let outcome = workflow.process_job(&job(&source), Some(sender)).await.unwrap();

        assert!(outcome.url.starts_with("https://cdn.example.com/clips/"));
        assert_eq!(outcome.cues, 2);
        assert!((outcome.window.cut_start - 10.1).abs() < 1e-9);

        let mut percents = Vec::new();
        while let Ok(update) = receiver.try_recv() {
            percents.push(update.percent);
        }
        assert_eq!(percents.first(), Some(&0.0));
        assert_eq!(percents.last(), Some(&100.0));
        assert!(percents.windows(2).all(|w| w[1] > w[0]));
    }

    #[tokio::test]
    async fn test_render_failure_skips_publish() {
        let temp = TempDir::new().unwrap();
        let source = source_file(&temp);

        let mut media = MockMediaProcessorTrait::new();
        media.expect_render().times(1).returning(|_, _, _, _, _| {
            Err(ClipError::Engine {
                description: "Clip render".to_string(),
                exit_code: Some(1),
                excerpt: "Error initializing complex filters.".to_string(),
            })
        });
        let mut publisher = MockPublisher::new();
        publisher.expect_publish().never();

        let workflow = Workflow::with_components(Config::default(), Box::new(media), Box::new(publisher));
        let result = workflow.process_job(&job(&source), None).await;

        assert!(matches!(result, Err(ClipError::Engine { exit_code: Some(1), .. })));
    }

    #[tokio::test]
    async fn test_silence_failure_falls_back_to_words() {
        let temp = TempDir::new().unwrap();
        let source = source_file(&temp);

        let mut media = rendering_media();
        media
            .expect_detect_silence()
            .times(1)
            .returning(|_, _, _| Err(ClipError::EngineTimeout("Silence detection".to_string(), 1)));
        let mut publisher = MockPublisher::new();
        publisher.expect_publish().returning(|_, _, key| Ok(key.to_string()));

        let workflow = Workflow::with_components(Config::default(), Box::new(media), Box::new(publisher));
        let silence_job = RenderJob { strategy: Some(BoundaryStrategy::SilenceSnap), ..job(&source) };
        let outcome = workflow.process_job(&silence_job, None).await.unwrap();

        assert!((outcome.window.cut_start - 10.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_degenerate_request_fails_before_engine() {
        let temp = TempDir::new().unwrap();
        let source = source_file(&temp);

        let mut media = MockMediaProcessorTrait::new();
        media.expect_render().never();
        let workflow = Workflow::with_components(Config::default(), Box::new(media), Box::new(MockPublisher::new()));

        let inverted = RenderJob { start: 5.0, end: 5.0, ..job(&source) };
        let result = workflow.process_job(&inverted, None).await;
        assert!(matches!(result, Err(ClipError::InputIncomplete(_))));

        let missing = job(&temp.path().join("absent.mp4"));
        let result = workflow.process_job(&missing, None).await;
        assert!(matches!(result, Err(ClipError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_same_named_watermarks_get_their_own_scaled_copy() {
        let temp = TempDir::new().unwrap();
        let source = source_file(&temp);
        let mut marks = Vec::new();
        for (brand, fill) in [("brand_a", 1u8), ("brand_b", 2u8)] {
            let dir = temp.path().join(brand);
            std::fs::create_dir_all(&dir).unwrap();
            let path = dir.join("logo.png");
            std::fs::write(&path, vec![fill; 600 * 1024]).unwrap();
            marks.push(path);
        }

        let targets = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut media = MockMediaProcessorTrait::new();
        let seen = Arc::clone(&targets);
        media.expect_prescale_watermark().times(2).returning(move |prescale| {
            std::fs::create_dir_all(prescale.target.parent().unwrap()).unwrap();
            std::fs::copy(&prescale.source, &prescale.target).unwrap();
            seen.lock().unwrap().push(prescale.target.clone());
            Ok(())
        });
        media.expect_render().times(3).returning(|plan, _, output, _, _| {
            assert!(plan.prescale.as_ref().is_some_and(|p| plan.auxiliary_inputs.iter().any(|i| i.path == p.target)));
            std::fs::write(output, b"clip").unwrap();
            Ok(())
        });
        let mut publisher = MockPublisher::new();
        publisher.expect_publish().returning(|_, _, key| Ok(key.to_string()));

        let mut config = Config::default();
        config.media.cache_dir = temp.path().join("cache").to_string_lossy().to_string();
        let workflow = Workflow::with_components(config, Box::new(media), Box::new(publisher));
        for mark in marks.iter().chain(marks.first()) {
            let branded = RenderJob { watermark: Some(mark.clone()), ..job(&source) };
            workflow.process_job(&branded, None).await.unwrap();
        }

        let targets = targets.lock().unwrap();
        assert_eq!(targets.len(), 2);
        assert_ne!(targets[0], targets[1]);
    }

    #[tokio::test]
    async fn test_job_manifest_defaults() {
        let temp = TempDir::new().unwrap();
        let manifest = temp.path().join("job.json");
        std::fs::write(
            &manifest,
            r#"{"source": "https://example.com/talk.mp4?sig=1", "start": 1.0, "end": 4.5,
                "words": [{"start": 1.1, "end": 1.4, "text": "hi"}], "style": "blur"}"#,
        )
        .unwrap();

        let job = RenderJob::load(&manifest).await.unwrap();
        assert!(job.is_remote());
        assert_eq!(job.words.len(), 1);
        assert_eq!(job.style, Some(RenderStyle::Blur));
        assert!(job.strategy.is_none() && job.execution_id.is_none());

        assert!(matches!(RenderJob::load(temp.path().join("none.json")).await, Err(ClipError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_directory_runs_each_manifest() {
        let temp = TempDir::new().unwrap();
        let source = source_file(&temp);
        let jobs_dir = temp.path().join("jobs");
        std::fs::create_dir_all(&jobs_dir).unwrap();
        for name in ["a", "b"] {
            let job = RenderJob { execution_id: None, ..job(&source) };
            std::fs::write(jobs_dir.join(format!("{}.json", name)), serde_json::to_string(&job).unwrap()).unwrap();
        }
        std::fs::write(jobs_dir.join("broken.json"), "{").unwrap();
        std::fs::write(jobs_dir.join("notes.txt"), "ignored").unwrap();

        let mut media = MockMediaProcessorTrait::new();
        media.expect_render().times(2).returning(|_, _, output, _, _| {
            std::fs::write(output, b"clip").unwrap();
            Ok(())
        });
        let mut publisher = MockPublisher::new();
        publisher.expect_publish().times(2).returning(|_, _, key| Ok(key.to_string()));

        let workflow = Arc::new(Workflow::with_components(Config::default(), Box::new(media), Box::new(publisher)));
        let results = workflow.process_directory(&jobs_dir).await.unwrap();

        assert_eq!(results.len(), 3);
        let failed: Vec<_> = results.iter().filter(|(_, r)| r.is_err()).map(|(p, _)| p.clone()).collect();
        assert_eq!(failed, vec![jobs_dir.join("broken.json")]);
    }
}
