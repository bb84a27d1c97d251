//! clipsnap - word-accurate short clip cutting
//!
//! Entry point for the clipsnap command line: boundary resolution, caption
//! synthesis and render planning as standalone commands, plus the full
//! download → captions → transcode → publish pipeline over ffmpeg.

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use clipsnap::boundary::{BoundaryResolver, CutWindow, RequestWindow};
use clipsnap::captions::{self, CaptionSynthesizer};
use clipsnap::cli::{Args, Commands};
use clipsnap::config::{parse_boundary_strategy, parse_caption_format, parse_render_style, BoundaryConfig, Config};
use clipsnap::media::{MediaProcessorFactory, RenderPlanBuilder, RenderRequest, WatermarkSource};
use clipsnap::progress::ProgressUpdate;
use clipsnap::silence::SilenceMap;
use clipsnap::timeline::WordTimeline;
use clipsnap::workflow::{RenderJob, Workflow};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging to both console and file
    setup_logging(args.verbose)?;

    // Load configuration
    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            // Try to load config.toml from current directory first
            if Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    // Execute command
    match args.command {
        Commands::Resolve { words, start, end, strategy, silence_log } => {
            let timeline = WordTimeline::load(&words).await?;
            let strategy = match strategy {
                Some(value) => parse_boundary_strategy(&value)?,
                None => config.boundary.strategy,
            };
            let silence = match silence_log {
                Some(path) => {
                    let diagnostics = tokio::fs::read_to_string(&path).await?;
                    Some(SilenceMap::parse(&diagnostics, config.boundary.silence_min_duration))
                }
                None => None,
            };

            let resolver = BoundaryResolver::new(config.boundary.clone());
            let window = resolver.resolve(RequestWindow::new(start, end)?, strategy, &timeline, silence.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&window)?);
        }
        Commands::Captions { words, start, end, format, output } => {
            let timeline = WordTimeline::load(&words).await?;
            let format = match format {
                Some(value) => parse_caption_format(&value)?,
                None => config.captions.format,
            };
            let window = CutWindow { cut_start: start, cut_end: end, lead_in: 0.0, tail: 0.0 };
            window.validate(config.boundary.min_clip_duration)?;

            let track = CaptionSynthesizer::new(&config.captions).synthesize(&timeline, &window);
            let resolution = (config.render.width, config.render.height);
            match output {
                Some(path) => {
                    captions::write_track(&track, format, &config.captions.style, resolution, &path).await?;
                    info!("Wrote {} cues to {}", track.len(), path.display());
                }
                None => print!("{}", track.render(format, &config.captions.style, resolution)),
            }
        }
        Commands::Plan { job, style } => {
            let job = RenderJob::load(&job).await?;
            print_plan(&config, &job, style.as_deref()).await?;
        }
        Commands::Silence { input, start, end } => {
            let media = MediaProcessorFactory::create_processor(config.media.clone());
            media.check_availability()?;

            // Scan exactly the requested region
            let boundary = BoundaryConfig { silence_search_radius: 0.0, ..config.boundary.clone() };
            let map = media.detect_silence(&input, RequestWindow::new(start, end)?, &boundary).await?;
            println!("{}", serde_json::to_string_pretty(map.intervals())?);
        }
        Commands::Render { job } => {
            let job = RenderJob::load(&job).await?;
            let workflow = Workflow::new(config)?;

            let (sender, display) = spawn_progress_display();
            let outcome = workflow.process_job(&job, Some(sender)).await;
            let _ = display.await;

            let outcome = outcome?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Batch { input_dir } => {
            let workflow = Arc::new(Workflow::new(config)?);
            let results = workflow.process_directory(&input_dir).await?;

            let failed = results.iter().filter(|(_, outcome)| outcome.is_err()).count();
            println!("\nBatch results:");
            println!("{:<50} {:<10} {}", "Manifest", "Status", "Detail");
            println!("{}", "-".repeat(100));
            for (manifest, outcome) in &results {
                let (status, detail) = match outcome {
                    Ok(done) => ("ok", done.url.clone()),
                    Err(e) => ("failed", e.to_string()),
                };
                println!("{:<50} {:<10} {}", manifest.display(), status, detail);
            }
            if failed > 0 {
                anyhow::bail!("{} of {} jobs failed", failed, results.len());
            }
        }
        Commands::Check => {
            let media = MediaProcessorFactory::create_processor(config.media.clone());
            media.check_availability()?;
            let version = media.get_version_info().await?;
            println!("Media engine: {}", version);
            println!("Binary: {}", config.media.binary_path);
        }
        Commands::InitConfig { output } => {
            if output.exists() {
                warn!("Overwriting existing configuration at {}", output.display());
            }
            Config::default().save_to_file(&output)?;
            println!("Wrote default configuration to {}", output.display());
        }
    }

    Ok(())
}

/// Resolve a job without running the engine and print what would be rendered
async fn print_plan(config: &Config, job: &RenderJob, style: Option<&str>) -> Result<()> {
    let strategy = job.strategy.unwrap_or(config.boundary.strategy);
    let request = RequestWindow::new(job.start, job.end)?;
    let window = BoundaryResolver::new(config.boundary.clone()).resolve(request, strategy, &job.words, None)?;

    let track = CaptionSynthesizer::new(&config.captions).synthesize(&job.words, &window);
    let format = job.caption_format.unwrap_or(config.captions.format);
    let captions_path = format!("captions.{}", captions::file_extension(format));

    let watermark = match &job.watermark {
        Some(path) => Some(WatermarkSource::inspect(path).await?),
        None => None,
    };
    let style = match style {
        Some(value) => parse_render_style(value)?,
        None => job.style.unwrap_or(config.render.style),
    };

    let planner = RenderPlanBuilder::new(config.render.clone(), &config.media.cache_dir);
    let plan = planner.build(&RenderRequest {
        style,
        window,
        captions: (!track.is_empty()).then_some(Path::new(&captions_path)),
        title: job.title.as_deref(),
        watermark: watermark.as_ref(),
    });

    println!("{}", serde_json::to_string_pretty(&plan)?);
    let args = plan.ffmpeg_args(Path::new(&job.source), Path::new("clip.mp4"));
    println!("\n{} {}", config.media.binary_path, args.join(" "));
    Ok(())
}

/// Draw pipeline progress from the updates a job sends
fn spawn_progress_display() -> (mpsc::UnboundedSender<ProgressUpdate>, JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::unbounded_channel::<ProgressUpdate>();
    let handle = tokio::spawn(async move {
        let pb = ProgressBar::new(100);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        pb.set_style(style);

        while let Some(update) = receiver.recv().await {
            pb.set_message(update.stage);
            pb.set_position(update.percent.round() as u64);
        }
        pb.finish_and_clear();
    });
    (sender, handle)
}

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = std::env::current_dir()?.join(".clipsnap").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "clipsnap.log");
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Console output goes to stderr so JSON on stdout stays clean
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}", log_level, log_dir.join("clipsnap.log").display());

    Ok(())
}
