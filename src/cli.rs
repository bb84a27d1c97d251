use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a rough window into a precise cut window
    Resolve {
        /// Transcript JSON with word timings
        #[arg(short, long)]
        words: PathBuf,

        /// Requested start in seconds
        #[arg(long)]
        start: f64,

        /// Requested end in seconds
        #[arg(long)]
        end: f64,

        /// Boundary strategy (word-snap, silence-snap, loose)
        #[arg(short, long)]
        strategy: Option<String>,

        /// Saved silencedetect output to snap against
        #[arg(long)]
        silence_log: Option<PathBuf>,
    },

    /// Synthesize caption cues for a resolved window
    Captions {
        /// Transcript JSON with word timings
        #[arg(short, long)]
        words: PathBuf,

        /// Cut window start in seconds
        #[arg(long)]
        start: f64,

        /// Cut window end in seconds
        #[arg(long)]
        end: f64,

        /// Caption format (plain, karaoke)
        #[arg(short, long)]
        format: Option<String>,

        /// Output caption file; printed to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the render plan and engine arguments for a job manifest
    Plan {
        /// Job manifest (JSON)
        #[arg(short, long)]
        job: PathBuf,

        /// Render style override (blur, crop)
        #[arg(long)]
        style: Option<String>,
    },

    /// Detect silence intervals in a media file
    Silence {
        /// Input media file
        #[arg(short, long)]
        input: PathBuf,

        /// Region start in seconds
        #[arg(long, default_value = "0")]
        start: f64,

        /// Region end in seconds
        #[arg(long)]
        end: f64,
    },

    /// Run the full pipeline for one job manifest
    Render {
        /// Job manifest (JSON)
        #[arg(short, long)]
        job: PathBuf,
    },

    /// Run every job manifest found in a directory
    Batch {
        /// Directory containing job manifests
        #[arg(short, long)]
        input_dir: PathBuf,
    },

    /// Check that the media engine is available
    Check,

    /// Write the default configuration to a file
    InitConfig {
        /// Output configuration file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}
