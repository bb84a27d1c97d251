//! clipsnap - word-accurate short clip cutting
//!
//! Turns a rough `[start, end]` request over spoken-word media into a precise
//! cut window, synthesizes word-timed captions for it, composes the ffmpeg
//! filter graph for a vertical render and drives the engine while reporting
//! throttled progress.

pub mod boundary;
pub mod captions;
pub mod cli;
pub mod config;
pub mod error;
pub mod media;
pub mod progress;
pub mod publish;
pub mod silence;
pub mod timeline;
pub mod workflow;
