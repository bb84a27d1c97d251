use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClipError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Insufficient input: {0}")]
    InputIncomplete(String),

    #[error("Degenerate cut window: start {cut_start:.3}s, end {cut_end:.3}s")]
    BoundaryDegenerate { cut_start: f64, cut_end: f64 },

    #[error("{description} failed (exit code {exit_code:?}): {excerpt}")]
    Engine {
        description: String,
        exit_code: Option<i32>,
        excerpt: String,
    },

    #[error("{0} exceeded its time budget of {1}s")]
    EngineTimeout(String, u64),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

pub type Result<T> = std::result::Result<T, ClipError>;
