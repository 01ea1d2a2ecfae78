use std::path::PathBuf;

use thiserror::Error;

use crate::journal::JournalError;
use crate::queue::QueueError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum DualGenError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Submission rejected: {0}")]
    Submit(#[from] SubmitError),

    #[error("Job queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("Log error: {0}")]
    Journal(#[from] JournalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Problems found while loading configuration. Reported once at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("no endpoints configured")]
    NoEndpoints,

    #[error("duplicate endpoint name: {0}")]
    DuplicateEndpoint(String),

    #[error("invalid URL for endpoint {name}: {url}")]
    InvalidUrl { name: String, url: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Reasons a submission never enters the queue.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    #[error("prompt is required when not using random mode")]
    EmptyPrompt,

    #[error("steps must be at least 1")]
    ZeroSteps,

    #[error("strength must be between 0.0 and 1.0, got {0}")]
    StrengthOutOfRange(f32),

    #[error("image too large: {size} bytes (maximum {max})")]
    ImageTooLarge { size: usize, max: usize },

    #[error("invalid image format: {0}. Supported: JPEG, PNG, WebP, GIF")]
    UnsupportedImage(String),

    #[error("prompt override for unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("job queue is shut down")]
    Closed,
}
