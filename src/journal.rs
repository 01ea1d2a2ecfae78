//! Append-only record of finished jobs.
//!
//! One line per terminal job. The worker treats the sink as best-effort:
//! a failed append is logged and the queue moves on.

use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::job::{Job, JobId, JobStatus, PromptOrigin, Timings};

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Where finished jobs are written.
pub trait JobLog: Send + Sync + 'static {
    fn append(&self, record: &LogRecord) -> impl Future<Output = Result<(), JournalError>> + Send;
}

/// Per-endpoint part of a [`LogRecord`].
#[derive(Debug, Clone, Serialize)]
pub struct LogEndpoint {
    pub endpoint: String,
    pub prompt: Option<String>,
    pub success: bool,
    pub filename: Option<String>,
    pub seed: Option<u64>,
    pub timings: Option<Timings>,
    pub error: Option<String>,
    pub elapsed_ms: Option<u64>,
}

/// One finished job as written to the log.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub job_id: JobId,
    pub status: JobStatus,
    pub prompt_origin: Option<PromptOrigin>,
    pub error: Option<String>,
    pub duration_ms: Option<i64>,
    pub endpoints: Vec<LogEndpoint>,
}

impl LogRecord {
    pub fn from_job(job: &Job) -> Self {
        let endpoints = match &job.result {
            Some(result) => result
                .endpoints
                .iter()
                .map(|r| LogEndpoint {
                    endpoint: r.endpoint.clone(),
                    prompt: Some(r.prompt.clone()),
                    success: r.is_success(),
                    filename: r.image().map(|i| i.filename.clone()),
                    seed: r.image().and_then(|i| i.seed),
                    timings: r.image().map(|i| i.timings.clone()),
                    error: r.error().map(ToString::to_string),
                    elapsed_ms: Some(r.elapsed_ms),
                })
                .collect(),
            // Job-level failure: no endpoint results, only what progress saw.
            None => job
                .progress
                .iter()
                .map(|p| LogEndpoint {
                    endpoint: p.endpoint.clone(),
                    prompt: p.prompt.clone(),
                    success: false,
                    filename: None,
                    seed: None,
                    timings: None,
                    error: job.error.clone(),
                    elapsed_ms: p.elapsed_ms,
                })
                .collect(),
        };

        Self {
            timestamp: job.finished_at.unwrap_or_else(Utc::now),
            job_id: job.id,
            status: job.status,
            prompt_origin: job.prompt_origin,
            error: job.error.clone(),
            duration_ms: job.duration_ms(),
            endpoints,
        }
    }
}

/// JSON-lines file sink. The file and its parent directory are created
/// on first write.
#[derive(Debug, Clone)]
pub struct JsonlLog {
    path: PathBuf,
}

impl JsonlLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> JournalError {
        JournalError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl JobLog for JsonlLog {
    async fn append(&self, record: &LogRecord) -> Result<(), JournalError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))?;
        Ok(())
    }
}
