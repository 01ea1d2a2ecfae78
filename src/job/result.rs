use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::status::JobStatus;
use crate::client::EndpointError;

/// Server-side timing breakdown in seconds, as reported by an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timings {
    #[serde(default)]
    pub encode: Option<f64>,
    #[serde(default)]
    pub diffuse: Option<f64>,
    #[serde(default)]
    pub save: Option<f64>,
    #[serde(default)]
    pub total: Option<f64>,
}

/// An image returned by an endpoint.
///
/// The filename is the endpoint's own reference for the image; the bytes
/// are kept in memory and left out of serialized snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedImage {
    pub filename: String,
    #[serde(skip)]
    pub bytes: Bytes,
    pub size_bytes: usize,
    pub seed: Option<u64>,
    pub timings: Timings,
}

impl GeneratedImage {
    pub fn new(filename: String, bytes: Bytes, seed: Option<u64>, timings: Timings) -> Self {
        Self {
            filename,
            size_bytes: bytes.len(),
            bytes,
            seed,
            timings,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EndpointOutcome {
    Success(GeneratedImage),
    Failure { error: EndpointError },
}

/// Outcome of one endpoint call within a job.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointResult {
    pub endpoint: String,
    pub prompt: String,
    pub outcome: EndpointOutcome,
    /// Wall-clock time measured by the client, including the image download.
    pub elapsed_ms: u64,
}

impl EndpointResult {
    pub fn new(
        endpoint: impl Into<String>,
        prompt: impl Into<String>,
        outcome: Result<GeneratedImage, EndpointError>,
        elapsed: Duration,
    ) -> Self {
        let outcome = match outcome {
            Ok(image) => EndpointOutcome::Success(image),
            Err(error) => EndpointOutcome::Failure { error },
        };
        Self {
            endpoint: endpoint.into(),
            prompt: prompt.into(),
            outcome,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, EndpointOutcome::Success(_))
    }

    pub fn image(&self) -> Option<&GeneratedImage> {
        match &self.outcome {
            EndpointOutcome::Success(image) => Some(image),
            EndpointOutcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&EndpointError> {
        match &self.outcome {
            EndpointOutcome::Success(_) => None,
            EndpointOutcome::Failure { error } => Some(error),
        }
    }
}

/// Joined outcome of every endpoint call for one job, in endpoint
/// declaration order.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub endpoints: Vec<EndpointResult>,
}

impl JobResult {
    pub fn new(endpoints: Vec<EndpointResult>) -> Self {
        Self { endpoints }
    }

    pub fn succeeded(&self) -> usize {
        self.endpoints.iter().filter(|r| r.is_success()).count()
    }

    /// Completed when every endpoint succeeded, Failed when none did,
    /// PartialFailure otherwise.
    pub fn status(&self) -> JobStatus {
        let succeeded = self.succeeded();
        if succeeded == 0 {
            JobStatus::Failed
        } else if succeeded == self.endpoints.len() {
            JobStatus::Completed
        } else {
            JobStatus::PartialFailure
        }
    }
}
