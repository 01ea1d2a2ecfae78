use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::result::{EndpointResult, JobResult};
use super::status::{InvalidTransition, JobStatus};
use crate::config::EndpointConfig;
use crate::error::SubmitError;

pub type JobId = Uuid;

/// Largest reference image accepted at submission.
pub const MAX_REFERENCE_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    Gif,
}

impl ImageFormat {
    /// Sniff the format from the file header.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }
        if &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Some(ImageFormat::Webp)
        } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageFormat::Png)
        } else if data.starts_with(b"\xff\xd8") {
            Some(ImageFormat::Jpeg)
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else {
            None
        }
    }
}

/// Image sent alongside the prompt for image-to-image generation.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceImage {
    #[serde(skip)]
    pub data_base64: String,
    pub format: ImageFormat,
    pub size_bytes: usize,
    /// How far the endpoint may move away from the reference (0.0..=1.0).
    pub strength: f32,
}

impl ReferenceImage {
    pub fn from_bytes(data: &[u8], strength: f32) -> Result<Self, SubmitError> {
        if data.len() > MAX_REFERENCE_IMAGE_BYTES {
            return Err(SubmitError::ImageTooLarge {
                size: data.len(),
                max: MAX_REFERENCE_IMAGE_BYTES,
            });
        }
        let format = ImageFormat::detect(data)
            .ok_or_else(|| SubmitError::UnsupportedImage("unknown".into()))?;
        Ok(Self {
            data_base64: STANDARD.encode(data),
            format,
            size_bytes: data.len(),
            strength,
        })
    }
}

/// Parameters forwarded to every endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationParams {
    pub orientation: String,
    pub size: String,
    pub steps: u32,
    /// `None` lets each endpoint pick its own seed.
    pub seed: Option<u64>,
    pub batch: u32,
    pub reference: Option<ReferenceImage>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            orientation: "landscape".into(),
            size: "1mp".into(),
            steps: 25,
            seed: None,
            batch: 1,
            reference: None,
        }
    }
}

/// What a submitter asks for.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    /// The literal prompt, or the steering concept in random mode.
    pub prompt: String,
    /// Prompt replacements keyed by endpoint name.
    pub overrides: BTreeMap<String, String>,
    /// Ask the prompt source for a prompt instead of using `prompt` verbatim.
    pub random: bool,
    /// In random mode, generate one prompt per endpoint.
    pub distinct_prompts: bool,
    pub params: GenerationParams,
}

impl Submission {
    pub fn new(prompt: impl Into<String>, params: GenerationParams) -> Self {
        Self {
            prompt: prompt.into(),
            overrides: BTreeMap::new(),
            random: false,
            distinct_prompts: false,
            params,
        }
    }

    /// A random-mode submission; `steering` may be empty.
    pub fn random(steering: impl Into<String>, params: GenerationParams) -> Self {
        Self {
            random: true,
            ..Self::new(steering, params)
        }
    }

    pub fn with_override(mut self, endpoint: impl Into<String>, prompt: impl Into<String>) -> Self {
        self.overrides.insert(endpoint.into(), prompt.into());
        self
    }

    pub fn with_distinct_prompts(mut self, distinct: bool) -> Self {
        self.distinct_prompts = distinct;
        self
    }

    /// The steering concept for random mode, if any.
    pub fn steering(&self) -> Option<&str> {
        let trimmed = self.prompt.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    pub fn validate(&self, endpoints: &[EndpointConfig]) -> Result<(), SubmitError> {
        if !self.random && self.prompt.trim().is_empty() {
            return Err(SubmitError::EmptyPrompt);
        }
        if self.params.steps == 0 {
            return Err(SubmitError::ZeroSteps);
        }
        if let Some(reference) = &self.params.reference
            && !(0.0..=1.0).contains(&reference.strength)
        {
            return Err(SubmitError::StrengthOutOfRange(reference.strength));
        }
        if let Some(unknown) = self
            .overrides
            .keys()
            .find(|name| !endpoints.iter().any(|e| &e.name == *name))
        {
            return Err(SubmitError::UnknownEndpoint(unknown.clone()));
        }
        Ok(())
    }
}

/// Where the prompts of a running job came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptOrigin {
    Submitted,
    Generated,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointState {
    Pending,
    Generating,
    Done,
    Error,
}

/// Live view of one endpoint call while the job runs.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointProgress {
    pub endpoint: String,
    pub prompt: Option<String>,
    pub state: EndpointState,
    pub elapsed_ms: Option<u64>,
}

impl EndpointProgress {
    pub fn pending(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            prompt: None,
            state: EndpointState::Pending,
            elapsed_ms: None,
        }
    }

    pub fn settle(&mut self, result: &EndpointResult) {
        self.state = if result.is_success() {
            EndpointState::Done
        } else {
            EndpointState::Error
        };
        self.elapsed_ms = Some(result.elapsed_ms);
    }
}

/// A submitted unit of work and everything known about it so far.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub submission: Submission,
    pub status: JobStatus,
    /// Every status the job has held, oldest first, including the current one.
    pub status_history: Vec<JobStatus>,
    pub prompt_origin: Option<PromptOrigin>,
    pub progress: Vec<EndpointProgress>,
    pub result: Option<JobResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(submission: Submission) -> Self {
        Self {
            id: Uuid::new_v4(),
            submission,
            status: JobStatus::Pending,
            status_history: vec![JobStatus::Pending],
            prompt_origin: None,
            progress: Vec::new(),
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Move to `next`, stamping start/finish times.
    pub fn advance(&mut self, next: JobStatus) -> Result<(), InvalidTransition> {
        self.status = self.status.transition(next)?;
        self.status_history.push(next);
        let now = Utc::now();
        if next == JobStatus::Running {
            self.started_at = Some(now);
        } else if next.is_terminal() {
            self.finished_at = Some(now);
        }
        Ok(())
    }

    /// Milliseconds between start and finish, once both are known.
    pub fn duration_ms(&self) -> Option<i64> {
        Some((self.finished_at? - self.started_at?).num_milliseconds())
    }
}
