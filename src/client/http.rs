use std::time::{Duration, Instant};

use reqwest::{Client, Response};
use serde::Serialize;

use super::error::EndpointError;
use super::types::{GenerateRequest, GenerateResponse};
use super::ImageGenerator;
use crate::config::{DualGenConfig, EndpointConfig};
use crate::error::ConfigError;
use crate::job::{EndpointResult, GenerationParams, GeneratedImage};

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Reachability of an endpoint as seen by [`HttpEndpointClient::probe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointHealth {
    Online,
    Timeout,
    Offline,
}

impl std::fmt::Display for EndpointHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Online => "online",
            Self::Timeout => "timeout",
            Self::Offline => "offline",
        })
    }
}

/// Talks to the generation endpoints over HTTP.
///
/// Holds no per-endpoint state, so one instance serves every endpoint
/// and every concurrent call.
pub struct HttpEndpointClient {
    client: Client,
}

impl HttpEndpointClient {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn from_config(config: &DualGenConfig) -> Result<Self, ConfigError> {
        Self::new(config.connect_timeout(), config.request_timeout())
    }

    /// Check whether an endpoint answers at all. Any HTTP response counts.
    pub async fn probe(&self, endpoint: &EndpointConfig) -> EndpointHealth {
        let url = format!("{}/", endpoint.base_url());
        match self.client.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(_) => EndpointHealth::Online,
            Err(e) if e.is_timeout() => EndpointHealth::Timeout,
            Err(e) => {
                tracing::debug!(endpoint = %endpoint.name, error = %e, "Probe failed");
                EndpointHealth::Offline
            }
        }
    }

    async fn request_image(
        &self,
        endpoint: &EndpointConfig,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<GeneratedImage, EndpointError> {
        let base = endpoint.base_url();
        let response = self
            .client
            .post(format!("{base}/generate"))
            .json(&GenerateRequest::new(prompt, params))
            .send()
            .await?;
        let payload = ensure_success(response)
            .await?
            .json::<GenerateResponse>()
            .await?;

        if !payload.success {
            return Err(EndpointError::Api {
                message: payload.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        // Only the first image of a batch is kept.
        let info = payload
            .images
            .into_iter()
            .next()
            .ok_or(EndpointError::NoImages)?;

        tracing::debug!(endpoint = %endpoint.name, filename = %info.filename, "Downloading image");
        let response = self
            .client
            .get(format!("{base}/images/{}", info.filename))
            .send()
            .await?;
        let bytes = ensure_success(response).await?.bytes().await?;

        Ok(GeneratedImage::new(
            info.filename,
            bytes,
            info.seed,
            info.timings.unwrap_or_default(),
        ))
    }
}

impl ImageGenerator for HttpEndpointClient {
    async fn generate(
        &self,
        endpoint: &EndpointConfig,
        prompt: &str,
        params: &GenerationParams,
    ) -> EndpointResult {
        let started = Instant::now();
        tracing::info!(endpoint = %endpoint.name, "Sending generation request");

        let outcome = self.request_image(endpoint, prompt, params).await;
        match &outcome {
            Ok(image) => tracing::info!(
                endpoint = %endpoint.name,
                filename = %image.filename,
                seed = ?image.seed,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Generation finished",
            ),
            Err(e) => tracing::warn!(
                endpoint = %endpoint.name,
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Generation failed",
            ),
        }

        EndpointResult::new(endpoint.name.clone(), prompt, outcome, started.elapsed())
    }
}

/// Turn a non-2xx answer into [`EndpointError::Status`] carrying the body.
async fn ensure_success(response: Response) -> Result<Response, EndpointError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(EndpointError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}
