//! Failure types for a single endpoint call.
//!
//! [`EndpointError`] is a value, not an exception: it is captured in the
//! endpoint's result and shown to observers as-is, so it is `Clone` and
//! serializable rather than wrapping the original `reqwest` error.

use serde::Serialize;
use thiserror::Error;

/// Everything that can go wrong while calling one endpoint.
///
/// - [`Transport`](EndpointError::Transport): connection, DNS, timeout or body read failure
/// - [`Status`](EndpointError::Status): the endpoint answered with a non-2xx status
/// - [`Api`](EndpointError::Api): the endpoint answered `success: false`
/// - [`Malformed`](EndpointError::Malformed): the body did not match the protocol
/// - [`NoImages`](EndpointError::NoImages): a successful answer without images
/// - [`Aborted`](EndpointError::Aborted): the call's task died before reporting
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndpointError {
    #[error("transport error: {message}")]
    Transport { message: String, timed_out: bool },

    #[error("endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API error: {message}")]
    Api { message: String },

    #[error("malformed response: {detail}")]
    Malformed { detail: String },

    #[error("response contained no images")]
    NoImages,

    #[error("endpoint task aborted: {detail}")]
    Aborted { detail: String },
}

impl EndpointError {
    /// HTTP-style class of the failure, e.g. `"5xx"`, for non-2xx answers.
    pub fn status_class(&self) -> Option<&'static str> {
        match self {
            EndpointError::Status { status, .. } => Some(match status {
                100..=199 => "1xx",
                300..=399 => "3xx",
                400..=499 => "4xx",
                500..=599 => "5xx",
                _ => "other",
            }),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, EndpointError::Transport { timed_out: true, .. })
    }
}

impl From<reqwest::Error> for EndpointError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            EndpointError::Malformed {
                detail: err.to_string(),
            }
        } else {
            EndpointError::Transport {
                message: err.to_string(),
                timed_out: err.is_timeout(),
            }
        }
    }
}
