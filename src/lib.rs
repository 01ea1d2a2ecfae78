//! Sequential job queue that sends each prompt to every configured
//! image-generation endpoint at once.
//!
//! Submit through [`JobQueue`], let a [`Worker`] drain it, and poll the
//! shared [`JobStore`] for live progress and results.

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod journal;
pub mod prompt;
pub mod queue;
pub mod store;

#[cfg(test)]
mod testing;

pub use client::{EndpointError, HttpEndpointClient, ImageGenerator};
pub use config::{DualGenConfig, EndpointConfig};
pub use dispatcher::Dispatcher;
pub use error::{ConfigError, DualGenError, SubmitError};
pub use job::{Job, JobId, JobResult, JobStatus, Submission};
pub use journal::{JobLog, JsonlLog};
pub use prompt::{FallbackPrompts, PromptSource};
pub use queue::{JobQueue, QueueError, Receipt, Worker};
pub use store::{JobStore, StoreError};
