//! Test doubles shared by the dispatcher and queue tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::client::{EndpointError, ImageGenerator};
use crate::config::EndpointConfig;
use crate::journal::{JobLog, JournalError, LogRecord};
use crate::job::{EndpointResult, GeneratedImage, GenerationParams, Timings};
use crate::prompt::{PromptError, PromptSource};

pub fn endpoints() -> Vec<EndpointConfig> {
    vec![
        EndpointConfig::new("alpha", "http://alpha.invalid:2222"),
        EndpointConfig::new("beta", "http://beta.invalid:2222"),
    ]
}

#[derive(Debug, Clone, Copy)]
enum Behaviour {
    Succeed,
    Fail,
    Panic,
}

#[derive(Debug, Clone, Copy)]
pub struct Script {
    delay: Duration,
    behaviour: Behaviour,
}

impl Script {
    pub fn succeed_after(ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(ms),
            behaviour: Behaviour::Succeed,
        }
    }

    pub fn fail_after(ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(ms),
            behaviour: Behaviour::Fail,
        }
    }

    pub fn panic() -> Self {
        Self {
            delay: Duration::ZERO,
            behaviour: Behaviour::Panic,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub endpoint: String,
    pub prompt: String,
    pub started: Instant,
}

/// Generator whose per-endpoint delay and outcome are fixed up front.
/// Unscripted endpoints succeed immediately.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, endpoint: &str, script: Script) -> Self {
        self.scripts.insert(endpoint.to_string(), script);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl ImageGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        endpoint: &EndpointConfig,
        prompt: &str,
        _params: &GenerationParams,
    ) -> EndpointResult {
        let started = Instant::now();
        self.calls.lock().unwrap().push(Call {
            endpoint: endpoint.name.clone(),
            prompt: prompt.to_string(),
            started,
        });
        let script = self
            .scripts
            .get(&endpoint.name)
            .copied()
            .unwrap_or(Script::succeed_after(0));
        tokio::time::sleep(script.delay).await;

        let outcome = match script.behaviour {
            Behaviour::Succeed => Ok(GeneratedImage::new(
                format!("{}.png", endpoint.name),
                Bytes::from_static(b"\x89PNG"),
                Some(1234),
                Timings {
                    total: Some(script.delay.as_secs_f64()),
                    ..Default::default()
                },
            )),
            Behaviour::Fail => Err(EndpointError::Status {
                status: 500,
                body: format!("{} exploded", endpoint.name),
            }),
            Behaviour::Panic => panic!("scripted panic for {}", endpoint.name),
        };
        EndpointResult::new(endpoint.name.clone(), prompt, outcome, started.elapsed())
    }
}

/// Log sink that keeps records in memory.
#[derive(Debug, Default)]
pub struct RecordingLog {
    records: Mutex<Vec<LogRecord>>,
}

impl RecordingLog {
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl JobLog for std::sync::Arc<RecordingLog> {
    async fn append(&self, record: &LogRecord) -> Result<(), JournalError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Log sink that always fails.
#[derive(Debug, Default)]
pub struct BrokenLog;

impl JobLog for BrokenLog {
    async fn append(&self, _record: &LogRecord) -> Result<(), JournalError> {
        Err(JournalError::Io {
            path: "/dev/full".into(),
            source: std::io::Error::other("disk full"),
        })
    }
}

/// Prompt source that panics, standing in for a fault inside the worker.
#[derive(Debug, Default)]
pub struct PanickingPrompts;

impl PromptSource for PanickingPrompts {
    async fn generate(&self, _steering: Option<&str>) -> Result<String, PromptError> {
        panic!("prompt source blew up")
    }
}
