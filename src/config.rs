//! Configuration loaded from `dualgen.toml`.
//!
//! Every field has a default, so a missing file yields the stock
//! two-endpoint setup. `DUALGEN_OUTPUT_DIR` and `DUALGEN_LOG_PATH` take
//! precedence over the file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::job::GenerationParams;

pub const CONFIG_FILE: &str = "dualgen.toml";

/// One remote generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Display name; also the key for per-endpoint prompt overrides.
    pub name: String,
    /// Base URL, e.g. `http://192.168.5.40:2222`.
    pub url: String,
}

impl EndpointConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

/// Generation parameters used when the submitter does not set them.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationDefaults {
    /// `landscape`, `portrait` or `square`.
    #[serde(default = "default_orientation")]
    pub orientation: String,
    /// Target resolution class understood by the endpoints, e.g. `1mp`.
    #[serde(default = "default_size")]
    pub size: String,
    /// Diffusion steps per image.
    #[serde(default = "default_steps")]
    pub steps: u32,
    /// Images requested per call; only the first is kept.
    #[serde(default = "default_batch")]
    pub batch: u32,
    /// Reference-image strength when `--strength` is not given.
    #[serde(default = "default_strength")]
    pub strength: f32,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            orientation: default_orientation(),
            size: default_size(),
            steps: default_steps(),
            batch: default_batch(),
            strength: default_strength(),
        }
    }
}

impl GenerationDefaults {
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            orientation: self.orientation.clone(),
            size: self.size.clone(),
            steps: self.steps,
            seed: None,
            batch: self.batch,
            reference: None,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DualGenConfig {
    /// Endpoints in declaration order; results are reported in this order.
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<EndpointConfig>,

    /// Where the CLI writes downloaded images.
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,

    /// Append-only JSON-lines log of finished jobs.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Seconds allowed to open a connection to an endpoint.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Upper bound on one whole endpoint request, generation included.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Parameters applied to every submission unless overridden.
    #[serde(default)]
    pub defaults: GenerationDefaults,
}

fn default_endpoints() -> Vec<EndpointConfig> {
    vec![
        EndpointConfig::new("Endpoint 1 (5.40)", "http://192.168.5.40:2222"),
        EndpointConfig::new("Endpoint 2 (5.46)", "http://192.168.5.46:2222"),
    ]
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("output")
}

fn default_log_path() -> PathBuf {
    PathBuf::from("generation_log.jsonl")
}

fn default_connect_timeout_secs() -> u64 {
    10
}

// Generation on a busy endpoint routinely takes minutes.
fn default_request_timeout_secs() -> u64 {
    300
}

fn default_orientation() -> String {
    "landscape".to_string()
}

fn default_size() -> String {
    "1mp".to_string()
}

fn default_steps() -> u32 {
    25
}

fn default_batch() -> u32 {
    1
}

fn default_strength() -> f32 {
    0.75
}

impl Default for DualGenConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            output_directory: default_output_directory(),
            log_path: default_log_path(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            defaults: GenerationDefaults::default(),
        }
    }
}

impl DualGenConfig {
    /// Load from `path`, or from `dualgen.toml` in the working directory.
    ///
    /// An explicit path must exist; the implicit file falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(CONFIG_FILE).exists() => Self::from_file(Path::new(CONFIG_FILE))?,
            None => Self::default(),
        };

        if let Ok(dir) = std::env::var("DUALGEN_OUTPUT_DIR")
            && !dir.is_empty()
        {
            config.output_directory = PathBuf::from(dir);
        }
        if let Ok(log) = std::env::var("DUALGEN_LOG_PATH")
            && !log.is_empty()
        {
            config.log_path = PathBuf::from(log);
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if !seen.insert(endpoint.name.as_str()) {
                return Err(ConfigError::DuplicateEndpoint(endpoint.name.clone()));
            }
            let valid = Url::parse(&endpoint.url)
                .map(|url| matches!(url.scheme(), "http" | "https"))
                .unwrap_or(false);
            if !valid {
                return Err(ConfigError::InvalidUrl {
                    name: endpoint.name.clone(),
                    url: endpoint.url.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
