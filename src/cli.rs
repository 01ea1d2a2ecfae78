//! Command-line interface for dualgen, built on clap.
//!
//! [`Cli`] holds the global flags (`--config`, `--verbose`) and the
//! [`Command`] to run: `generate` submits one job, `endpoints` checks
//! which servers are reachable.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// dualgen: one prompt, every image endpoint at once.
#[derive(Debug, Parser)]
#[command(name = "dualgen", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (defaults to ./dualgen.toml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug-level logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate images on every configured endpoint.
    Generate(GenerateArgs),

    /// Check which endpoints are reachable.
    Endpoints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OrientationArg {
    Landscape,
    Portrait,
    Square,
}

impl OrientationArg {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Landscape => "landscape",
            Self::Portrait => "portrait",
            Self::Square => "square",
        }
    }
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Prompt text. With --random it steers the generated prompt.
    #[arg(num_args = 0..)]
    pub prompt: Vec<String>,

    /// Let the prompt generator write the prompt.
    #[arg(long, default_value_t = false)]
    pub random: bool,

    /// With --random, generate a separate prompt per endpoint.
    #[arg(long, default_value_t = false, requires = "random")]
    pub distinct: bool,

    /// Prompt for the second endpoint only.
    #[arg(long, conflicts_with = "random")]
    pub prompt2: Option<String>,

    /// Prompt for one named endpoint, as NAME=PROMPT. Repeatable.
    #[arg(long = "endpoint-prompt", value_parser = parse_endpoint_prompt, conflicts_with = "random")]
    pub endpoint_prompts: Vec<(String, String)>,

    #[arg(long, value_enum)]
    pub orientation: Option<OrientationArg>,

    /// Target size, e.g. 1mp or 2mp.
    #[arg(long)]
    pub size: Option<String>,

    #[arg(long)]
    pub steps: Option<u32>,

    /// Fixed seed; random per endpoint when omitted.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Reference image for image-to-image generation.
    #[arg(long)]
    pub image: Option<PathBuf>,

    /// How far to move away from the reference image (0.0 to 1.0).
    #[arg(long, requires = "image")]
    pub strength: Option<f32>,

    /// Print the finished job as JSON instead of a summary.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl GenerateArgs {
    pub fn prompt_text(&self) -> String {
        self.prompt.join(" ")
    }
}

fn parse_endpoint_prompt(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, prompt)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), prompt.to_string()))
        }
        _ => Err(format!("expected NAME=PROMPT, got `{raw}`")),
    }
}
