mod cli;
mod ui;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command, GenerateArgs};
use dualgen::job::{EndpointOutcome, ReferenceImage};
use dualgen::{
    Dispatcher, DualGenConfig, DualGenError, FallbackPrompts, HttpEndpointClient, Job, JobQueue,
    JobStatus, JobStore, JsonlLog, Submission, Worker,
};
use ui::JobProgress;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config =
        DualGenConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Generate(args) => {
            let status = generate(&config, &args).await?;
            if status == JobStatus::Failed {
                std::process::exit(1);
            }
        }
        Command::Endpoints => endpoints(&config).await?,
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "dualgen=debug" } else { "dualgen=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn generate(config: &DualGenConfig, args: &GenerateArgs) -> Result<JobStatus, DualGenError> {
    let submission = build_submission(config, args).await?;

    let client = HttpEndpointClient::from_config(config)?;
    let queue = JobQueue::new(JobStore::new(), config.endpoints.clone());
    let worker = Worker::spawn(
        queue.clone(),
        Dispatcher::new(client, config.endpoints.clone()),
        FallbackPrompts,
        JsonlLog::new(&config.log_path),
    )?;

    let outcome = follow(&queue, submission, args.json).await;
    worker.shutdown().await;
    let job = outcome?;

    let saved = save_images(&config.output_directory, &job).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&job)?);
    } else {
        for path in &saved {
            println!("    → {}", path.display());
        }
    }
    Ok(job.status)
}

/// Submit and poll the store until the job settles.
async fn follow(queue: &JobQueue, submission: Submission, quiet: bool) -> Result<Job, DualGenError> {
    let receipt = queue.enqueue(submission)?;
    let job = queue.store().get(receipt.job_id)?;
    let progress = (!quiet).then(|| JobProgress::start(&job, receipt.jobs_ahead));

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        ticker.tick().await;
        let job = queue.store().get(receipt.job_id)?;
        if let Some(progress) = &progress {
            progress.update(&job);
        }
        if job.status.is_terminal() {
            if let Some(progress) = &progress {
                progress.complete(&job);
            }
            return Ok(job);
        }
    }
}

async fn build_submission(
    config: &DualGenConfig,
    args: &GenerateArgs,
) -> Result<Submission, DualGenError> {
    let mut params = config.defaults.params();
    if let Some(orientation) = args.orientation {
        params.orientation = orientation.as_str().to_string();
    }
    if let Some(size) = &args.size {
        params.size = size.clone();
    }
    if let Some(steps) = args.steps {
        params.steps = steps;
    }
    params.seed = args.seed;
    if let Some(path) = &args.image {
        let data = tokio::fs::read(path).await?;
        let strength = args.strength.unwrap_or(config.defaults.strength);
        params.reference = Some(ReferenceImage::from_bytes(&data, strength)?);
    }

    let prompt = args.prompt_text();
    let mut submission = if args.random {
        Submission::random(prompt, params).with_distinct_prompts(args.distinct)
    } else {
        Submission::new(prompt, params)
    };

    if let Some(prompt2) = &args.prompt2 {
        match config.endpoints.get(1) {
            Some(second) => submission = submission.with_override(second.name.clone(), prompt2.clone()),
            None => tracing::warn!("Only one endpoint configured, ignoring --prompt2"),
        }
    }
    for (name, prompt) in &args.endpoint_prompts {
        submission = submission.with_override(name.clone(), prompt.clone());
    }
    Ok(submission)
}

/// Write every returned image into `dir`, prefixed with the endpoint it
/// came from so two endpoints never clash on a filename. A failed write
/// is reported and the remaining images are still saved.
async fn save_images(dir: &Path, job: &Job) -> Result<Vec<PathBuf>, DualGenError> {
    let Some(result) = &job.result else {
        return Ok(Vec::new());
    };

    let mut saved = Vec::new();
    for (index, endpoint) in result.endpoints.iter().enumerate() {
        let EndpointOutcome::Success(image) = &endpoint.outcome else {
            continue;
        };
        if image.bytes.is_empty() {
            continue;
        }
        tokio::fs::create_dir_all(dir).await?;
        let name = local_file_name(&image.filename)
            .unwrap_or_else(|| format!("{}-{index}.png", job.id));
        let path = dir.join(format!("{}_{name}", slug(&endpoint.endpoint)));
        match tokio::fs::write(&path, &image.bytes).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), bytes = image.size_bytes, "Saved image");
                saved.push(path);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to save image");
            }
        }
    }
    Ok(saved)
}

/// Last component of a server-supplied filename. Directory parts are
/// dropped so the image always lands directly in the output directory.
fn local_file_name(remote: &str) -> Option<String> {
    let name = Path::new(remote).file_name()?.to_str()?;
    (!name.is_empty()).then(|| name.to_string())
}

fn slug(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    slug.split('-').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("-")
}

async fn endpoints(config: &DualGenConfig) -> Result<(), DualGenError> {
    let client = HttpEndpointClient::from_config(config)?;
    for endpoint in &config.endpoints {
        let health = client.probe(endpoint).await;
        ui::print_health(endpoint, health);
    }
    Ok(())
}
