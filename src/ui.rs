//! Terminal output for the CLI: a spinner while a job runs and coloured
//! per-endpoint summaries once it settles.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use dualgen::client::EndpointHealth;
use dualgen::config::EndpointConfig;
use dualgen::job::{EndpointOutcome, EndpointState, Job, JobStatus};

/// Spinner that follows one job through the store.
pub struct JobProgress {
    // indicatif spinner, redrawn on every poll.
    pb: ProgressBar,
    // Finished endpoints and completed jobs.
    green: Style,
    // Endpoint errors and failed jobs.
    red: Style,
    // Endpoints still generating, partial failures, queue position.
    yellow: Style,
    // Prompts and endpoints not started yet.
    dim: Style,
}

impl JobProgress {
    pub fn start(job: &Job, jobs_ahead: usize) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));

        let progress = Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        };
        if jobs_ahead > 0 {
            progress.pb.println(format!(
                "  {} {jobs_ahead} job(s) ahead of {}",
                progress.yellow.apply_to("…"),
                job.id
            ));
        }
        progress.update(job);
        progress
    }

    /// Redraw from a fresh snapshot of the job.
    pub fn update(&self, job: &Job) {
        if job.progress.is_empty() {
            self.pb.set_message(job.status.to_string());
            return;
        }
        let endpoints: Vec<String> = job
            .progress
            .iter()
            .map(|p| {
                let mark = match p.state {
                    EndpointState::Pending => self.dim.apply_to("·").to_string(),
                    EndpointState::Generating => self.yellow.apply_to("…").to_string(),
                    EndpointState::Done => self.green.apply_to("✓").to_string(),
                    EndpointState::Error => self.red.apply_to("✗").to_string(),
                };
                match p.elapsed_ms {
                    Some(ms) => format!("{} {mark} {:.1}s", p.endpoint, ms as f64 / 1000.0),
                    None => format!("{} {mark}", p.endpoint),
                }
            })
            .collect();
        self.pb
            .set_message(format!("{} {}", job.status, endpoints.join("  ")));
    }

    /// Clear the spinner and print how each endpoint did.
    pub fn complete(&self, job: &Job) {
        self.pb.finish_and_clear();
        let headline = match job.status {
            JobStatus::Completed => self.green.apply_to("✓ Job completed"),
            JobStatus::PartialFailure => self.yellow.apply_to("◐ Job partially failed"),
            _ => self.red.apply_to("✗ Job failed"),
        };
        match job.duration_ms() {
            Some(ms) => println!("  {headline} in {:.1}s", ms as f64 / 1000.0),
            None => println!("  {headline}"),
        }
        if let Some(error) = &job.error {
            println!("    {}", self.red.apply_to(error));
        }

        let Some(result) = &job.result else {
            return;
        };
        for endpoint in &result.endpoints {
            match &endpoint.outcome {
                EndpointOutcome::Success(image) => {
                    let seed = image.seed.map(|s| format!(" seed {s}")).unwrap_or_default();
                    println!(
                        "    {} {}: {}{seed} ({:.1}s)",
                        self.green.apply_to("✓"),
                        endpoint.endpoint,
                        image.filename,
                        endpoint.elapsed_ms as f64 / 1000.0
                    );
                }
                EndpointOutcome::Failure { error } => {
                    println!(
                        "    {} {}: {error}",
                        self.red.apply_to("✗"),
                        endpoint.endpoint
                    );
                }
            }
            println!("      {}", self.dim.apply_to(&endpoint.prompt));
        }
    }
}

pub fn print_health(endpoint: &EndpointConfig, health: EndpointHealth) {
    let style = match health {
        EndpointHealth::Online => Style::new().green().bold(),
        EndpointHealth::Timeout => Style::new().yellow(),
        EndpointHealth::Offline => Style::new().red().bold(),
    };
    println!(
        "  {:<12} {:<32} {}",
        endpoint.name,
        endpoint.url,
        style.apply_to(health)
    );
}
