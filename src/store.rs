//! Process-wide record of every submitted job.
//!
//! A single [`RwLock`] guards the collection. Every operation holds it
//! for one state change or one copy, never across an `.await`, so
//! observers always see a whole job from before or after an update.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use thiserror::Error;

use crate::config::EndpointConfig;
use crate::job::{
    EndpointProgress, EndpointResult, EndpointState, InvalidTransition, Job, JobId, JobResult,
    JobStatus, PromptOrigin,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job {id}: {source}")]
    Transition {
        id: JobId,
        #[source]
        source: InvalidTransition,
    },

    #[error("job {id} is {status}, not running")]
    NotRunning { id: JobId, status: JobStatus },
}

/// Counts by lifecycle phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub pending: usize,
    pub running: usize,
    pub finished: usize,
    pub running_job: Option<JobId>,
}

#[derive(Debug, Default)]
struct Jobs {
    ordered: Vec<Job>,
    index: HashMap<JobId, usize>,
}

impl Jobs {
    fn get_mut(&mut self, id: JobId) -> Result<&mut Job, StoreError> {
        let slot = *self.index.get(&id).ok_or(StoreError::NotFound(id))?;
        Ok(&mut self.ordered[slot])
    }

    fn reindex(&mut self) {
        self.index = self
            .ordered
            .iter()
            .enumerate()
            .map(|(slot, job)| (job.id, slot))
            .collect();
    }
}

/// Shared handle to the job collection. Clones are cheap and see the same jobs.
///
/// Jobs stay in memory until [`clear_finished`](Self::clear_finished) is
/// called, so a long session grows without bound.
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<Jobs>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Poisoning is ignored; no update panics while holding the lock.
    fn read(&self) -> RwLockReadGuard<'_, Jobs> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Jobs> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, job: Job) {
        let mut jobs = self.write();
        let slot = jobs.ordered.len();
        jobs.index.insert(job.id, slot);
        jobs.ordered.push(job);
    }

    pub fn get(&self, id: JobId) -> Result<Job, StoreError> {
        let jobs = self.read();
        jobs.index
            .get(&id)
            .map(|&slot| jobs.ordered[slot].clone())
            .ok_or(StoreError::NotFound(id))
    }

    /// Snapshot of every job in submission order.
    pub fn list(&self) -> Vec<Job> {
        self.read().ordered.clone()
    }

    pub fn len(&self) -> usize {
        self.read().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> StoreSummary {
        let jobs = self.read();
        let mut summary = StoreSummary::default();
        for job in &jobs.ordered {
            match job.status {
                JobStatus::Pending => summary.pending += 1,
                JobStatus::Running => {
                    summary.running += 1;
                    summary.running_job = Some(job.id);
                }
                _ => summary.finished += 1,
            }
        }
        summary
    }

    /// Drop every job in a terminal status. Returns how many were removed.
    pub fn clear_finished(&self) -> usize {
        let mut jobs = self.write();
        let before = jobs.ordered.len();
        jobs.ordered.retain(|job| !job.status.is_terminal());
        jobs.reindex();
        before - jobs.ordered.len()
    }

    fn update<T>(
        &self,
        id: JobId,
        f: impl FnOnce(&mut Job) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut jobs = self.write();
        f(jobs.get_mut(id)?)
    }

    /// Pending → Running, with one pending progress slot per endpoint.
    /// Returns the job as it now stands.
    pub(crate) fn mark_running(
        &self,
        id: JobId,
        endpoints: &[EndpointConfig],
    ) -> Result<Job, StoreError> {
        self.update(id, |job| {
            job.advance(JobStatus::Running)
                .map_err(|source| StoreError::Transition { id, source })?;
            job.progress = endpoints
                .iter()
                .map(|e| EndpointProgress::pending(e.name.clone()))
                .collect();
            Ok(job.clone())
        })
    }

    /// Record the prompts each endpoint is about to receive.
    pub(crate) fn set_prompts(
        &self,
        id: JobId,
        prompts: &[String],
        origin: PromptOrigin,
    ) -> Result<(), StoreError> {
        self.update(id, |job| {
            ensure_running(job)?;
            job.prompt_origin = Some(origin);
            for (progress, prompt) in job.progress.iter_mut().zip(prompts) {
                progress.prompt = Some(prompt.clone());
                progress.state = EndpointState::Generating;
            }
            Ok(())
        })
    }

    /// Reflect one settled endpoint call while the rest are still running.
    pub(crate) fn record_endpoint(
        &self,
        id: JobId,
        index: usize,
        result: &EndpointResult,
    ) -> Result<(), StoreError> {
        self.update(id, |job| {
            ensure_running(job)?;
            if let Some(progress) = job.progress.get_mut(index) {
                progress.settle(result);
            }
            Ok(())
        })
    }

    /// Running → status derived from `result`. Returns the terminal job,
    /// which stays valid even if the store is cleared right after.
    pub(crate) fn finish(&self, id: JobId, result: JobResult) -> Result<Job, StoreError> {
        self.update(id, |job| {
            job.advance(result.status())
                .map_err(|source| StoreError::Transition { id, source })?;
            for (progress, endpoint) in job.progress.iter_mut().zip(&result.endpoints) {
                progress.settle(endpoint);
            }
            job.result = Some(result);
            Ok(job.clone())
        })
    }

    /// Running → Failed with a job-level error and no endpoint results.
    pub(crate) fn fail(&self, id: JobId, error: impl Into<String>) -> Result<Job, StoreError> {
        self.update(id, |job| {
            job.advance(JobStatus::Failed)
                .map_err(|source| StoreError::Transition { id, source })?;
            job.error = Some(error.into());
            for progress in &mut job.progress {
                if progress.state != EndpointState::Done {
                    progress.state = EndpointState::Error;
                }
            }
            Ok(job.clone())
        })
    }
}

fn ensure_running(job: &Job) -> Result<(), StoreError> {
    if job.status == JobStatus::Running {
        Ok(())
    } else {
        Err(StoreError::NotRunning {
            id: job.id,
            status: job.status,
        })
    }
}
