//! The job queue and its single worker.
//!
//! [`JobQueue`] is the cheap, cloneable submission handle. [`Worker`]
//! owns the one task that drains it: jobs run strictly one after another,
//! in the order their `enqueue` calls took the queue lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::ImageGenerator;
use crate::config::EndpointConfig;
use crate::dispatcher::Dispatcher;
use crate::error::SubmitError;
use crate::job::{Job, JobId, JobResult, Submission};
use crate::journal::{JobLog, LogRecord};
use crate::prompt::{PromptSource, resolve_prompts};
use crate::store::JobStore;

/// Job-level error recorded when running a job faults outside the
/// endpoint calls.
pub const INTERNAL_ERROR: &str = "internal error while running job";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("a worker is already attached to this queue")]
    WorkerAttached,
}

/// Returned by [`JobQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub job_id: JobId,
    /// Jobs that will run before this one, including a running job.
    pub jobs_ahead: usize,
}

struct Shared {
    pending: Mutex<VecDeque<JobId>>,
    wake: Notify,
    busy: AtomicBool,
    /// Set once by the first [`Worker::spawn`]; never cleared.
    worker_attached: AtomicBool,
    store: JobStore,
    endpoints: Arc<[EndpointConfig]>,
    shutdown: CancellationToken,
}

/// Submission handle. Clones share one queue.
#[derive(Clone)]
pub struct JobQueue {
    shared: Arc<Shared>,
}

impl JobQueue {
    pub fn new(store: JobStore, endpoints: Vec<EndpointConfig>) -> Self {
        Self {
            shared: Arc::new(Shared {
                pending: Mutex::new(VecDeque::new()),
                wake: Notify::new(),
                busy: AtomicBool::new(false),
                worker_attached: AtomicBool::new(false),
                store,
                endpoints: endpoints.into(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.shared.store
    }

    /// Validate and queue a job. Never waits on the worker.
    pub fn enqueue(&self, submission: Submission) -> Result<Receipt, SubmitError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(SubmitError::Closed);
        }
        submission.validate(&self.shared.endpoints)?;

        let job = Job::new(submission);
        let job_id = job.id;
        let jobs_ahead = {
            let mut pending = self.pending();
            let ahead = pending.len() + usize::from(self.shared.busy.load(Ordering::Acquire));
            // Store and queue are updated under the same lock so that list
            // order always matches execution order.
            self.shared.store.insert(job);
            pending.push_back(job_id);
            ahead
        };
        self.shared.wake.notify_one();

        tracing::info!(%job_id, jobs_ahead, "Job queued");
        Ok(Receipt { job_id, jobs_ahead })
    }

    /// Jobs waiting to start.
    pub fn len(&self) -> usize {
        self.pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    fn pending(&self) -> MutexGuard<'_, VecDeque<JobId>> {
        self.shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn try_next(&self) -> Option<JobId> {
        let mut pending = self.pending();
        let job_id = pending.pop_front()?;
        self.shared.busy.store(true, Ordering::Release);
        Some(job_id)
    }

    /// Wait for the next job id. A wake-up sent while the queue was being
    /// checked is kept by `Notify`, so none is lost.
    async fn next(&self) -> JobId {
        loop {
            if let Some(job_id) = self.try_next() {
                return job_id;
            }
            self.shared.wake.notified().await;
        }
    }

    fn set_idle(&self) {
        self.shared.busy.store(false, Ordering::Release);
    }

    fn attach_worker(&self) -> Result<(), QueueError> {
        self.shared
            .worker_attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| QueueError::WorkerAttached)
    }
}

/// Owns the worker task. A queue accepts exactly one worker for its whole
/// life. Dropping it leaves the task running; call
/// [`shutdown`](Self::shutdown) to stop it.
pub struct Worker {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl Worker {
    pub fn spawn<G, P, L>(
        queue: JobQueue,
        dispatcher: Dispatcher<G>,
        prompts: P,
        journal: L,
    ) -> Result<Self, QueueError>
    where
        G: ImageGenerator,
        P: PromptSource,
        L: JobLog,
    {
        queue.attach_worker()?;
        let shutdown = queue.shared.shutdown.clone();
        let runner = Runner {
            queue,
            dispatcher,
            prompts: Arc::new(prompts),
            journal,
        };
        Ok(Self {
            shutdown,
            handle: tokio::spawn(runner.run()),
        })
    }

    /// Stop taking jobs, let the running one finish, and wait for the task.
    /// Jobs still queued stay Pending.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Job worker ended abnormally");
        }
    }
}

struct Runner<G, P, L> {
    queue: JobQueue,
    dispatcher: Dispatcher<G>,
    prompts: Arc<P>,
    journal: L,
}

impl<G, P, L> Runner<G, P, L>
where
    G: ImageGenerator,
    P: PromptSource,
    L: JobLog,
{
    async fn run(self) {
        tracing::info!(endpoints = self.dispatcher.endpoints().len(), "Job worker started");
        loop {
            let job_id = tokio::select! {
                biased;
                _ = self.queue.shared.shutdown.cancelled() => break,
                job_id = self.queue.next() => job_id,
            };
            self.process(job_id).await;
            self.queue.set_idle();
        }
        tracing::info!(pending = self.queue.len(), "Job worker stopped");
    }

    async fn process(&self, job_id: JobId) {
        let store = self.queue.store();
        let job = match store.mark_running(job_id, self.dispatcher.endpoints()) {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(%job_id, error = %e, "Skipping job");
                return;
            }
        };
        tracing::info!(%job_id, "Job started");

        // Run in a separate task so that a panic anywhere in prompt
        // resolution or dispatch fails this job instead of the worker.
        let execution = tokio::spawn(execute(
            job,
            self.dispatcher.clone(),
            Arc::clone(&self.prompts),
            store.clone(),
        ));
        let recorded = match execution.await {
            Ok(result) => store.finish(job_id, result),
            Err(e) => {
                tracing::error!(%job_id, error = %e, "Job execution faulted");
                store.fail(job_id, INTERNAL_ERROR)
            }
        };

        // Built from the terminal snapshot; the store may already be cleared.
        let finished = match recorded {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(%job_id, error = %e, "Could not record job outcome");
                return;
            }
        };
        tracing::info!(%job_id, status = %finished.status, "Job finished");
        if let Err(e) = self.journal.append(&LogRecord::from_job(&finished)).await {
            tracing::warn!(%job_id, error = %e, "Failed to append job log");
        }
    }
}

async fn execute<G, P>(job: Job, dispatcher: Dispatcher<G>, prompts: Arc<P>, store: JobStore) -> JobResult
where
    G: ImageGenerator,
    P: PromptSource,
{
    let resolved = resolve_prompts(&job.submission, dispatcher.endpoints(), prompts.as_ref()).await;
    if let Err(e) = store.set_prompts(job.id, &resolved.prompts, resolved.origin) {
        tracing::warn!(job_id = %job.id, error = %e, "Could not record prompts");
    }

    dispatcher
        .run(&resolved.prompts, &job.submission.params, |index, result| {
            if let Err(e) = store.record_endpoint(job.id, index, result) {
                tracing::warn!(job_id = %job.id, error = %e, "Could not record endpoint progress");
            }
        })
        .await
}
