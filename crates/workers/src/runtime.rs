//! Worker runtime: in-memory job queue and executor.
//!
//! Each enqueued job gets its own spawned dispatch task. The job list is the
//! single source of truth: dispatch re-checks it under the lock before
//! starting, so a job cancelled while queued never runs.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use futures::FutureExt;
use hearth_core::context::ToolExecutionContext;
use hearth_core::error::{WorkerError, panic_message};
use hearth_core::event::{DomainEvent, EventBus};
use hearth_core::job::{Job, JobScheduler, JobStatus};
use serde_json::Value;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, info, warn};

use crate::worker::{Worker, WorkerInfo};

struct JobEntry {
    job: Job,
    status_tx: watch::Sender<JobStatus>,
}

struct Inner {
    bus: Arc<EventBus>,
    workers: RwLock<BTreeMap<String, Arc<dyn Worker>>>,
    jobs: Mutex<Vec<JobEntry>>,
    limiter: Option<Arc<Semaphore>>,
}

/// Runs background jobs on registered workers.
///
/// Cloning is cheap; clones share the same queue.
#[derive(Clone)]
pub struct WorkerRuntime {
    inner: Arc<Inner>,
}

impl WorkerRuntime {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            inner: Arc::new(Inner {
                bus,
                workers: RwLock::new(BTreeMap::new()),
                jobs: Mutex::new(Vec::new()),
                limiter: None,
            }),
        }
    }

    /// Cap the number of jobs executing at once. `None` or `0` means no cap.
    pub fn with_max_concurrency(bus: Arc<EventBus>, max_concurrent: Option<usize>) -> Self {
        let limiter = max_concurrent
            .filter(|n| *n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));
        Self {
            inner: Arc::new(Inner {
                bus,
                workers: RwLock::new(BTreeMap::new()),
                jobs: Mutex::new(Vec::new()),
                limiter,
            }),
        }
    }

    pub fn register_worker(&self, worker: Arc<dyn Worker>) -> Result<(), WorkerError> {
        let name = worker.name().to_string();
        let mut workers = self
            .inner
            .workers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if workers.contains_key(&name) {
            return Err(WorkerError::DuplicateName(name));
        }
        debug!(worker = %name, "Registered worker");
        workers.insert(name, worker);
        Ok(())
    }

    /// Registered worker descriptors, sorted by name.
    pub fn workers(&self) -> Vec<WorkerInfo> {
        self.inner
            .workers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|w| WorkerInfo::of(w.as_ref()))
            .collect()
    }

    /// Queue a job and start dispatching it in the background.
    ///
    /// Returns the queued snapshot without waiting for execution.
    pub async fn enqueue(
        &self,
        worker: &str,
        args: Value,
        ctx: ToolExecutionContext,
    ) -> Result<Job, WorkerError> {
        let handler = self
            .inner
            .workers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(worker)
            .cloned()
            .ok_or_else(|| WorkerError::UnknownWorker(worker.to_string()))?;

        let job = Job::new(worker, args, ctx);
        let (status_tx, _) = watch::channel(job.status);
        self.inner.lock_jobs().push(JobEntry {
            job: job.clone(),
            status_tx,
        });
        info!(job_id = %job.id, worker = %worker, "Job queued");

        self.inner
            .bus
            .publish(DomainEvent::JobUpdated { job: job.clone() })
            .await;

        tokio::spawn(self.inner.clone().dispatch(job.id.clone(), handler));
        Ok(job)
    }

    /// All jobs in creation order.
    pub fn list_jobs(&self) -> Vec<Job> {
        self.inner
            .lock_jobs()
            .iter()
            .map(|e| e.job.clone())
            .collect()
    }

    pub fn get_job(&self, id: &str) -> Option<Job> {
        self.inner
            .lock_jobs()
            .iter()
            .find(|e| e.job.id == id)
            .map(|e| e.job.clone())
    }

    /// Remove a job that has not started yet. Running and finished jobs are
    /// left alone and `false` is returned.
    pub async fn cancel_job(&self, id: &str) -> bool {
        let removed = {
            let mut jobs = self.inner.lock_jobs();
            match jobs.iter().position(|e| e.job.id == id) {
                Some(pos) if jobs[pos].job.status == JobStatus::Queued => {
                    Some(jobs.remove(pos).job)
                }
                _ => None,
            }
        };

        let Some(job) = removed else {
            return false;
        };
        info!(job_id = %job.id, worker = %job.worker, "Job cancelled");
        self.inner
            .bus
            .publish(DomainEvent::log(
                "info",
                format!("job {} ({}) cancelled", job.id, job.worker),
            ))
            .await;
        true
    }

    /// Wait until the job completes or fails.
    ///
    /// Returns `None` if the job is unknown or gets cancelled.
    pub async fn wait_for(&self, id: &str) -> Option<Job> {
        let mut rx = self
            .inner
            .lock_jobs()
            .iter()
            .find(|e| e.job.id == id)?
            .status_tx
            .subscribe();

        loop {
            if rx.borrow_and_update().is_terminal() {
                return self.get_job(id);
            }
            if rx.changed().await.is_err() {
                // Sender dropped: the job was removed from the list.
                return None;
            }
        }
    }
}

impl Inner {
    fn lock_jobs(&self) -> std::sync::MutexGuard<'_, Vec<JobEntry>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a lifecycle transition and return the new snapshot, or `None`
    /// if the job is gone or the transition is not allowed.
    fn transition(&self, id: &str, next: JobStatus, apply: impl FnOnce(&mut Job)) -> Option<Job> {
        let mut jobs = self.lock_jobs();
        let entry = jobs.iter_mut().find(|e| e.job.id == id)?;
        if !entry.job.transition(next) {
            return None;
        }
        apply(&mut entry.job);
        Some(entry.job.clone())
    }

    /// Publish the snapshot, then wake `wait_for` callers.
    async fn announce(&self, job: Job) {
        let (id, status) = (job.id.clone(), job.status);
        self.bus.publish(DomainEvent::JobUpdated { job }).await;
        if let Some(entry) = self.lock_jobs().iter().find(|e| e.job.id == id) {
            entry.status_tx.send_replace(status);
        }
    }

    fn record_attempt(&self, id: &str, attempt: u32) {
        if let Some(entry) = self.lock_jobs().iter_mut().find(|e| e.job.id == id) {
            entry.job.attempts = attempt;
        }
    }

    async fn dispatch(self: Arc<Self>, id: String, worker: Arc<dyn Worker>) {
        let _permit = match &self.limiter {
            Some(limiter) => match limiter.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => return,
            },
            None => None,
        };

        // Checked under the lock together with the transition: a job that was
        // cancelled while queued is no longer in the list.
        let Some(running) = self.transition(&id, JobStatus::Running, |_| {}) else {
            debug!(job_id = %id, "Job cancelled before dispatch");
            return;
        };
        self.announce(running.clone()).await;

        let max_attempts = worker.max_retries().saturating_add(1);
        let mut outcome = Err(String::new());
        for attempt in 1..=max_attempts {
            self.record_attempt(&id, attempt);
            let result = AssertUnwindSafe(worker.execute(running.args.clone(), &running.context))
                .catch_unwind()
                .await;
            outcome = match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(e.to_string()),
                Err(payload) => Err(format!(
                    "worker panicked: {}",
                    panic_message(payload.as_ref())
                )),
            };
            match &outcome {
                Ok(_) => break,
                Err(error) => warn!(
                    job_id = %id,
                    worker = %running.worker,
                    attempt,
                    max_attempts,
                    %error,
                    "Job attempt failed"
                ),
            }
        }

        let finished = match outcome {
            Ok(value) => self.transition(&id, JobStatus::Completed, |job| {
                job.result = Some(value);
                job.error = None;
            }),
            Err(error) => self.transition(&id, JobStatus::Failed, |job| {
                job.error = Some(error);
            }),
        };

        if let Some(job) = finished {
            info!(job_id = %job.id, worker = %job.worker, status = %job.status, "Job finished");
            self.announce(job).await;
        }
    }
}

#[async_trait]
impl JobScheduler for WorkerRuntime {
    async fn enqueue(
        &self,
        worker: &str,
        args: Value,
        ctx: ToolExecutionContext,
    ) -> Result<Job, WorkerError> {
        WorkerRuntime::enqueue(self, worker, args, ctx).await
    }

    fn list_jobs(&self) -> Vec<Job> {
        WorkerRuntime::list_jobs(self)
    }

    async fn cancel_job(&self, id: &str) -> bool {
        WorkerRuntime::cancel_job(self, id).await
    }
}
