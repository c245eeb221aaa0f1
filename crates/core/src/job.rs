//! Background job model.
//!
//! A job moves `queued → running → (completed | failed)` and never goes
//! back. The worker runtime owns the job list; everyone else sees snapshots.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::ToolExecutionContext;
use crate::error::WorkerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` respects the lifecycle.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of background work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,

    /// Name of the worker that runs this job
    pub worker: String,

    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub args: serde_json::Value,
    pub context: ToolExecutionContext,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Number of times the worker body has been invoked
    #[serde(default)]
    pub attempts: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl Job {
    pub fn new(
        worker: impl Into<String>,
        args: serde_json::Value,
        context: ToolExecutionContext,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            worker: worker.into(),
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            args,
            context,
            error: None,
            attempts: 0,
            result: None,
        }
    }

    /// Move to `next`. Returns `false` and leaves the job untouched if the
    /// transition would skip or regress a state.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }
}

/// Scheduling surface used by tools that queue background work.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    async fn enqueue(
        &self,
        worker: &str,
        args: serde_json::Value,
        ctx: ToolExecutionContext,
    ) -> Result<Job, WorkerError>;

    fn list_jobs(&self) -> Vec<Job>;

    async fn cancel_job(&self, id: &str) -> bool;
}
