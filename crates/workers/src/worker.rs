//! Worker trait: a named handler for background jobs.

use async_trait::async_trait;
use hearth_core::context::ToolExecutionContext;
use hearth_core::error::WorkerError;
use serde::{Deserialize, Serialize};

/// Scheduling hint. The runtime does not reorder by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// A background task handler. Registered once; one instance per name.
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    /// Grouping label for listings (e.g., "memory").
    fn category(&self) -> &str {
        "general"
    }

    fn priority(&self) -> WorkerPriority {
        WorkerPriority::Normal
    }

    /// Extra attempts after the first failure.
    fn max_retries(&self) -> u32 {
        0
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, WorkerError>;
}

/// Descriptor returned by [`crate::WorkerRuntime::workers`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub name: String,
    pub category: String,
    pub priority: WorkerPriority,
    pub max_retries: u32,
}

impl WorkerInfo {
    pub fn of(worker: &dyn Worker) -> Self {
        Self {
            name: worker.name().to_string(),
            category: worker.category().to_string(),
            priority: worker.priority(),
            max_retries: worker.max_retries(),
        }
    }
}
