//! Compaction trigger policy collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::ToolExecutionContext;
use crate::error::WorkerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompactionMode {
    /// Summarize only what accumulated since the last run
    #[default]
    Incremental,
    /// Summarize everything except the most recent messages
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerPriority {
    #[default]
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerDecision {
    pub should_trigger: bool,
    pub reason: String,
    pub priority: TriggerPriority,
}

impl TriggerDecision {
    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            should_trigger: false,
            reason: reason.into(),
            priority: TriggerPriority::Low,
        }
    }
}

/// Decides when a conversation should be compacted and starts it.
#[async_trait]
pub trait CompactionPolicy: Send + Sync {
    async fn should_trigger(
        &self,
        conversation_id: &str,
        ctx: &ToolExecutionContext,
    ) -> TriggerDecision;

    /// Start compaction; returns the ID of the queued job.
    async fn trigger(
        &self,
        conversation_id: &str,
        ctx: &ToolExecutionContext,
        mode: CompactionMode,
    ) -> Result<String, WorkerError>;
}
