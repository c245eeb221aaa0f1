//! Ambient data handed to every tool and worker invocation.

use serde::{Deserialize, Serialize};

use crate::message::{SourceDescriptor, SourceMessage};

/// Built per message; never persisted on its own (jobs carry a copy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecutionContext {
    pub user_id: String,
    pub conversation_id: String,
    pub source: SourceDescriptor,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ToolExecutionContext {
    pub fn new(
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        source: SourceDescriptor,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            source,
            metadata: serde_json::Map::new(),
        }
    }

    /// The context for processing `msg`; records the message id in metadata.
    pub fn from_source(msg: &SourceMessage) -> Self {
        let mut ctx = Self::new(&msg.user_id, &msg.conversation_id, msg.source.clone());
        ctx.metadata
            .insert("message_id".into(), serde_json::Value::String(msg.id.clone()));
        ctx
    }
}
