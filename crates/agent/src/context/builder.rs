//! Builds the planning prompt for one inbound message.

use std::sync::Arc;

use hearth_core::memory::{MemoryBackend, MemoryEntry};
use hearth_core::message::{ChatRecord, SourceMessage};
use hearth_core::provider::ToolDefinition;
use hearth_core::store::ConversationStore;
use tracing::{debug, warn};

use crate::prompts;

/// The assembled prompt inputs, ready for a provider call.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// Persona, memories, tool catalog and response contract.
    pub system_prompt: String,
    /// Recent conversation messages, oldest first. Excludes the message
    /// being answered.
    pub history: Vec<ChatRecord>,
    /// Memories that were rendered into the system prompt.
    pub memories: Vec<MemoryEntry>,
}

pub struct ContextBuilder {
    store: Arc<dyn ConversationStore>,
    memory: Arc<dyn MemoryBackend>,
    persona: String,
    history_limit: usize,
    memory_limit: usize,
}

impl ContextBuilder {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        memory: Arc<dyn MemoryBackend>,
        persona: impl Into<String>,
    ) -> Self {
        Self {
            store,
            memory,
            persona: persona.into(),
            history_limit: 12,
            memory_limit: 8,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = limit;
        self
    }

    /// The base persona prompt, without memories or tools.
    pub fn persona(&self) -> &str {
        &self.persona
    }

    /// Assemble the context for `msg`. `tools` should hold only enabled
    /// tools. Store failures leave the affected section empty.
    pub async fn build(&self, msg: &SourceMessage, tools: &[ToolDefinition]) -> AssembledContext {
        let history = match self
            .store
            .list_recent(&msg.conversation_id, self.history_limit)
            .await
        {
            Ok(records) => records.into_iter().filter(|r| r.id != msg.id).collect(),
            Err(e) => {
                warn!(
                    conversation_id = %msg.conversation_id,
                    message_id = %msg.id,
                    error = %e,
                    "Failed to load conversation history"
                );
                Vec::new()
            }
        };

        let memories = if self.memory_limit == 0 {
            Vec::new()
        } else {
            match self.memory.list(&msg.user_id, self.memory_limit).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(user_id = %msg.user_id, error = %e, "Failed to load memories");
                    Vec::new()
                }
            }
        };

        let mut sections = vec![self.persona.clone()];
        let memory_section = prompts::memory_section(&memories);
        if !memory_section.is_empty() {
            sections.push(memory_section);
        }
        sections.push(prompts::tool_section(tools));
        sections.push(prompts::PLAN_CONTRACT.to_string());

        debug!(
            conversation_id = %msg.conversation_id,
            history = history.len(),
            memories = memories.len(),
            tools = tools.len(),
            "Context assembled"
        );

        AssembledContext {
            system_prompt: sections.join("\n\n"),
            history,
            memories,
        }
    }
}
