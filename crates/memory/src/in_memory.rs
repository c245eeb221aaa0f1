//! In-memory store: useful for testing and ephemeral sessions.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use hearth_core::error::{MemoryError, StoreError};
use hearth_core::memory::{MemoryBackend, MemoryEntry, MemoryQuery, keyword_score};
use hearth_core::message::{ChatRecord, Conversation};
use hearth_core::store::ConversationStore;
use hearth_core::tool::ToolStateStore;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct State {
    conversations: HashMap<String, Conversation>,
    messages: Vec<ChatRecord>,
    memories: Vec<MemoryEntry>,
    disabled_tools: BTreeSet<String>,
}

/// Keeps conversations, memories and tool state in process memory.
/// Nothing survives a restart.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn conversation(&self, id: &str) -> Option<Conversation> {
        self.state.read().await.conversations.get(id).cloned()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn add(&self, conversation: Conversation) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state
            .conversations
            .entry(conversation.id.clone())
            .and_modify(|c| c.updated_at = Utc::now())
            .or_insert(conversation);
        Ok(())
    }

    async fn save(&self, message: ChatRecord) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.messages.iter().any(|m| m.id == message.id) {
            return Err(StoreError::Duplicate(message.id));
        }
        state.messages.push(message);
        Ok(())
    }

    async fn list_recent(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatRecord>, StoreError> {
        let state = self.state.read().await;
        let matching: Vec<&ChatRecord> = state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .collect();
        let skip = matching.len().saturating_sub(limit);
        Ok(matching.into_iter().skip(skip).cloned().collect())
    }

    async fn count(&self, conversation_id: &str) -> Result<usize, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .count())
    }
}

#[async_trait]
impl MemoryBackend for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn store(&self, mut entry: MemoryEntry) -> Result<String, MemoryError> {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        let id = entry.id.clone();
        self.state.write().await.memories.push(entry);
        Ok(id)
    }

    async fn list(&self, user_id: &str, limit: usize) -> Result<Vec<MemoryEntry>, MemoryError> {
        let state = self.state.read().await;
        Ok(state
            .memories
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn search(&self, query: MemoryQuery) -> Result<Vec<MemoryEntry>, MemoryError> {
        let state = self.state.read().await;
        let mut results: Vec<MemoryEntry> = state
            .memories
            .iter()
            .filter(|e| query.user_id.as_deref().is_none_or(|u| e.user_id == u))
            .filter(|e| query.tags.is_empty() || query.tags.iter().any(|t| e.tags.contains(t)))
            .filter_map(|e| {
                let score = keyword_score(&e.content, &query.text);
                (score > 0.0).then(|| {
                    let mut hit = e.clone();
                    hit.score = score;
                    hit
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.created_at.cmp(&a.created_at))
        });
        results.truncate(query.limit);
        Ok(results)
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let mut state = self.state.write().await;
        let len_before = state.memories.len();
        state.memories.retain(|e| e.id != id);
        Ok(state.memories.len() < len_before)
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.state.read().await.memories.len())
    }
}

#[async_trait]
impl ToolStateStore for InMemoryStore {
    async fn enable_tool(&self, name: &str) -> Result<(), StoreError> {
        self.state.write().await.disabled_tools.remove(name);
        Ok(())
    }

    async fn disable_tool(&self, name: &str) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .disabled_tools
            .insert(name.to_string());
        Ok(())
    }

    async fn disabled_tools(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .disabled_tools
            .iter()
            .cloned()
            .collect())
    }
}
