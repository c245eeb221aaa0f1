//! Conversation persistence collaborator.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::{ChatRecord, Conversation};

/// Stores conversation headers and their messages.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create the conversation if it does not exist yet; refreshes
    /// `updated_at` otherwise.
    async fn add(&self, conversation: Conversation) -> Result<(), StoreError>;

    /// Persist one message. A second save with the same ID fails with
    /// [`StoreError::Duplicate`].
    async fn save(&self, message: ChatRecord) -> Result<(), StoreError>;

    /// The `limit` most recent messages, oldest first.
    async fn list_recent(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatRecord>, StoreError>;

    /// Number of messages stored for a conversation.
    async fn count(&self, conversation_id: &str) -> Result<usize, StoreError>;
}
