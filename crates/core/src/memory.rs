//! Memory traits: long-lived facts about the user.
//!
//! Memories are extracted from user messages, produced by compaction
//! summaries, and recalled into the planning prompt.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MemoryError;
use crate::message::ChatRecord;

/// A single memory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique ID for this memory (empty → assigned on store)
    pub id: String,

    /// Whose memory this is
    pub user_id: String,

    /// The content of the memory
    pub content: String,

    /// Tags for categorization ("preference", "summary", ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Source of the memory (message ID, conversation ID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// When this memory was created
    pub created_at: DateTime<Utc>,

    /// Relevance score (set by search operations)
    #[serde(default)]
    pub score: f32,
}

impl MemoryEntry {
    pub fn new(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            content: content.into(),
            tags: Vec::new(),
            source: None,
            created_at: Utc::now(),
            score: 0.0,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// A query for searching memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryQuery {
    /// Restrict to one user's memories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// The search text (keyword match)
    pub text: String,

    /// Maximum number of results
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Filter by tags
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_limit() -> usize {
    10
}

impl MemoryQuery {
    pub fn for_user(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            text: text.into(),
            limit: default_limit(),
            tags: Vec::new(),
        }
    }
}

/// Keyword relevance shared by the in-process backends.
pub fn keyword_score(content: &str, query: &str) -> f32 {
    let content = content.to_lowercase();
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .filter(|t| t.len() > 1)
        .collect();
    if terms.is_empty() {
        return 0.0;
    }
    let hits = terms.iter().filter(|t| content.contains(t.as_str())).count();
    hits as f32 / terms.len() as f32
}

/// The memory store collaborator.
///
/// Implementations: in-memory (tests, ephemeral), SQLite.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Store a new memory entry, returning its ID.
    async fn store(&self, entry: MemoryEntry) -> Result<String, MemoryError>;

    /// The most recent memories for a user, newest first.
    async fn list(&self, user_id: &str, limit: usize) -> Result<Vec<MemoryEntry>, MemoryError>;

    /// Search memories by keyword, best match first.
    async fn search(&self, query: MemoryQuery) -> Result<Vec<MemoryEntry>, MemoryError>;

    /// Delete a memory by ID.
    async fn delete(&self, id: &str) -> Result<bool, MemoryError>;

    /// Get total memory count.
    async fn count(&self) -> Result<usize, MemoryError>;
}

/// What the extractor found in one message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub extracted: Vec<MemoryEntry>,
    pub skipped: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ExtractionOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            extracted: Vec::new(),
            skipped: true,
            reason: Some(reason.into()),
        }
    }
}

/// Turns a user message into zero or more memories. Does not store them.
#[async_trait]
pub trait MemoryExtractor: Send + Sync {
    async fn extract_from_message(
        &self,
        message: &ChatRecord,
    ) -> Result<ExtractionOutcome, MemoryError>;
}
