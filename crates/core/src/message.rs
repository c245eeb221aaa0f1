//! Message and conversation domain types.
//!
//! These are the value objects that flow through the pipeline:
//! a source adapter produces a [`SourceMessage`] → the planner answers with an
//! [`AssistantMessage`] → both are persisted as [`ChatRecord`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The assistant
    Assistant,
    /// System instructions (persona, tool catalog)
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single prompt message sent to the language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }
}

/// The kind of channel a message arrived on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// The web chat GUI
    WebChat,
    /// Scheduled prompts
    Scheduler,
    /// The terminal
    Cli,
    /// Direct API callers
    Api,
    #[serde(other)]
    Other,
}

/// Where an inbound message came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub kind: SourceKind,

    /// Human-readable label (e.g. "browser tab", "morning briefing")
    pub label: String,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl SourceDescriptor {
    pub fn new(kind: SourceKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn cli() -> Self {
        Self::new(SourceKind::Cli, "terminal")
    }
}

/// An inbound user utterance. Consumed exactly once by the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMessage {
    pub id: String,
    pub source: SourceDescriptor,
    pub user_id: String,
    pub conversation_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,

    /// The payload as the source adapter received it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl SourceMessage {
    pub fn new(
        source: SourceDescriptor,
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source,
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            content: content.into(),
            created_at: Utc::now(),
            raw: None,
        }
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = Some(raw);
        self
    }
}

/// The planner's reply. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl AssistantMessage {
    pub fn new(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// A persisted conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatRecord {
    /// The record for an inbound user message.
    pub fn from_source(msg: &SourceMessage) -> Self {
        Self {
            id: msg.id.clone(),
            conversation_id: msg.conversation_id.clone(),
            user_id: msg.user_id.clone(),
            role: Role::User,
            content: msg.content.clone(),
            created_at: msg.created_at,
        }
    }

    /// The record for a reply addressed to `user_id`.
    pub fn from_reply(reply: &AssistantMessage, user_id: &str) -> Self {
        Self {
            id: reply.id.clone(),
            conversation_id: reply.conversation_id.clone(),
            user_id: user_id.to_string(),
            role: reply.role,
            content: reply.content.clone(),
            created_at: reply.created_at,
        }
    }

    /// Convert to a prompt message, keeping role and content.
    pub fn to_prompt_message(&self) -> Message {
        Message {
            id: self.id.clone(),
            role: self.role,
            content: self.content.clone(),
            timestamp: self.created_at,
        }
    }
}

/// Conversation header row; messages are stored separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id: user_id.into(),
            title: None,
            created_at: now,
            updated_at: now,
        }
    }
}
