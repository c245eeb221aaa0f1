//! # Hearth Core
//!
//! Domain types, collaborator traits, and error definitions for the Hearth
//! assistant backend. This crate holds no I/O; it defines the model that all
//! other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator (language model, stores, extractor, compaction policy)
//! is a trait here. Implementations live in their own crates, and a
//! composition root wires concrete instances together. Nothing is a global.

pub mod compaction;
pub mod context;
pub mod error;
pub mod event;
pub mod job;
pub mod memory;
pub mod message;
pub mod provider;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use compaction::{CompactionMode, CompactionPolicy, TriggerDecision, TriggerPriority};
pub use context::ToolExecutionContext;
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus, EventHandler, EventKind, SubscriptionId};
pub use job::{Job, JobScheduler, JobStatus};
pub use memory::{ExtractionOutcome, MemoryBackend, MemoryEntry, MemoryExtractor, MemoryQuery};
pub use message::{
    AssistantMessage, ChatRecord, Conversation, Message, Role, SourceDescriptor, SourceKind,
    SourceMessage,
};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use store::ConversationStore;
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult, ToolStateStore, REGISTRY_TOOL};
