//! Store and memory implementations for Hearth.
//!
//! Every store here implements the collaborator traits from `hearth-core`:
//! `ConversationStore`, `MemoryBackend` and `ToolStateStore`.

pub mod extractor;
pub mod file_backend;
pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use extractor::PatternExtractor;
pub use file_backend::FileToolStateStore;
pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
