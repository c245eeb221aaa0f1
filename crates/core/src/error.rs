//! Error types for the Hearth domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] wraps them all.

use thiserror::Error;

/// The top-level error type for all Hearth operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Registry errors ---
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    // --- Worker errors ---
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures raised from inside a tool body.
///
/// The tool engine converts every variant to a `ToolResult` with
/// `ok == false` and `error == err.to_string()`.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// Free-form failure; displays as the bare message.
    #[error("{0}")]
    Failed(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{tool_name} is unavailable: {reason}")]
    Unavailable { tool_name: String, reason: String },
}

/// Tool registration and enablement failures.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("a tool named '{0}' is already registered")]
    DuplicateName(String),

    #[error("invalid tool name '{0}': must be non-empty with no surrounding whitespace")]
    InvalidName(String),

    #[error("no tool named '{0}' is registered")]
    NotFound(String),

    #[error("tool '{0}' is protected and cannot be disabled")]
    ProtectedTool(String),

    #[error("failed to persist tool state: {0}")]
    Persistence(String),
}

/// Worker registration, enqueue and execution failures.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    #[error("a worker named '{0}' is already registered")]
    DuplicateName(String),

    #[error("no worker named '{0}' is registered")]
    UnknownWorker(String),

    #[error("invalid job arguments: {0}")]
    InvalidArguments(String),

    /// Failure raised by a worker body; displays as the bare message.
    #[error("{0}")]
    Failed(String),
}

/// Conversation, message and tool-state persistence failures.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Returned by event handlers; the bus logs and swallows it.
#[derive(Debug, Clone, Error)]
#[error("event handler '{handler}' failed: {reason}")]
pub struct EventError {
    pub handler: String,
    pub reason: String,
}

impl EventError {
    pub fn new(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            reason: reason.into(),
        }
    }
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_reads_str_and_string() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 503,
            message: "model loading".into(),
        });
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("model loading"));
    }

    #[test]
    fn tool_failure_displays_bare_message() {
        assert_eq!(ToolError::Failed("boom".into()).to_string(), "boom");
        assert_eq!(WorkerError::Failed("disk full".into()).to_string(), "disk full");
    }

    #[test]
    fn registry_error_names_the_tool() {
        let err = RegistryError::ProtectedTool("registry".into());
        assert!(err.to_string().contains("registry"));
        assert!(err.to_string().contains("protected"));
    }
}
