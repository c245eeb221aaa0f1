//! Domain event system: decoupled communication between components.
//!
//! Producers (planner, tool engine, worker runtime) publish events; consumers
//! (socket broadcaster, logger) either subscribe a handler for one event kind
//! or tail the broadcast stream. Delivery is in-memory and best-effort.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::EventError;
use crate::job::Job;
use crate::message::Role;

/// Discriminant of [`DomainEvent`]; the key handlers subscribe on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MessageCreated,
    JobUpdated,
    MemoryUpdated,
    ToolExecute,
    ToolExecuted,
    Log,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::MessageCreated,
        EventKind::JobUpdated,
        EventKind::MemoryUpdated,
        EventKind::ToolExecute,
        EventKind::ToolExecuted,
        EventKind::Log,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MessageCreated => "message_created",
            EventKind::JobUpdated => "job_updated",
            EventKind::MemoryUpdated => "memory_updated",
            EventKind::ToolExecute => "tool_execute",
            EventKind::ToolExecuted => "tool_executed",
            EventKind::Log => "log",
        }
    }
}

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A user or assistant message was persisted
    MessageCreated {
        message_id: String,
        conversation_id: String,
        role: Role,
        content_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// A job was created or changed status
    JobUpdated { job: Job },

    /// Memory extraction or compaction ran for a user
    MemoryUpdated {
        user_id: String,
        conversation_id: String,
        extracted: usize,
        skipped: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A tool is about to run
    ToolExecute {
        tool: String,
        args: serde_json::Value,
        conversation_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A tool finished
    ToolExecuted {
        tool: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A log line forwarded to clients
    Log {
        level: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::MessageCreated { .. } => EventKind::MessageCreated,
            DomainEvent::JobUpdated { .. } => EventKind::JobUpdated,
            DomainEvent::MemoryUpdated { .. } => EventKind::MemoryUpdated,
            DomainEvent::ToolExecute { .. } => EventKind::ToolExecute,
            DomainEvent::ToolExecuted { .. } => EventKind::ToolExecuted,
            DomainEvent::Log { .. } => EventKind::Log,
        }
    }

    pub fn log(level: impl Into<String>, message: impl Into<String>) -> Self {
        DomainEvent::Log {
            level: level.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A subscriber for one event kind.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Used in failure logs.
    fn name(&self) -> &str {
        "handler"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), EventError>;
}

/// Adapts a synchronous closure into an [`EventHandler`].
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&DomainEvent) -> Result<(), EventError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            f,
        })
    }
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&DomainEvent) -> Result<(), EventError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), EventError> {
        (self.f)(event)
    }
}

/// Logs every event it receives at debug level.
pub struct EventLogger;

#[async_trait]
impl EventHandler for EventLogger {
    fn name(&self) -> &str {
        "event_logger"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), EventError> {
        match event {
            DomainEvent::JobUpdated { job } => {
                debug!(job_id = %job.id, worker = %job.worker, status = %job.status, "job_updated");
            }
            DomainEvent::ToolExecuted { tool, ok, duration_ms, .. } => {
                debug!(tool = %tool, ok, duration_ms, "tool_executed");
            }
            other => debug!(kind = other.kind().as_str(), "event"),
        }
        Ok(())
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type HandlerList = Vec<(SubscriptionId, Arc<dyn EventHandler>)>;

/// The process-wide publish/subscribe hub.
///
/// Handlers registered per [`EventKind`] are awaited one after another on
/// every publish; a failing or panicking handler never stops delivery to the
/// rest. Every event is also sent on a `tokio::sync::broadcast` channel for
/// stream consumers.
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, HandlerList>>,
    next_id: AtomicU64,
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus whose stream buffers `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            sender,
        }
    }

    /// Register a handler for one event kind.
    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, handler));
        id
    }

    /// Register one handler for every event kind.
    pub fn subscribe_all(&self, handler: Arc<dyn EventHandler>) -> Vec<(EventKind, SubscriptionId)> {
        EventKind::ALL
            .iter()
            .map(|kind| (*kind, self.subscribe(*kind, handler.clone())))
            .collect()
    }

    /// Remove one registration. Returns `false` if it was not found.
    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sid, _)| *sid != id);
        list.len() < before
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Deliver an event to every handler for its kind, then to the stream.
    ///
    /// Resolves once all handlers have settled.
    pub async fn publish(&self, event: DomainEvent) {
        let kind = event.kind();
        let handlers: HandlerList = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        for (_, handler) in handlers {
            let outcome = AssertUnwindSafe(handler.handle(&event)).catch_unwind().await;
            // Failures while delivering log events are dropped to avoid
            // feeding them back into the log stream.
            if kind == EventKind::Log {
                continue;
            }
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(event = kind.as_str(), error = %e, "Event handler failed"),
                Err(_) => warn!(
                    event = kind.as_str(),
                    handler = handler.name(),
                    "Event handler panicked"
                ),
            }
        }

        // No stream subscribers is fine.
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to the raw event stream.
    pub fn stream(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
