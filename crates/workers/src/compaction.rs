//! Memory compaction: summarize older conversation turns into a memory.
//!
//! [`MessageCountPolicy`] decides when a conversation has grown enough to
//! compact and queues a [`MemoryCompactionWorker`] job for it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use hearth_core::compaction::{CompactionMode, CompactionPolicy, TriggerDecision, TriggerPriority};
use hearth_core::context::ToolExecutionContext;
use hearth_core::error::WorkerError;
use hearth_core::event::{DomainEvent, EventBus};
use hearth_core::job::JobScheduler;
use hearth_core::memory::{MemoryBackend, MemoryEntry};
use hearth_core::message::Message;
use hearth_core::provider::{Provider, ProviderRequest};
use hearth_core::store::ConversationStore;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::worker::{Worker, WorkerPriority};

pub const COMPACTION_WORKER: &str = "memory_compaction";

const SUMMARY_PROMPT: &str = "You condense chat transcripts into durable notes about the user. \
Write a short plain-text summary of the facts, preferences, plans and open questions in the \
transcript. Do not invent details. Do not address the user.";

/// Summarizes the older part of a conversation and stores the summary as
/// a `summary`-tagged memory for the user.
///
/// Args: `{"conversation_id"?: string, "mode"?: "incremental" | "full"}`.
/// The conversation defaults to the one in the job context.
pub struct MemoryCompactionWorker {
    store: Arc<dyn ConversationStore>,
    memory: Arc<dyn MemoryBackend>,
    provider: Arc<dyn Provider>,
    bus: Arc<EventBus>,
    model: String,
    keep_recent: usize,
    /// Messages already covered by a summary, per conversation.
    compacted: Mutex<HashMap<String, usize>>,
}

impl MemoryCompactionWorker {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        memory: Arc<dyn MemoryBackend>,
        provider: Arc<dyn Provider>,
        bus: Arc<EventBus>,
        model: impl Into<String>,
        keep_recent: usize,
    ) -> Self {
        Self {
            store,
            memory,
            provider,
            bus,
            model: model.into(),
            keep_recent,
            compacted: Mutex::new(HashMap::new()),
        }
    }

    fn parse_mode(args: &Value) -> Result<CompactionMode, WorkerError> {
        match args.get("mode") {
            None | Some(Value::Null) => Ok(CompactionMode::default()),
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|_| WorkerError::InvalidArguments(format!("unknown compaction mode: {v}"))),
        }
    }

    fn already_compacted(&self, conversation_id: &str) -> usize {
        self.compacted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conversation_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Worker for MemoryCompactionWorker {
    fn name(&self) -> &str {
        COMPACTION_WORKER
    }

    fn category(&self) -> &str {
        "memory"
    }

    fn priority(&self) -> WorkerPriority {
        WorkerPriority::Low
    }

    fn max_retries(&self) -> u32 {
        1
    }

    async fn execute(&self, args: Value, ctx: &ToolExecutionContext) -> Result<Value, WorkerError> {
        let conversation_id = args["conversation_id"]
            .as_str()
            .unwrap_or(&ctx.conversation_id)
            .to_string();
        let mode = Self::parse_mode(&args)?;

        let total = self
            .store
            .count(&conversation_id)
            .await
            .map_err(|e| WorkerError::Failed(format!("failed to count messages: {e}")))?;
        let messages = self
            .store
            .list_recent(&conversation_id, total)
            .await
            .map_err(|e| WorkerError::Failed(format!("failed to load conversation: {e}")))?;

        let end = messages.len().saturating_sub(self.keep_recent);
        let start = match mode {
            CompactionMode::Full => 0,
            CompactionMode::Incremental => self.already_compacted(&conversation_id).min(end),
        };
        let window = &messages[start..end];
        if window.is_empty() {
            debug!(conversation_id = %conversation_id, "Nothing to compact");
            return Ok(json!({ "compacted": 0, "skipped": true }));
        }

        let transcript: String = window
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let mut request = ProviderRequest::new(
            &self.model,
            vec![Message::system(SUMMARY_PROMPT), Message::user(transcript)],
        );
        request.temperature = 0.2;
        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| WorkerError::Failed(format!("summarization failed: {e}")))?;
        let summary = response.message.content.trim().to_string();
        if summary.is_empty() {
            return Err(WorkerError::Failed("summarization returned no text".into()));
        }

        let entry = MemoryEntry::new(&ctx.user_id, summary)
            .with_tag("summary")
            .with_source(&conversation_id);
        let memory_id = self
            .memory
            .store(entry)
            .await
            .map_err(|e| WorkerError::Failed(format!("failed to store summary: {e}")))?;

        self.compacted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(conversation_id.clone(), end);

        self.bus
            .publish(DomainEvent::MemoryUpdated {
                user_id: ctx.user_id.clone(),
                conversation_id: conversation_id.clone(),
                extracted: 1,
                skipped: false,
                reason: Some("compaction".into()),
                timestamp: Utc::now(),
            })
            .await;

        info!(
            conversation_id = %conversation_id,
            compacted = window.len(),
            "Conversation compacted"
        );
        Ok(json!({
            "memory_id": memory_id,
            "compacted": window.len(),
            "mode": mode,
        }))
    }
}

/// Triggers compaction once `threshold` messages have accumulated since the
/// last trigger for a conversation.
pub struct MessageCountPolicy {
    store: Arc<dyn ConversationStore>,
    scheduler: Arc<dyn JobScheduler>,
    threshold: usize,
    last_triggered: Mutex<HashMap<String, usize>>,
}

impl MessageCountPolicy {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        scheduler: Arc<dyn JobScheduler>,
        threshold: usize,
    ) -> Self {
        Self {
            store,
            scheduler,
            threshold: threshold.max(1),
            last_triggered: Mutex::new(HashMap::new()),
        }
    }

    fn since_last(&self, conversation_id: &str, count: usize) -> usize {
        let last = self
            .last_triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conversation_id)
            .copied()
            .unwrap_or(0);
        count.saturating_sub(last)
    }
}

#[async_trait]
impl CompactionPolicy for MessageCountPolicy {
    async fn should_trigger(
        &self,
        conversation_id: &str,
        _ctx: &ToolExecutionContext,
    ) -> TriggerDecision {
        let count = match self.store.count(conversation_id).await {
            Ok(count) => count,
            Err(e) => return TriggerDecision::skip(format!("message count unavailable: {e}")),
        };

        let pending = self.since_last(conversation_id, count);
        if pending < self.threshold {
            return TriggerDecision::skip(format!(
                "{pending} of {} messages since last compaction",
                self.threshold
            ));
        }

        TriggerDecision {
            should_trigger: true,
            reason: format!("{pending} messages since last compaction"),
            priority: if pending >= self.threshold * 2 {
                TriggerPriority::High
            } else {
                TriggerPriority::Normal
            },
        }
    }

    async fn trigger(
        &self,
        conversation_id: &str,
        ctx: &ToolExecutionContext,
        mode: CompactionMode,
    ) -> Result<String, WorkerError> {
        let count = self
            .store
            .count(conversation_id)
            .await
            .map_err(|e| WorkerError::Failed(format!("message count unavailable: {e}")))?;

        // Claim this point before enqueueing so a concurrent caller sees it.
        let previous = {
            let mut last = self
                .last_triggered
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let previous = last.get(conversation_id).copied().unwrap_or(0);
            if count <= previous {
                return Err(WorkerError::Failed(format!(
                    "compaction already queued at {previous} messages"
                )));
            }
            last.insert(conversation_id.to_string(), count);
            previous
        };

        match self
            .scheduler
            .enqueue(
                COMPACTION_WORKER,
                json!({ "conversation_id": conversation_id, "mode": mode }),
                ctx.clone(),
            )
            .await
        {
            Ok(job) => Ok(job.id),
            Err(e) => {
                let mut last = self
                    .last_triggered
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if last.get(conversation_id) == Some(&count) {
                    last.insert(conversation_id.to_string(), previous);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkerRuntime;
    use hearth_core::error::ProviderError;
    use hearth_core::job::JobStatus;
    use hearth_core::message::{ChatRecord, SourceDescriptor, SourceMessage};
    use hearth_core::provider::ProviderResponse;
    use hearth_memory::InMemoryStore;

    /// Echoes the number of transcript lines it was asked to summarize.
    struct LineCountProvider;

    #[async_trait]
    impl Provider for LineCountProvider {
        fn name(&self) -> &str {
            "lines"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            let lines = request.messages[1].content.lines().count();
            Ok(ProviderResponse {
                message: Message::assistant(format!("Summary of {lines} messages")),
                usage: None,
                model: request.model,
            })
        }
    }

    async fn seeded_store(n: usize) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..n {
            let msg = SourceMessage::new(SourceDescriptor::cli(), "u1", "c1", format!("msg {i}"));
            store.save(ChatRecord::from_source(&msg)).await.unwrap();
        }
        store
    }

    fn ctx() -> ToolExecutionContext {
        ToolExecutionContext::new("u1", "c1", SourceDescriptor::cli())
    }

    fn worker(store: Arc<InMemoryStore>, bus: Arc<EventBus>) -> MemoryCompactionWorker {
        MemoryCompactionWorker::new(
            store.clone(),
            store,
            Arc::new(LineCountProvider),
            bus,
            "test-model",
            2,
        )
    }

    #[tokio::test]
    async fn compacts_all_but_recent() {
        let store = seeded_store(6).await;
        let bus = Arc::new(EventBus::default());
        let worker = worker(store.clone(), bus);

        let out = worker.execute(json!({}), &ctx()).await.unwrap();
        assert_eq!(out["compacted"], 4);

        let memories = store.list("u1", 10).await.unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].content, "Summary of 4 messages");
        assert_eq!(memories[0].tags, vec!["summary".to_string()]);
    }

    #[tokio::test]
    async fn incremental_skips_already_compacted() {
        let store = seeded_store(6).await;
        let bus = Arc::new(EventBus::default());
        let worker = worker(store.clone(), bus);

        worker.execute(json!({}), &ctx()).await.unwrap();
        let again = worker.execute(json!({}), &ctx()).await.unwrap();
        assert_eq!(again["skipped"], true);

        let full = worker
            .execute(json!({"mode": "full"}), &ctx())
            .await
            .unwrap();
        assert_eq!(full["compacted"], 4);
    }

    #[tokio::test]
    async fn bad_mode_is_invalid() {
        let store = seeded_store(1).await;
        let worker = worker(store, Arc::new(EventBus::default()));
        let err = worker
            .execute(json!({"mode": "sideways"}), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn policy_triggers_at_threshold_and_resets() {
        let store = seeded_store(3).await;
        let bus = Arc::new(EventBus::default());
        let runtime = Arc::new(WorkerRuntime::new(bus.clone()));
        runtime
            .register_worker(Arc::new(worker(store.clone(), bus)))
            .unwrap();
        let policy = MessageCountPolicy::new(store.clone(), runtime.clone(), 4);

        assert!(!policy.should_trigger("c1", &ctx()).await.should_trigger);

        let msg = SourceMessage::new(SourceDescriptor::cli(), "u1", "c1", "one more");
        store.save(ChatRecord::from_source(&msg)).await.unwrap();
        let decision = policy.should_trigger("c1", &ctx()).await;
        assert!(decision.should_trigger);
        assert_eq!(decision.priority, TriggerPriority::Normal);

        let job_id = policy
            .trigger("c1", &ctx(), CompactionMode::Incremental)
            .await
            .unwrap();
        let done = runtime.wait_for(&job_id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.worker, COMPACTION_WORKER);

        assert!(!policy.should_trigger("c1", &ctx()).await.should_trigger);
    }

    #[tokio::test]
    async fn second_trigger_at_same_point_is_refused() {
        let store = seeded_store(4).await;
        let bus = Arc::new(EventBus::default());
        let runtime = Arc::new(WorkerRuntime::new(bus.clone()));
        runtime
            .register_worker(Arc::new(worker(store.clone(), bus)))
            .unwrap();
        let policy = MessageCountPolicy::new(store.clone(), runtime.clone(), 2);

        policy
            .trigger("c1", &ctx(), CompactionMode::Incremental)
            .await
            .unwrap();
        let again = policy.trigger("c1", &ctx(), CompactionMode::Full).await;
        assert!(matches!(again, Err(WorkerError::Failed(_))));
        assert_eq!(runtime.list_jobs().len(), 1);
    }

    #[tokio::test]
    async fn failed_enqueue_releases_the_claim() {
        let store = seeded_store(4).await;
        let runtime = Arc::new(WorkerRuntime::new(Arc::new(EventBus::default())));
        let policy = MessageCountPolicy::new(store.clone(), runtime, 2);

        let err = policy
            .trigger("c1", &ctx(), CompactionMode::Incremental)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::UnknownWorker(_)));
        assert!(policy.should_trigger("c1", &ctx()).await.should_trigger);
    }
}
