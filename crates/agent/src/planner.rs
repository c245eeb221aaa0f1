//! The persona planner: one inbound message in, one reply out.
//!
//! Each message goes through context assembly, a planning call, and either a
//! direct answer or a tool call followed by a summarizer call. Any failure on
//! the way routes to plain chat, and a failing plain chat routes to an echo
//! reply, so [`PersonaPlanner::handle_source_message`] always produces a reply.
//! Persistence, memory extraction and compaction run after the reply is known
//! and never change it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use hearth_core::compaction::{CompactionMode, CompactionPolicy, TriggerPriority};
use hearth_core::context::ToolExecutionContext;
use hearth_core::error::{ProviderError, StoreError};
use hearth_core::event::{DomainEvent, EventBus};
use hearth_core::memory::{MemoryBackend, MemoryExtractor};
use hearth_core::message::{AssistantMessage, ChatRecord, Conversation, Message, SourceMessage};
use hearth_core::provider::{Provider, ProviderRequest};
use hearth_core::store::ConversationStore;
use hearth_core::tool::{ToolCall, ToolResult};
use hearth_tools::ToolEngine;
use tracing::{debug, info, warn};

use crate::context::ContextBuilder;
use crate::plan::{Plan, parse_plan};
use crate::prompts;

const PREVIEW_CHARS: usize = 120;

type ConversationLock = Arc<tokio::sync::Mutex<()>>;

pub struct PersonaPlanner {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    engine: Arc<ToolEngine>,
    context: ContextBuilder,
    store: Arc<dyn ConversationStore>,
    memory: Arc<dyn MemoryBackend>,
    extractor: Option<Arc<dyn MemoryExtractor>>,
    policy: Option<Arc<dyn CompactionPolicy>>,
    bus: Arc<EventBus>,
    serialize: bool,
    locks: Mutex<HashMap<String, ConversationLock>>,
}

impl PersonaPlanner {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        engine: Arc<ToolEngine>,
        store: Arc<dyn ConversationStore>,
        memory: Arc<dyn MemoryBackend>,
        bus: Arc<EventBus>,
        persona: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            engine,
            context: ContextBuilder::new(store.clone(), memory.clone(), persona),
            store,
            memory,
            extractor: None,
            policy: None,
            bus,
            serialize: true,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set how many history messages and memories go into the prompt.
    pub fn with_limits(mut self, history: usize, memories: usize) -> Self {
        self.context = self
            .context
            .with_history_limit(history)
            .with_memory_limit(memories);
        self
    }

    /// Extract memories from every user message.
    pub fn with_extractor(mut self, extractor: Arc<dyn MemoryExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Consult `policy` after every message and start compaction when asked.
    pub fn with_compaction_policy(mut self, policy: Arc<dyn CompactionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Process messages of the same conversation one at a time (default on).
    pub fn with_serialized_conversations(mut self, enabled: bool) -> Self {
        self.serialize = enabled;
        self
    }

    /// Answer one inbound message. Never fails.
    pub async fn handle_source_message(&self, msg: SourceMessage) -> AssistantMessage {
        let lock = self
            .serialize
            .then(|| self.conversation_lock(&msg.conversation_id));
        let guard = match &lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        info!(
            message_id = %msg.id,
            user_id = %msg.user_id,
            conversation_id = %msg.conversation_id,
            "Handling message"
        );

        let ctx = ToolExecutionContext::from_source(&msg);
        let content = self.reply_text(&msg, &ctx).await;
        let reply = AssistantMessage::new(&msg.conversation_id, content);
        self.post_process(&msg, &reply, &ctx).await;

        drop(guard);
        if lock.is_some() {
            drop(lock);
            self.release_lock(&msg.conversation_id);
        }
        reply
    }

    /// One model call with `system_prompt` and the raw user content.
    ///
    /// Returns the trimmed model output, or the echo reply if the call fails.
    pub async fn plain_chat(&self, system_prompt: &str, content: &str) -> String {
        let messages = vec![Message::system(system_prompt), Message::user(content)];
        match self.chat(messages).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "Plain chat failed, echoing message");
                prompts::last_resort_reply(&e.to_string(), content)
            }
        }
    }

    // ── Planning ──────────────────────────────────────────────────────────

    async fn reply_text(&self, msg: &SourceMessage, ctx: &ToolExecutionContext) -> String {
        let tools = self.engine.registry().enabled_definitions();
        let assembled = self.context.build(msg, &tools).await;

        let mut messages = Vec::with_capacity(assembled.history.len() + 2);
        messages.push(Message::system(&assembled.system_prompt));
        messages.extend(assembled.history.iter().map(ChatRecord::to_prompt_message));
        messages.push(Message::user(&msg.content));

        let raw = match self.chat(messages).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(message_id = %msg.id, error = %e, "Planning call failed");
                return self.fallback(&msg.content, &e.to_string()).await;
            }
        };

        let plan = match parse_plan(&raw) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(message_id = %msg.id, error = %e, "Unusable plan, falling back to plain chat");
                return self.fallback(&msg.content, &e.to_string()).await;
            }
        };

        match plan {
            Plan::Final { content } => {
                debug!(message_id = %msg.id, "Direct answer");
                content
            }
            Plan::ToolCall { tool, args } => {
                let result = self.engine.execute(ToolCall::new(&tool, args), ctx).await;
                debug!(message_id = %msg.id, tool = %tool, ok = result.ok, "Tool finished");
                match self.summarize(&msg.content, &tool, &result).await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(message_id = %msg.id, tool = %tool, error = %e, "Summarizer failed");
                        self.fallback(&msg.content, &e.to_string()).await
                    }
                }
            }
        }
    }

    async fn summarize(
        &self,
        content: &str,
        tool: &str,
        result: &ToolResult,
    ) -> Result<String, ProviderError> {
        let messages = vec![
            Message::system(prompts::summarizer_system(self.context.persona())),
            Message::user(prompts::summarizer_prompt(content, tool, result)),
        ];
        Ok(self.chat(messages).await?.trim().to_string())
    }

    async fn fallback(&self, content: &str, error: &str) -> String {
        let system = prompts::fallback_system(self.context.persona(), Some(error));
        self.plain_chat(&system, content).await
    }

    async fn chat(&self, messages: Vec<Message>) -> Result<String, ProviderError> {
        let mut request = ProviderRequest::new(&self.model, messages);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        let response = self.provider.complete(request).await?;
        Ok(response.message.content)
    }

    // ── Post-processing ───────────────────────────────────────────────────

    async fn post_process(
        &self,
        msg: &SourceMessage,
        reply: &AssistantMessage,
        ctx: &ToolExecutionContext,
    ) {
        if let Err(e) = self
            .store
            .add(Conversation::new(&msg.conversation_id, &msg.user_id))
            .await
        {
            warn!(conversation_id = %msg.conversation_id, error = %e, "Failed to record conversation");
        }

        let user_record = ChatRecord::from_source(msg);
        self.persist(&user_record).await;
        self.persist(&ChatRecord::from_reply(reply, &msg.user_id))
            .await;

        self.extract_memories(&user_record).await;
        self.maybe_compact(ctx).await;
    }

    async fn persist(&self, record: &ChatRecord) {
        match self.store.save(record.clone()).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(id)) => {
                debug!(message_id = %id, "Message already stored");
            }
            Err(e) => {
                warn!(message_id = %record.id, error = %e, "Failed to save message");
            }
        }

        self.bus
            .publish(DomainEvent::MessageCreated {
                message_id: record.id.clone(),
                conversation_id: record.conversation_id.clone(),
                role: record.role,
                content_preview: record.content.chars().take(PREVIEW_CHARS).collect(),
                timestamp: record.created_at,
            })
            .await;
    }

    async fn extract_memories(&self, record: &ChatRecord) {
        let Some(extractor) = &self.extractor else {
            return;
        };
        let outcome = match extractor.extract_from_message(record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(message_id = %record.id, user_id = %record.user_id, error = %e, "Memory extraction failed");
                return;
            }
        };

        let mut stored = 0;
        for entry in outcome.extracted {
            match self.memory.store(entry).await {
                Ok(_) => stored += 1,
                Err(e) => warn!(user_id = %record.user_id, error = %e, "Failed to store memory"),
            }
        }
        if stored > 0 {
            info!(user_id = %record.user_id, count = stored, "Memories extracted");
        }

        self.bus
            .publish(DomainEvent::MemoryUpdated {
                user_id: record.user_id.clone(),
                conversation_id: record.conversation_id.clone(),
                extracted: stored,
                skipped: outcome.skipped,
                reason: outcome.reason,
                timestamp: Utc::now(),
            })
            .await;
    }

    async fn maybe_compact(&self, ctx: &ToolExecutionContext) {
        let Some(policy) = &self.policy else {
            return;
        };
        let decision = policy.should_trigger(&ctx.conversation_id, ctx).await;
        if !decision.should_trigger {
            return;
        }

        let mode = if decision.priority == TriggerPriority::High {
            CompactionMode::Full
        } else {
            CompactionMode::Incremental
        };
        info!(
            conversation_id = %ctx.conversation_id,
            reason = %decision.reason,
            "Starting compaction"
        );

        // Enqueue only; the job itself runs on the worker runtime.
        match policy.trigger(&ctx.conversation_id, ctx, mode).await {
            Ok(job_id) => debug!(job_id = %job_id, "Compaction queued"),
            Err(e) => warn!(conversation_id = %ctx.conversation_id, error = %e, "Compaction trigger failed"),
        }
    }

    // ── Per-conversation ordering ─────────────────────────────────────────

    fn conversation_lock(&self, conversation_id: &str) -> ConversationLock {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(conversation_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop the lock entry once nobody else holds or waits on it.
    fn release_lock(&self, conversation_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(conversation_id)
            .is_some_and(|l| Arc::strong_count(l) == 1)
        {
            locks.remove(conversation_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{Scripted, ScriptedProvider};
    use async_trait::async_trait;
    use hearth_core::compaction::TriggerDecision;
    use hearth_core::error::{ToolError, WorkerError};
    use hearth_core::event::{EventKind, FnHandler};
    use hearth_core::message::{Role, SourceDescriptor};
    use hearth_core::tool::{Tool, ToolRegistry};
    use hearth_memory::{InMemoryStore, PatternExtractor};
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubClock;

    #[async_trait]
    impl Tool for StubClock {
        fn name(&self) -> &str {
            "clock"
        }
        fn description(&self) -> &str {
            "Current time"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _args: Value, _ctx: &ToolExecutionContext) -> Result<Value, ToolError> {
            Ok(json!({"ok": true, "data": {"time": "12:00"}}))
        }
    }

    struct Boom;

    #[async_trait]
    impl Tool for Boom {
        fn name(&self) -> &str {
            "boom"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: Value, _ctx: &ToolExecutionContext) -> Result<Value, ToolError> {
            Err(ToolError::Failed("boom".into()))
        }
    }

    struct Harness {
        planner: PersonaPlanner,
        provider: Arc<ScriptedProvider>,
        store: Arc<InMemoryStore>,
        registry: Arc<ToolRegistry>,
        bus: Arc<EventBus>,
    }

    const PERSONA: &str = "You are Hearth.";

    fn harness(script: Vec<Scripted>) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(EventBus::new(64));
        let registry = Arc::new(ToolRegistry::new(store.clone()));
        registry.register(Arc::new(StubClock)).unwrap();
        registry.register(Arc::new(Boom)).unwrap();
        let engine = Arc::new(ToolEngine::new(registry.clone(), bus.clone()));
        let provider = Arc::new(ScriptedProvider::new(script));
        let planner = PersonaPlanner::new(
            provider.clone(),
            "mock-model",
            engine,
            store.clone(),
            store.clone(),
            bus.clone(),
            PERSONA,
        );
        Harness {
            planner,
            provider,
            store,
            registry,
            bus,
        }
    }

    fn reply(text: &str) -> Scripted {
        Scripted::Reply(text.into())
    }

    fn message(content: &str) -> SourceMessage {
        SourceMessage::new(SourceDescriptor::cli(), "u1", "c1", content)
    }

    #[tokio::test]
    async fn final_plan_is_returned_verbatim() {
        let h = harness(vec![reply(r#"{"type":"final","content":"  Hi there!  "}"#)]);
        let out = h.planner.handle_source_message(message("hello")).await;

        assert_eq!(out.content, "  Hi there!  ");
        assert_eq!(out.conversation_id, "c1");
        assert_eq!(out.role, Role::Assistant);
        assert_eq!(h.provider.call_count(), 1);
    }

    #[tokio::test]
    async fn tool_call_is_narrated_by_summarizer() {
        let h = harness(vec![
            reply(r#"{"type":"tool_call","tool":"clock","args":{}}"#),
            reply("  It's noon.  \n"),
        ]);
        let out = h.planner.handle_source_message(message("What time is it?")).await;

        assert_eq!(out.content, "It's noon.");
        let requests = h.provider.requests();
        assert_eq!(requests.len(), 2);
        let summary_prompt = &requests[1].messages[1].content;
        assert!(summary_prompt.contains("Tool used: clock"));
        assert!(summary_prompt.contains(r#"{"ok":true,"data":{"time":"12:00"}}"#));
    }

    #[tokio::test]
    async fn failed_tool_still_goes_through_summarizer() {
        let h = harness(vec![
            reply(r#"{"type":"tool_call","tool":"boom"}"#),
            reply("Sorry, that didn't work."),
        ]);
        let out = h.planner.handle_source_message(message("do it")).await;

        assert_eq!(out.content, "Sorry, that didn't work.");
        let requests = h.provider.requests();
        let summary_prompt = &requests[1].messages[1].content;
        assert!(summary_prompt.contains("Tool used: boom"));
        assert!(summary_prompt.contains(r#""error":"boom""#));
    }

    #[tokio::test]
    async fn unknown_tool_result_is_narrated() {
        let h = harness(vec![
            reply(r#"{"type":"tool_call","tool":"teleport"}"#),
            reply("I can't do that."),
        ]);
        let out = h.planner.handle_source_message(message("beam me up")).await;
        assert_eq!(out.content, "I can't do that.");
        assert!(h.provider.requests()[1].messages[1].content.contains("unknown tool"));
    }

    #[tokio::test]
    async fn malformed_plan_matches_plain_chat() {
        let h = harness(vec![reply("Sure, here's the answer!"), reply(" plain answer ")]);
        let out = h.planner.handle_source_message(message("hello")).await;
        assert_eq!(out.content, "plain answer");

        let requests = h.provider.requests();
        let fallback_request = &requests[1];
        let system = &fallback_request.messages[0].content;
        assert!(system.starts_with(PERSONA));
        assert!(system.contains("Note: plan is not valid JSON"));
        assert_eq!(fallback_request.messages[1].content, "hello");

        // Same model output through plain_chat gives the same reply.
        let direct = harness(vec![reply(" plain answer ")]);
        assert_eq!(direct.planner.plain_chat(system, "hello").await, out.content);
    }

    #[tokio::test]
    async fn unknown_plan_type_falls_back() {
        let h = harness(vec![reply(r#"{"type":"dance"}"#), reply("fallback")]);
        let out = h.planner.handle_source_message(message("hello")).await;
        assert_eq!(out.content, "fallback");
        assert!(h.provider.requests()[1].messages[0].content.contains("unknown plan type"));
    }

    #[tokio::test]
    async fn unreachable_model_echoes_message() {
        let h = harness(vec![]);
        let out = h.planner.handle_source_message(message("Remind me to call Mom")).await;

        assert!(out.content.contains("echo of your message"));
        assert!(out.content.contains("Remind me to call Mom"));
        assert!(out.content.starts_with("I'm sorry, I couldn't process that right now ("));
        assert_eq!(h.provider.call_count(), 2);
    }

    #[tokio::test]
    async fn summarizer_failure_falls_back_to_plain_chat() {
        let h = harness(vec![
            reply(r#"{"type":"tool_call","tool":"clock"}"#),
            Scripted::Fail("timeout".into()),
            reply("It's around noon."),
        ]);
        let out = h.planner.handle_source_message(message("time?")).await;
        assert_eq!(out.content, "It's around noon.");
        assert_eq!(h.provider.call_count(), 3);
    }

    #[tokio::test]
    async fn disabled_tools_are_left_out_of_the_prompt() {
        let h = harness(vec![reply(r#"{"type":"final","content":"ok"}"#)]);
        h.registry.disable("boom").await.unwrap();
        h.planner.handle_source_message(message("hi")).await;

        let requests = h.provider.requests();
        let system = &requests[0].messages[0].content;
        assert!(system.contains("### clock"));
        assert!(!system.contains("### boom"));
    }

    #[tokio::test]
    async fn exchange_is_persisted_and_announced() {
        let h = harness(vec![
            reply(r#"{"type":"final","content":"first"}"#),
            reply(r#"{"type":"final","content":"second"}"#),
        ]);
        let created = Arc::new(AtomicUsize::new(0));
        let seen = created.clone();
        h.bus.subscribe(
            EventKind::MessageCreated,
            FnHandler::new("count", move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        h.planner.handle_source_message(message("one")).await;
        h.planner.handle_source_message(message("two")).await;

        let history = h.store.list_recent("c1", 10).await.unwrap();
        let contents: Vec<&str> = history.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "first", "two", "second"]);
        assert_eq!(created.load(Ordering::SeqCst), 4);
        assert!(h.store.conversation("c1").await.is_some());

        // The second planning call saw the first exchange as history.
        let requests = h.provider.requests();
        let second = &requests[1].messages;
        assert_eq!(second.len(), 4);
        assert_eq!(second[1].content, "one");
        assert_eq!(second[2].content, "first");
    }

    #[tokio::test]
    async fn resent_message_is_tolerated() {
        let h = harness(vec![
            reply(r#"{"type":"final","content":"a"}"#),
            reply(r#"{"type":"final","content":"b"}"#),
        ]);
        let msg = message("same");
        h.planner.handle_source_message(msg.clone()).await;
        let out = h.planner.handle_source_message(msg).await;
        assert_eq!(out.content, "b");
        assert_eq!(ConversationStore::count(h.store.as_ref(), "c1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn memories_are_extracted_from_user_message() {
        let h = harness(vec![reply(r#"{"type":"final","content":"Nice to meet you!"}"#)]);
        let planner = h.planner.with_extractor(Arc::new(PatternExtractor::new()));
        let updates = Arc::new(AtomicUsize::new(0));
        let seen = updates.clone();
        h.bus.subscribe(
            EventKind::MemoryUpdated,
            FnHandler::new("count", move |event| {
                if let DomainEvent::MemoryUpdated { extracted, .. } = event {
                    seen.fetch_add(*extracted, Ordering::SeqCst);
                }
                Ok(())
            }),
        );

        planner.handle_source_message(message("Hi, my name is Ada")).await;

        let memories = MemoryBackend::list(h.store.as_ref(), "u1", 10).await.unwrap();
        assert_eq!(memories.len(), 1);
        assert!(memories[0].content.contains("Ada"));
        assert_eq!(updates.load(Ordering::SeqCst), 1);
    }

    struct AlwaysCompact {
        modes: Mutex<Vec<CompactionMode>>,
    }

    #[async_trait]
    impl CompactionPolicy for AlwaysCompact {
        async fn should_trigger(&self, _id: &str, _ctx: &ToolExecutionContext) -> TriggerDecision {
            TriggerDecision {
                should_trigger: true,
                reason: "test".into(),
                priority: TriggerPriority::High,
            }
        }

        async fn trigger(
            &self,
            _id: &str,
            _ctx: &ToolExecutionContext,
            mode: CompactionMode,
        ) -> Result<String, WorkerError> {
            self.modes.lock().unwrap().push(mode);
            Ok("job-1".into())
        }
    }

    #[tokio::test]
    async fn compaction_is_queued_before_reply_returns() {
        let h = harness(vec![reply(r#"{"type":"final","content":"ok"}"#)]);
        let policy = Arc::new(AlwaysCompact {
            modes: Mutex::new(Vec::new()),
        });
        let planner = h.planner.with_compaction_policy(policy.clone());

        planner.handle_source_message(message("hi")).await;
        assert_eq!(*policy.modes.lock().unwrap(), vec![CompactionMode::Full]);
    }

    #[tokio::test]
    async fn lock_entries_are_released() {
        let h = harness(vec![reply(r#"{"type":"final","content":"ok"}"#)]);
        h.planner.handle_source_message(message("hi")).await;
        assert!(h.planner.locks.lock().unwrap().is_empty());
    }
}
