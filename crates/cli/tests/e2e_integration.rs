//! End-to-end integration tests for the Hearth assistant backend.
//!
//! These tests exercise the fully wired stack from an inbound source message
//! to the reply, including tool execution, persistence, memory extraction and
//! background compaction.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hearth::{Runtime, Stores};
use hearth_config::AppConfig;
use hearth_core::context::ToolExecutionContext;
use hearth_core::error::ProviderError;
use hearth_core::event::{DomainEvent, EventKind, FnHandler};
use hearth_core::job::{Job, JobStatus};
use hearth_core::memory::MemoryBackend;
use hearth_core::message::{Message, SourceDescriptor, SourceMessage};
use hearth_core::provider::{Provider, ProviderRequest, ProviderResponse};
use hearth_core::store::ConversationStore;
use hearth_core::tool::ToolCall;
use serde_json::json;

// ── Mock Provider ────────────────────────────────────────────────────────

/// Plays back scripted replies in order; fails once the script runs out.
struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        match self.replies.lock().unwrap().pop_front() {
            Some(text) => Ok(ProviderResponse {
                message: Message::assistant(text),
                usage: None,
                model: "mock".into(),
            }),
            None => Err(ProviderError::Network("connection refused".into())),
        }
    }
}

fn memory_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.backend = "memory".into();
    config
}

fn message(content: &str) -> SourceMessage {
    SourceMessage::new(SourceDescriptor::cli(), "u1", "c1", content)
}

async fn first_job(runtime: &Runtime) -> Job {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(job) = runtime.workers.list_jobs().into_iter().next() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no job was queued")
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_clock_tool_is_narrated() {
    let provider = ScriptedProvider::new(&[
        r#"{"type":"tool_call","tool":"clock","args":{}}"#,
        "  It is a little past noon.  ",
    ]);
    let runtime = Runtime::assemble(&memory_config(), provider.clone(), Stores::in_memory())
        .await
        .unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    for kind in [EventKind::ToolExecute, EventKind::ToolExecuted] {
        let seen = events.clone();
        runtime.bus.subscribe(
            kind,
            FnHandler::new("record", move |event: &DomainEvent| {
                seen.lock().unwrap().push(event.kind());
                Ok(())
            }),
        );
    }

    let reply = runtime
        .planner
        .handle_source_message(message("What time is it?"))
        .await;

    assert_eq!(reply.content, "It is a little past noon.");
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    let summary_prompt = &requests[1].messages[1].content;
    assert!(summary_prompt.contains("Tool used: clock"));
    assert!(summary_prompt.contains(r#""ok":true"#));
    assert!(summary_prompt.contains(r#""timezone":"UTC""#));
    assert_eq!(
        *events.lock().unwrap(),
        vec![EventKind::ToolExecute, EventKind::ToolExecuted]
    );
}

#[tokio::test]
async fn e2e_unreachable_model_echoes_message() {
    let provider = ScriptedProvider::new(&[]);
    let runtime = Runtime::assemble(&memory_config(), provider, Stores::in_memory())
        .await
        .unwrap();

    let reply = runtime
        .planner
        .handle_source_message(message("Book a table for two"))
        .await;

    assert!(reply.content.contains("echo of your message"));
    assert!(reply.content.contains("Book a table for two"));

    // The exchange is still recorded.
    let history = runtime.stores.conversations.list_recent("c1", 10).await.unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn e2e_planning_prompt_lists_enabled_tools_only() {
    let provider = ScriptedProvider::new(&[r#"{"type":"final","content":"Hello!"}"#]);
    let runtime = Runtime::assemble(&memory_config(), provider.clone(), Stores::in_memory())
        .await
        .unwrap();
    runtime.registry.disable("memory_search").await.unwrap();

    let reply = runtime.planner.handle_source_message(message("hi")).await;
    assert_eq!(reply.content, "Hello!");

    let requests = provider.requests();
    let system = &requests[0].messages[0].content;
    assert!(system.contains("### clock"));
    assert!(system.contains("### registry"));
    assert!(!system.contains("### memory_search"));
}

#[tokio::test]
async fn e2e_registry_tool_cannot_be_disabled() {
    let runtime = Runtime::assemble(&memory_config(), ScriptedProvider::new(&[]), Stores::in_memory())
        .await
        .unwrap();
    let ctx = ToolExecutionContext::new("u1", "c1", SourceDescriptor::cli());

    let result = runtime
        .engine
        .execute(
            ToolCall::new("registry", json!({"action": "disable", "tool": "registry"})),
            &ctx,
        )
        .await;
    assert!(!result.ok);
    assert!(result.error.unwrap().contains("protected"));
    assert!(runtime.registry.is_enabled("registry"));

    let unknown = runtime
        .engine
        .execute(ToolCall::new("teleport", json!({})), &ctx)
        .await;
    assert!(!unknown.ok);
    assert!(unknown.error.unwrap().contains("unknown"));
}

#[tokio::test]
async fn e2e_tool_state_survives_restart_with_file_backend() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.storage.backend = "file".into();
    config.storage.tool_state_path = Some(dir.path().join("tools.jsonl").display().to_string());

    {
        let stores = Stores::open(&config.storage).await.unwrap();
        let runtime = Runtime::assemble(&config, ScriptedProvider::new(&[]), stores)
            .await
            .unwrap();
        runtime.registry.disable("clock").await.unwrap();
    }

    let stores = Stores::open(&config.storage).await.unwrap();
    let runtime = Runtime::assemble(&config, ScriptedProvider::new(&[]), stores)
        .await
        .unwrap();
    assert!(!runtime.registry.is_enabled("clock"));
    assert!(runtime.registry.is_enabled("memory_search"));

    let ctx = ToolExecutionContext::new("u1", "c1", SourceDescriptor::cli());
    let result = runtime
        .engine
        .execute(ToolCall::new("clock", json!({})), &ctx)
        .await;
    assert!(result.error.unwrap().contains("disabled"));
}

#[tokio::test]
async fn e2e_memories_persist_in_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.storage.backend = "sqlite".into();
    config.storage.path = Some(dir.path().join("hearth.db").display().to_string());

    {
        let provider = ScriptedProvider::new(&[r#"{"type":"final","content":"Nice to meet you, Ada!"}"#]);
        let stores = Stores::open(&config.storage).await.unwrap();
        let runtime = Runtime::assemble(&config, provider, stores).await.unwrap();
        runtime
            .planner
            .handle_source_message(message("Hello, my name is Ada"))
            .await;
    }

    let provider = ScriptedProvider::new(&[r#"{"type":"final","content":"You're Ada."}"#]);
    let stores = Stores::open(&config.storage).await.unwrap();
    let runtime = Runtime::assemble(&config, provider.clone(), stores)
        .await
        .unwrap();
    let reply = runtime
        .planner
        .handle_source_message(message("Who am I?"))
        .await;
    assert_eq!(reply.content, "You're Ada.");

    let requests = provider.requests();
    let prompt = &requests[0].messages;
    assert!(prompt[0].content.contains("User's name is Ada"));
    // Persona + previous exchange + current message.
    assert_eq!(prompt.len(), 4);
    assert_eq!(prompt[1].content, "Hello, my name is Ada");
}

#[tokio::test]
async fn e2e_compaction_runs_in_background() {
    let mut config = memory_config();
    config.workers.compaction_threshold = 2;
    config.workers.compaction_keep_recent = 0;

    let provider = ScriptedProvider::new(&[
        r#"{"type":"final","content":"Hi!"}"#,
        "The user greeted the assistant.",
    ]);
    let runtime = Runtime::assemble(&config, provider, Stores::in_memory())
        .await
        .unwrap();

    runtime.planner.handle_source_message(message("hello")).await;

    let job = first_job(&runtime).await;
    assert_eq!(job.worker, "memory_compaction");
    let done = runtime.workers.wait_for(&job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    let memories = runtime.stores.memory.list("u1", 10).await.unwrap();
    assert_eq!(memories.len(), 1);
    assert_eq!(memories[0].content, "The user greeted the assistant.");
    assert!(memories[0].tags.contains(&"summary".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn e2e_compaction_queues_one_job_per_threshold() {
    let mut config = memory_config();
    config.workers.compaction_threshold = 3;
    config.workers.compaction_keep_recent = 0;

    let final_reply = r#"{"type":"final","content":"ok"}"#;
    let provider = ScriptedProvider::new(&[final_reply; 4]);
    let runtime = Runtime::assemble(&config, provider, Stores::in_memory())
        .await
        .unwrap();

    for text in ["one", "two", "three"] {
        runtime.planner.handle_source_message(message(text)).await;
    }

    // Queued before the reply came back, so it is visible right away.
    let jobs = runtime.workers.list_jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].args["mode"], "incremental");

    assert_eq!(runtime.drain(Duration::from_secs(2)).await, 0);
    let summaries = runtime.stores.memory.list("u1", 10).await.unwrap();
    assert_eq!(summaries.len(), 1);
}

#[tokio::test]
async fn e2e_background_job_tool_and_cancel() {
    let runtime = Runtime::assemble(&memory_config(), ScriptedProvider::new(&[]), Stores::in_memory())
        .await
        .unwrap();
    let ctx = ToolExecutionContext::new("u1", "c1", SourceDescriptor::cli());

    let queued = runtime
        .engine
        .execute(
            ToolCall::new(
                "background_job",
                json!({"action": "enqueue", "worker": "memory_compaction", "args": {"mode": "full"}}),
            ),
            &ctx,
        )
        .await;
    assert!(queued.ok);
    let id = queued.data.unwrap()["job"]["id"].as_str().unwrap().to_string();

    // Empty conversation: nothing to summarize, the job still completes.
    let done = runtime.workers.wait_for(&id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert!(!runtime.workers.cancel_job(&id).await);

    let unknown = runtime
        .engine
        .execute(
            ToolCall::new("background_job", json!({"action": "enqueue", "worker": "nope"})),
            &ctx,
        )
        .await;
    assert!(!unknown.ok);
    assert!(unknown.error.unwrap().contains("nope"));

    assert_eq!(runtime.drain(Duration::from_secs(1)).await, 0);
}
