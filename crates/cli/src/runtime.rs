//! Composition root: builds every component from the configuration and
//! wires them together. Nothing in Hearth is a global; everything a command
//! needs hangs off [`Runtime`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hearth_agent::PersonaPlanner;
use hearth_config::{AppConfig, StorageConfig};
use hearth_core::error::Error;
use hearth_core::event::{EventBus, EventLogger};
use hearth_core::job::JobScheduler;
use hearth_core::memory::MemoryBackend;
use hearth_core::provider::Provider;
use hearth_core::store::ConversationStore;
use hearth_core::tool::{ToolRegistry, ToolStateStore};
use hearth_memory::{FileToolStateStore, InMemoryStore, PatternExtractor, SqliteStore};
use hearth_tools::ToolEngine;
use hearth_workers::{MemoryCompactionWorker, MessageCountPolicy, WorkerRuntime};
use tracing::{debug, info, warn};

const EVENT_STREAM_CAPACITY: usize = 256;

/// The three persistence collaborators.
#[derive(Clone)]
pub struct Stores {
    pub conversations: Arc<dyn ConversationStore>,
    pub memory: Arc<dyn MemoryBackend>,
    pub tool_state: Arc<dyn ToolStateStore>,
}

impl Stores {
    /// Everything in process memory; lost on exit.
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            conversations: store.clone(),
            memory: store.clone(),
            tool_state: store,
        }
    }

    /// Open the backend named in the storage configuration.
    pub async fn open(config: &StorageConfig) -> Result<Self, Error> {
        match config.backend.as_str() {
            "memory" => Ok(Self::in_memory()),
            "file" => {
                let store = Arc::new(InMemoryStore::new());
                Ok(Self {
                    conversations: store.clone(),
                    memory: store,
                    tool_state: Arc::new(FileToolStateStore::new(config.tool_state_file())),
                })
            }
            "sqlite" => {
                let path = config.database_path();
                ensure_parent(&path)?;
                let store = Arc::new(SqliteStore::new(&path.to_string_lossy()).await?);
                Ok(Self {
                    conversations: store.clone(),
                    memory: store.clone(),
                    tool_state: store,
                })
            }
            other => Err(Error::Config {
                message: format!("unknown storage backend '{other}'"),
            }),
        }
    }
}

fn ensure_parent(path: &Path) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::Config {
            message: format!("cannot create {}: {e}", parent.display()),
        })?;
    }
    Ok(())
}

/// The fully wired assistant.
pub struct Runtime {
    pub bus: Arc<EventBus>,
    pub stores: Stores,
    pub registry: Arc<ToolRegistry>,
    pub engine: Arc<ToolEngine>,
    pub workers: WorkerRuntime,
    pub planner: Arc<PersonaPlanner>,
}

impl Runtime {
    /// Build from configuration: default provider and configured storage.
    pub async fn build(config: &AppConfig) -> Result<Self, Error> {
        let router = hearth_providers::router::build_from_config(config);
        let provider = router.default().ok_or_else(|| Error::Config {
            message: format!("provider '{}' is not configured", config.default_provider),
        })?;
        let stores = Stores::open(&config.storage).await?;
        Self::assemble(config, provider, stores).await
    }

    /// Wire the components around an explicit provider and stores.
    pub async fn assemble(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        stores: Stores,
    ) -> Result<Self, Error> {
        let bus = Arc::new(EventBus::new(EVENT_STREAM_CAPACITY));
        bus.subscribe_all(Arc::new(EventLogger));

        let workers =
            WorkerRuntime::with_max_concurrency(bus.clone(), config.workers.max_concurrent_jobs);
        workers.register_worker(Arc::new(MemoryCompactionWorker::new(
            stores.conversations.clone(),
            stores.memory.clone(),
            provider.clone(),
            bus.clone(),
            &config.default_model,
            config.workers.compaction_keep_recent,
        )))?;
        let scheduler: Arc<dyn JobScheduler> = Arc::new(workers.clone());

        let registry = hearth_tools::default_registry(
            stores.tool_state.clone(),
            stores.memory.clone(),
            scheduler.clone(),
        )?;
        let disabled = registry.reconcile().await?;
        debug!(disabled, "Tool enablement restored");

        let engine = Arc::new(ToolEngine::new(registry.clone(), bus.clone()));

        let policy = Arc::new(MessageCountPolicy::new(
            stores.conversations.clone(),
            scheduler,
            config.workers.compaction_threshold,
        ));

        let planner = PersonaPlanner::new(
            provider,
            &config.default_model,
            engine.clone(),
            stores.conversations.clone(),
            stores.memory.clone(),
            bus.clone(),
            &config.identity.system_prompt,
        )
        .with_temperature(config.default_temperature)
        .with_max_tokens(config.default_max_tokens)
        .with_limits(config.planner.history_limit, config.planner.memory_limit)
        .with_extractor(Arc::new(PatternExtractor::new()))
        .with_compaction_policy(policy)
        .with_serialized_conversations(config.planner.serialize_conversations);

        info!(
            provider = %config.default_provider,
            model = %config.default_model,
            storage = %config.storage.backend,
            tools = registry.names().len(),
            "Runtime ready"
        );

        Ok(Self {
            bus,
            stores,
            registry,
            engine,
            workers,
            planner: Arc::new(planner),
        })
    }

    /// Wait up to `timeout` for jobs that have not finished yet.
    ///
    /// Returns the number of jobs still unfinished afterwards.
    pub async fn drain(&self, timeout: Duration) -> usize {
        let pending: Vec<String> = self
            .workers
            .list_jobs()
            .into_iter()
            .filter(|j| !j.status.is_terminal())
            .map(|j| j.id)
            .collect();
        if pending.is_empty() {
            return 0;
        }

        let wait_all = async {
            for id in &pending {
                self.workers.wait_for(id).await;
            }
        };
        if tokio::time::timeout(timeout, wait_all).await.is_err() {
            let left = self
                .workers
                .list_jobs()
                .iter()
                .filter(|j| !j.status.is_terminal())
                .count();
            warn!(pending = left, "Background jobs still running");
            return left;
        }
        0
    }
}
