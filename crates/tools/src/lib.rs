//! Built-in tools and the tool engine for Hearth.
//!
//! Tools give the assistant the ability to act: read the clock, search
//! memories, manage background jobs, and enable or disable other tools.
//! The [`ToolEngine`] is the single entry point that runs them.

pub mod background_job;
pub mod clock;
pub mod engine;
pub mod memory_search;
pub mod registry_tool;

use std::sync::Arc;

use hearth_core::error::RegistryError;
use hearth_core::job::JobScheduler;
use hearth_core::memory::MemoryBackend;
use hearth_core::tool::{ToolRegistry, ToolStateStore};

pub use background_job::BackgroundJobTool;
pub use clock::ClockTool;
pub use engine::ToolEngine;
pub use memory_search::MemorySearchTool;
pub use registry_tool::RegistryTool;

/// Create a registry holding every built-in tool.
///
/// Call [`ToolRegistry::reconcile`] afterwards to apply persisted
/// enablement.
pub fn default_registry(
    store: Arc<dyn ToolStateStore>,
    memory: Arc<dyn MemoryBackend>,
    scheduler: Arc<dyn JobScheduler>,
) -> Result<Arc<ToolRegistry>, RegistryError> {
    let registry = Arc::new(ToolRegistry::new(store));
    registry.register(Arc::new(ClockTool))?;
    registry.register(Arc::new(RegistryTool::new(&registry)))?;
    registry.register(Arc::new(MemorySearchTool::new(memory)))?;
    registry.register(Arc::new(BackgroundJobTool::new(scheduler)))?;
    Ok(registry)
}
