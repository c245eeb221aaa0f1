//! Tool trait and registry: the abstraction over assistant capabilities.
//!
//! Tools are what give the assistant the ability to act: read the clock,
//! search memories, schedule background jobs, manage other tools.
//!
//! The registry owns enablement state. Disabled tools stay visible through
//! [`ToolRegistry::list_all`] but are hidden from the planning catalog and
//! refused by the tool engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

use crate::context::ToolExecutionContext;
use crate::error::{RegistryError, StoreError, ToolError};
use crate::provider::ToolDefinition;

/// Name of the registry-management tool. It can never be disabled.
pub const REGISTRY_TOOL: &str = "registry";

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    #[serde(default)]
    pub args: serde_json::Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Uniform outcome envelope: `{ok, data}` on success, `{ok, error}` on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub ok: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Normalize a tool's return value.
    ///
    /// A value that already has the envelope shape (an object whose keys are a
    /// subset of `ok`/`data`/`error` with a boolean `ok`) passes through
    /// unchanged; anything else becomes `{ok: true, data: value}`.
    pub fn from_output(value: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = &value {
            let shaped = matches!(map.get("ok"), Some(serde_json::Value::Bool(_)))
                && map.keys().all(|k| matches!(k.as_str(), "ok" | "data" | "error"));
            if shaped {
                if let Ok(envelope) = serde_json::from_value::<ToolResult>(value.clone()) {
                    return envelope;
                }
            }
        }
        Self::success(value)
    }
}

/// The core Tool trait.
///
/// Each capability implements this trait and is registered once at startup.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "clock").
    fn name(&self) -> &str;

    /// A one-line description (sent to the LLM).
    fn description(&self) -> &str;

    /// Longer help text for listings.
    fn long_description(&self) -> &str {
        self.description()
    }

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Example argument objects shown in the planning prompt.
    fn examples(&self) -> Vec<serde_json::Value> {
        Vec::new()
    }

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, ToolError>;

    /// Convert this tool into a ToolDefinition for the planning prompt.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
            examples: self.examples(),
        }
    }
}

/// Durable tool enablement, reconciled into the registry at startup.
#[async_trait]
pub trait ToolStateStore: Send + Sync {
    async fn enable_tool(&self, name: &str) -> Result<(), StoreError>;

    async fn disable_tool(&self, name: &str) -> Result<(), StoreError>;

    /// Names currently recorded as disabled.
    async fn disabled_tools(&self) -> Result<Vec<String>, StoreError>;
}

/// One row of [`ToolRegistry::list_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolListing {
    pub definition: ToolDefinition,
    pub long_description: String,
    pub enabled: bool,
    pub protected: bool,
}

/// A registry of available tools and their enablement.
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Arc<dyn Tool>>>,
    disabled: RwLock<HashSet<String>>,
    store: Arc<dyn ToolStateStore>,
}

impl ToolRegistry {
    pub fn new(store: Arc<dyn ToolStateStore>) -> Self {
        Self {
            tools: RwLock::new(BTreeMap::new()),
            disabled: RwLock::new(HashSet::new()),
            store,
        }
    }

    /// Register a tool. Names must be non-empty, untrimmed and unique.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if name.trim().is_empty() || name.trim() != name {
            return Err(RegistryError::InvalidName(name));
        }

        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        if tools.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        debug!(tool = %name, "Registered tool");
        tools.insert(name, tool);
        Ok(())
    }

    /// Get a tool by name, enabled or not.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn is_protected(name: &str) -> bool {
        name == REGISTRY_TOOL
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        Self::is_protected(name)
            || !self
                .disabled
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(name)
    }

    /// Every registered tool with its enablement flag, sorted by name.
    pub fn list_all(&self) -> Vec<ToolListing> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        tools
            .values()
            .map(|t| ToolListing {
                definition: t.to_definition(),
                long_description: t.long_description().to_string(),
                enabled: self.is_enabled(t.name()),
                protected: Self::is_protected(t.name()),
            })
            .collect()
    }

    /// Definitions of enabled tools only, the planning catalog.
    pub fn enabled_definitions(&self) -> Vec<ToolDefinition> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        tools
            .values()
            .filter(|t| self.is_enabled(t.name()))
            .map(|t| t.to_definition())
            .collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<String> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Enable a tool and persist the change.
    pub async fn enable(&self, name: &str) -> Result<(), RegistryError> {
        if !self.contains(name) {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        self.store
            .enable_tool(name)
            .await
            .map_err(|e| RegistryError::Persistence(e.to_string()))?;
        self.disabled
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        info!(tool = %name, "Tool enabled");
        Ok(())
    }

    /// Disable a tool and persist the change. The registry tool is refused.
    pub async fn disable(&self, name: &str) -> Result<(), RegistryError> {
        if !self.contains(name) {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        if Self::is_protected(name) {
            return Err(RegistryError::ProtectedTool(name.to_string()));
        }
        self.store
            .disable_tool(name)
            .await
            .map_err(|e| RegistryError::Persistence(e.to_string()))?;
        self.disabled
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
        info!(tool = %name, "Tool disabled");
        Ok(())
    }

    /// Load the persisted disabled set. Call once after registration.
    ///
    /// Names not (yet) registered are kept so that a tool registered later
    /// still starts disabled.
    pub async fn reconcile(&self) -> Result<usize, RegistryError> {
        let persisted = self
            .store
            .disabled_tools()
            .await
            .map_err(|e| RegistryError::Persistence(e.to_string()))?;

        let mut disabled = self.disabled.write().unwrap_or_else(PoisonError::into_inner);
        disabled.clear();
        disabled.extend(persisted.into_iter().filter(|n| !Self::is_protected(n)));
        debug!(count = disabled.len(), "Reconciled tool enablement");
        Ok(disabled.len())
    }
}
