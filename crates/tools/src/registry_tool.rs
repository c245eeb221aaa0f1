//! Registry tool: lets the assistant list, enable and disable tools.
//!
//! This tool is protected: the registry refuses to disable it.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use hearth_core::context::ToolExecutionContext;
use hearth_core::error::ToolError;
use hearth_core::tool::{REGISTRY_TOOL, Tool, ToolRegistry};
use serde_json::{Value, json};

pub struct RegistryTool {
    registry: Weak<ToolRegistry>,
}

impl RegistryTool {
    /// Holds a weak handle so the registry can own this tool without a cycle.
    pub fn new(registry: &Arc<ToolRegistry>) -> Self {
        Self {
            registry: Arc::downgrade(registry),
        }
    }

    fn target(args: &Value) -> Result<&str, ToolError> {
        args["tool"]
            .as_str()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("missing 'tool' argument".into()))
    }
}

#[async_trait]
impl Tool for RegistryTool {
    fn name(&self) -> &str {
        REGISTRY_TOOL
    }

    fn description(&self) -> &str {
        "List the available tools, or enable/disable one by name."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["list", "enable", "disable"],
                    "description": "What to do (default: list)"
                },
                "tool": {
                    "type": "string",
                    "description": "Tool name, required for enable/disable"
                }
            }
        })
    }

    fn examples(&self) -> Vec<Value> {
        vec![
            json!({"action": "list"}),
            json!({"action": "disable", "tool": "clock"}),
        ]
    }

    async fn execute(&self, args: Value, _ctx: &ToolExecutionContext) -> Result<Value, ToolError> {
        let registry = self.registry.upgrade().ok_or_else(|| ToolError::Unavailable {
            tool_name: REGISTRY_TOOL.into(),
            reason: "tool registry has been dropped".into(),
        })?;

        match args["action"].as_str().unwrap_or("list") {
            "list" => {
                let tools: Vec<Value> = registry
                    .list_all()
                    .into_iter()
                    .map(|t| {
                        json!({
                            "name": t.definition.name,
                            "description": t.definition.description,
                            "enabled": t.enabled,
                            "protected": t.protected,
                        })
                    })
                    .collect();
                Ok(json!({ "tools": tools }))
            }
            "enable" => {
                let name = Self::target(&args)?;
                registry
                    .enable(name)
                    .await
                    .map_err(|e| ToolError::Failed(e.to_string()))?;
                Ok(json!({ "tool": name, "enabled": true }))
            }
            "disable" => {
                let name = Self::target(&args)?;
                registry
                    .disable(name)
                    .await
                    .map_err(|e| ToolError::Failed(e.to_string()))?;
                Ok(json!({ "tool": name, "enabled": false }))
            }
            other => Err(ToolError::InvalidArguments(format!("unknown action '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockTool;
    use hearth_core::message::SourceDescriptor;
    use hearth_memory::InMemoryStore;

    fn setup() -> (Arc<ToolRegistry>, ToolExecutionContext) {
        let registry = Arc::new(ToolRegistry::new(Arc::new(InMemoryStore::new())));
        registry.register(Arc::new(ClockTool)).unwrap();
        registry
            .register(Arc::new(RegistryTool::new(&registry)))
            .unwrap();
        (registry, ToolExecutionContext::new("u1", "c1", SourceDescriptor::cli()))
    }

    #[tokio::test]
    async fn list_shows_enablement() {
        let (registry, ctx) = setup();
        let tool = registry.get(REGISTRY_TOOL).unwrap();
        let out = tool.execute(json!({}), &ctx).await.unwrap();
        let tools = out["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0]["name"], "clock");
        assert_eq!(tools[1]["protected"], true);
    }

    #[tokio::test]
    async fn disable_then_enable() {
        let (registry, ctx) = setup();
        let tool = registry.get(REGISTRY_TOOL).unwrap();

        tool.execute(json!({"action": "disable", "tool": "clock"}), &ctx)
            .await
            .unwrap();
        assert!(!registry.is_enabled("clock"));

        tool.execute(json!({"action": "enable", "tool": "clock"}), &ctx)
            .await
            .unwrap();
        assert!(registry.is_enabled("clock"));
    }

    #[tokio::test]
    async fn cannot_disable_itself() {
        let (registry, ctx) = setup();
        let tool = registry.get(REGISTRY_TOOL).unwrap();
        let err = tool
            .execute(json!({"action": "disable", "tool": "registry"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("protected"));
        assert!(registry.is_enabled(REGISTRY_TOOL));
    }

    #[tokio::test]
    async fn dropped_registry_is_unavailable() {
        let (registry, ctx) = setup();
        let tool = RegistryTool::new(&registry);
        drop(registry);
        let err = tool.execute(json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::Unavailable { .. }));
    }
}
