//! Tool engine: resolves a tool call against the registry and runs it.
//!
//! The engine is the failure boundary for tools: unknown names, disabled
//! tools, errors and panics all come back as a `ToolResult` with `ok: false`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use hearth_core::context::ToolExecutionContext;
use hearth_core::error::panic_message;
use hearth_core::event::{DomainEvent, EventBus};
use hearth_core::tool::{ToolCall, ToolRegistry, ToolResult};
use tracing::{debug, warn};

pub struct ToolEngine {
    registry: Arc<ToolRegistry>,
    bus: Arc<EventBus>,
}

impl ToolEngine {
    pub fn new(registry: Arc<ToolRegistry>, bus: Arc<EventBus>) -> Self {
        Self { registry, bus }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Execute one tool call. Never fails; every outcome is a `ToolResult`.
    pub async fn execute(&self, call: ToolCall, ctx: &ToolExecutionContext) -> ToolResult {
        let Some(tool) = self.registry.get(&call.name) else {
            warn!(tool = %call.name, "Unknown tool requested");
            return ToolResult::failure(format!("unknown tool: {}", call.name));
        };
        if !self.registry.is_enabled(&call.name) {
            warn!(tool = %call.name, "Disabled tool requested");
            return ToolResult::failure(format!("tool disabled: {}", call.name));
        }

        self.bus
            .publish(DomainEvent::ToolExecute {
                tool: call.name.clone(),
                args: call.args.clone(),
                conversation_id: ctx.conversation_id.clone(),
                timestamp: Utc::now(),
            })
            .await;

        let start = Instant::now();
        let outcome = AssertUnwindSafe(tool.execute(call.args, ctx))
            .catch_unwind()
            .await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(Ok(value)) => ToolResult::from_output(value),
            Ok(Err(e)) => ToolResult::failure(e.to_string()),
            Err(payload) => {
                ToolResult::failure(format!("tool panicked: {}", panic_message(payload.as_ref())))
            }
        };

        if result.ok {
            debug!(tool = %call.name, duration_ms, "Tool executed");
        } else {
            warn!(
                tool = %call.name,
                duration_ms,
                error = result.error.as_deref().unwrap_or_default(),
                "Tool failed"
            );
        }

        self.bus
            .publish(DomainEvent::ToolExecuted {
                tool: call.name,
                ok: result.ok,
                error: result.error.clone(),
                duration_ms,
                timestamp: Utc::now(),
            })
            .await;

        result
    }
}
