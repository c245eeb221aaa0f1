//! Memory search tool: lets the assistant look up what it knows about the user.
//!
//! Searches are always scoped to the user in the execution context.

use std::sync::Arc;

use async_trait::async_trait;
use hearth_core::context::ToolExecutionContext;
use hearth_core::error::ToolError;
use hearth_core::memory::{MemoryBackend, MemoryQuery};
use hearth_core::tool::Tool;
use serde::Serialize;
use serde_json::{Value, json};

/// A single memory search result.
#[derive(Debug, Serialize)]
struct MemoryResult {
    id: String,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
    score: f32,
    created_at: String,
}

pub struct MemorySearchTool {
    backend: Arc<dyn MemoryBackend>,
}

impl MemorySearchTool {
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for MemorySearchTool {
    fn name(&self) -> &str {
        "memory_search"
    }

    fn description(&self) -> &str {
        "Search long-term memory for facts the user has shared before."
    }

    fn long_description(&self) -> &str {
        "Keyword search over the user's stored memories: extracted facts \
         (name, preferences, places) and conversation summaries. Best match first."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to find relevant memories"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of memories to return (default 5)",
                    "default": 5
                },
                "tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Optional tags to filter memories by"
                }
            },
            "required": ["query"]
        })
    }

    fn examples(&self) -> Vec<Value> {
        vec![json!({"query": "favorite coffee"})]
    }

    async fn execute(&self, args: Value, ctx: &ToolExecutionContext) -> Result<Value, ToolError> {
        let query = args["query"]
            .as_str()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("missing 'query' argument".into()))?;

        let limit = args["limit"].as_u64().unwrap_or(5).clamp(1, 50) as usize;
        let tags: Vec<String> = args
            .get("tags")
            .and_then(|t| serde_json::from_value(t.clone()).ok())
            .unwrap_or_default();

        let mut search = MemoryQuery::for_user(&ctx.user_id, query);
        search.limit = limit;
        search.tags = tags;

        let entries = self
            .backend
            .search(search)
            .await
            .map_err(|e| ToolError::Failed(format!("memory search failed: {e}")))?;

        let results: Vec<MemoryResult> = entries
            .into_iter()
            .map(|e| MemoryResult {
                id: e.id,
                content: e.content,
                tags: e.tags,
                score: e.score,
                created_at: e.created_at.to_rfc3339(),
            })
            .collect();

        Ok(json!({
            "query": query,
            "count": results.len(),
            "memories": results,
        }))
    }
}
