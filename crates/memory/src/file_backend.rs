//! File-based tool state: persistent JSON-lines storage.
//!
//! Each line is one disabled tool, e.g.
//! `{"name":"clock","disabled_at":"2026-01-01T00:00:00Z"}`.
//! A tool is enabled by removing its line.
//!
//! Storage location: `~/.hearth/tools.jsonl`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_core::error::StoreError;
use hearth_core::tool::ToolStateStore;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DisabledTool {
    name: String,
    disabled_at: DateTime<Utc>,
}

/// A file-backed [`ToolStateStore`] using JSONL.
///
/// Rows are loaded on creation and the whole file is rewritten on every
/// mutation.
pub struct FileToolStateStore {
    path: PathBuf,
    rows: Arc<RwLock<Vec<DisabledTool>>>,
}

impl FileToolStateStore {
    /// Open the store at `path`. A missing file starts empty and is created
    /// on first write.
    pub fn new(path: PathBuf) -> Self {
        let rows = Self::load_from_disk(&path);
        debug!(path = %path.display(), disabled = rows.len(), "Tool state loaded");
        Self {
            path,
            rows: Arc::new(RwLock::new(rows)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Vec<DisabledTool> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<DisabledTool>(line) {
                Ok(row) => Some(row),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted tool state line");
                    None
                }
            })
            .collect()
    }

    fn flush(&self, rows: &[DisabledTool]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Storage(format!("Failed to create tool state directory: {e}"))
            })?;
        }

        let mut content = String::new();
        for row in rows {
            let line = serde_json::to_string(row)
                .map_err(|e| StoreError::Storage(format!("Failed to serialize tool state: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }

        std::fs::write(&self.path, &content)
            .map_err(|e| StoreError::Storage(format!("Failed to write tool state file: {e}")))
    }
}

#[async_trait]
impl ToolStateStore for FileToolStateStore {
    async fn enable_tool(&self, name: &str) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        let len_before = rows.len();
        rows.retain(|r| r.name != name);
        if rows.len() < len_before {
            self.flush(&rows)?;
        }
        Ok(())
    }

    async fn disable_tool(&self, name: &str) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        if rows.iter().any(|r| r.name == name) {
            return Ok(());
        }
        rows.push(DisabledTool {
            name: name.to_string(),
            disabled_at: Utc::now(),
        });
        if let Err(e) = self.flush(&rows) {
            rows.pop();
            return Err(e);
        }
        Ok(())
    }

    async fn disabled_tools(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.rows.read().await.iter().map(|r| r.name.clone()).collect())
    }
}
