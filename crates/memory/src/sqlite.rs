//! SQLite store.
//!
//! One database file holds four tables:
//! - `conversations`: conversation headers
//! - `messages`: chat records, insertion-ordered by an integer rowid
//! - `memories`: long-lived user facts and compaction summaries
//! - `disabled_tools`: persisted tool enablement
//!
//! Tables are created on open; there is no separate migration tool.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_core::error::{MemoryError, StoreError};
use hearth_core::memory::{MemoryBackend, MemoryEntry, MemoryQuery, keyword_score};
use hearth_core::message::{ChatRecord, Conversation, Role};
use hearth_core::store::ConversationStore;
use hearth_core::tool::ToolStateStore;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &[(&str, &str)] = &[
    (
        "conversations table",
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            title       TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        )
        "#,
    ),
    (
        "messages table",
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            iid             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT UNIQUE NOT NULL,
            conversation_id TEXT NOT NULL,
            user_id         TEXT NOT NULL,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL,
            created_at      TEXT NOT NULL
        )
        "#,
    ),
    (
        "messages index",
        "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, iid)",
    ),
    (
        "memories table",
        r#"
        CREATE TABLE IF NOT EXISTS memories (
            iid         INTEGER PRIMARY KEY AUTOINCREMENT,
            id          TEXT UNIQUE NOT NULL,
            user_id     TEXT NOT NULL,
            content     TEXT NOT NULL,
            tags        TEXT NOT NULL DEFAULT '[]',
            source      TEXT,
            created_at  TEXT NOT NULL
        )
        "#,
    ),
    (
        "memories index",
        "CREATE INDEX IF NOT EXISTS idx_memories_user ON memories(user_id, iid)",
    ),
    (
        "disabled_tools table",
        r#"
        CREATE TABLE IF NOT EXISTS disabled_tools (
            name        TEXT PRIMARY KEY,
            disabled_at TEXT NOT NULL
        )
        "#,
    ),
];

/// SQLite-backed conversation, memory and tool-state store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// Pass `":memory:"` for an ephemeral database; it is served from a
    /// single connection so every query sees the same data.
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let in_memory = path == ":memory:";
        let mut options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Normal);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let mut pool_options = SqlitePoolOptions::new().max_connections(4);
        if in_memory {
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        for (what, sql) in SCHEMA {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| MemoryError::MigrationFailed(format!("{what}: {e}")))?;
        }
        debug!("SQLite migrations complete");
        Ok(())
    }
}

fn parse_time(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn storage(e: sqlx::Error) -> StoreError {
    StoreError::Storage(e.to_string())
}

fn row_to_record(row: &SqliteRow) -> Result<ChatRecord, StoreError> {
    let role: String = row.try_get("role").map_err(storage)?;
    let created_at: String = row.try_get("created_at").map_err(storage)?;
    Ok(ChatRecord {
        id: row.try_get("id").map_err(storage)?,
        conversation_id: row.try_get("conversation_id").map_err(storage)?,
        user_id: row.try_get("user_id").map_err(storage)?,
        role: Role::parse(&role)
            .ok_or_else(|| StoreError::Storage(format!("unknown role '{role}'")))?,
        content: row.try_get("content").map_err(storage)?,
        created_at: parse_time(&created_at),
    })
}

fn row_to_entry(row: &SqliteRow) -> Result<MemoryEntry, MemoryError> {
    let column = |name: &str, e: sqlx::Error| MemoryError::QueryFailed(format!("{name} column: {e}"));
    let tags_json: String = row.try_get("tags").map_err(|e| column("tags", e))?;
    let created_at: String = row
        .try_get("created_at")
        .map_err(|e| column("created_at", e))?;
    Ok(MemoryEntry {
        id: row.try_get("id").map_err(|e| column("id", e))?,
        user_id: row.try_get("user_id").map_err(|e| column("user_id", e))?,
        content: row.try_get("content").map_err(|e| column("content", e))?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        source: row.try_get("source").map_err(|e| column("source", e))?,
        created_at: parse_time(&created_at),
        score: 0.0,
    })
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn add(&self, conversation: Conversation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO conversations (id, user_id, title, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at
            "#,
        )
        .bind(&conversation.id)
        .bind(&conversation.user_id)
        .bind(&conversation.title)
        .bind(conversation.created_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn save(&self, message: ChatRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, user_id, role, content, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(&message.user_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Duplicate(message.id))
            }
            Err(e) => Err(storage(e)),
        }
    }

    async fn list_recent(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, user_id, role, content, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY iid DESC
            LIMIT ?
            "#,
        )
        .bind(conversation_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut records = rows
            .iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, _>>()?;
        records.reverse();
        Ok(records)
    }

    async fn count(&self, conversation_id: &str) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(count as usize)
    }
}

#[async_trait]
impl MemoryBackend for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn store(&self, mut entry: MemoryEntry) -> Result<String, MemoryError> {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        let tags = serde_json::to_string(&entry.tags)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize tags: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO memories (id, user_id, content, tags, source, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(&entry.content)
        .bind(tags)
        .bind(&entry.source)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("Failed to insert memory: {e}")))?;

        Ok(entry.id)
    }

    async fn list(&self, user_id: &str, limit: usize) -> Result<Vec<MemoryEntry>, MemoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, content, tags, source, created_at
            FROM memories
            WHERE user_id = ?
            ORDER BY iid DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(e.to_string()))?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn search(&self, query: MemoryQuery) -> Result<Vec<MemoryEntry>, MemoryError> {
        let rows = match &query.user_id {
            Some(user_id) => {
                sqlx::query(
                    "SELECT id, user_id, content, tags, source, created_at FROM memories WHERE user_id = ? ORDER BY iid DESC",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT id, user_id, content, tags, source, created_at FROM memories ORDER BY iid DESC",
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| MemoryError::QueryFailed(e.to_string()))?;

        let mut results = Vec::new();
        for row in &rows {
            let mut entry = row_to_entry(row)?;
            if !query.tags.is_empty() && !query.tags.iter().any(|t| entry.tags.contains(t)) {
                continue;
            }
            entry.score = keyword_score(&entry.content, &query.text);
            if entry.score > 0.0 {
                results.push(entry);
            }
        }

        // Stable sort keeps newest-first among equal scores.
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(query.limit);
        Ok(results)
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let result = sqlx::query("DELETE FROM memories WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memories")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(e.to_string()))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl ToolStateStore for SqliteStore {
    async fn enable_tool(&self, name: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM disabled_tools WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn disable_tool(&self, name: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO disabled_tools (name, disabled_at) VALUES (?, ?)")
            .bind(name)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn disabled_tools(&self) -> Result<Vec<String>, StoreError> {
        sqlx::query_scalar::<_, String>("SELECT name FROM disabled_tools ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(storage)
    }
}
