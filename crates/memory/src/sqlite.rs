//! SQLite message store.
//!
//! A single database file with three tables:
//! - `sessions` — one row per session, bound to a skill
//! - `messages` — the append-only conversation log; a monotonically
//!   increasing `seq` rowid makes within-session order total regardless of
//!   timestamp resolution
//! - `feedback` — one mutable row per rated message (UPSERT, last write wins)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use agentgw_core::error::StoreError;
use agentgw_core::message::{Message, MessageToolCall, Role};
use agentgw_core::session::Session;
use agentgw_core::store::MessageStore;

/// SQLite-backed [`MessageStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database (tests).
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite message store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id           TEXT PRIMARY KEY,
                skill_name   TEXT NOT NULL,
                created_at   TEXT NOT NULL,
                last_used_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                id              TEXT UNIQUE NOT NULL,
                session_id      TEXT NOT NULL,
                role            TEXT NOT NULL,
                content         TEXT NOT NULL,
                tool_calls_json TEXT,
                tool_call_id    TEXT,
                created_at      TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feedback (
                message_id TEXT PRIMARY KEY,
                value      INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("feedback table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("messages index: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_skill ON sessions(skill_name)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("sessions index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session, StoreError> {
        Ok(Session {
            id: row.get("id"),
            skill_name: row.get("skill_name"),
            created_at: parse_timestamp(row.get("created_at"))?,
            last_used_at: parse_timestamp(row.get("last_used_at"))?,
        })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StoreError> {
        let role_str: String = row.get("role");
        let role = Role::parse(&role_str)
            .ok_or_else(|| StoreError::QueryFailed(format!("unknown role '{role_str}'")))?;

        let tool_calls: Vec<MessageToolCall> = match row.get::<Option<String>, _>("tool_calls_json")
        {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| StoreError::QueryFailed(format!("bad tool_calls_json: {e}")))?,
            None => Vec::new(),
        };

        Ok(Message {
            id: row.get("id"),
            role,
            content: row.get("content"),
            tool_calls,
            tool_call_id: row.get("tool_call_id"),
            created_at: parse_timestamp(row.get("created_at"))?,
        })
    }
}

fn parse_timestamp(raw: String) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("bad timestamp '{raw}': {e}")))
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn create_session(
        &self,
        skill_name: &str,
        session_id: Option<&str>,
    ) -> Result<String, StoreError> {
        let id = session_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO sessions (id, skill_name, created_at, last_used_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(skill_name)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("create_session: {e}")))?;

        Ok(id)
    }

    async fn session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            "SELECT id, skill_name, created_at, last_used_at FROM sessions WHERE id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("session: {e}")))?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn append(&self, session_id: &str, message: &Message) -> Result<(), StoreError> {
        let tool_calls_json = if message.tool_calls.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&message.tool_calls)
                    .map_err(|e| StoreError::QueryFailed(format!("serialize tool calls: {e}")))?,
            )
        };

        sqlx::query(
            r#"
            INSERT INTO messages (id, session_id, role, content, tool_calls_json, tool_call_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(session_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&tool_calls_json)
        .bind(&message.tool_call_id)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("append: {e}")))?;

        sqlx::query("UPDATE sessions SET last_used_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("touch session: {e}")))?;

        Ok(())
    }

    async fn history(&self, session_id: &str) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, role, content, tool_calls_json, tool_call_id, created_at
            FROM messages WHERE session_id = ? ORDER BY seq ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("history: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn list_sessions(
        &self,
        skill_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Session>, StoreError> {
        let rows = match skill_name {
            Some(skill) => sqlx::query(
                r#"
                SELECT id, skill_name, created_at, last_used_at FROM sessions
                WHERE skill_name = ? ORDER BY last_used_at DESC LIMIT ?
                "#,
            )
            .bind(skill)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query(
                r#"
                SELECT id, skill_name, created_at, last_used_at FROM sessions
                ORDER BY last_used_at DESC LIMIT ?
                "#,
            )
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await,
        }
        .map_err(|e| StoreError::QueryFailed(format!("list_sessions: {e}")))?;

        rows.iter().map(Self::row_to_session).collect()
    }

    async fn set_feedback(&self, message_id: &str, value: i64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO feedback (message_id, value, created_at) VALUES (?, ?, ?)
            ON CONFLICT(message_id) DO UPDATE SET value = excluded.value, created_at = excluded.created_at
            "#,
        )
        .bind(message_id)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("set_feedback: {e}")))?;

        Ok(())
    }

    async fn feedback(&self, message_id: &str) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query("SELECT value FROM feedback WHERE message_id = ?")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("feedback: {e}")))?;

        Ok(row.map(|r| r.get("value")))
    }

    async fn last_assistant_message_id(
        &self,
        session_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id FROM messages
            WHERE session_id = ? AND role = 'assistant'
            ORDER BY seq DESC LIMIT 1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("last_assistant_message_id: {e}")))?;

        Ok(row.map(|r| r.get("id")))
    }
}
