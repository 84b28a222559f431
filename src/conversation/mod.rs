//! Conversation persistence.
//!
//! [`ConversationStore`] is the collaborator the agent loop persists its
//! history through; [`SqliteConversationStore`] is the shipped backend.
//!
//! Storage: `conversations` and `messages` tables in one SQLite file.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::Context as _;
use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::{ChatMessage, Role, ToolCall};

pub const DEFAULT_TITLE: &str = "New Conversation";

const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// One persisted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: Option<String>,
    pub timestamp: NaiveDateTime,
    /// Tool-call metadata (`tool_calls`, `tool_call_id`, `name`) and
    /// anything else the writer attached.
    pub metadata: Value,
}

impl StoredMessage {
    /// Rebuild the in-memory history message, tool metadata included.
    pub fn to_chat_message(&self) -> ChatMessage {
        let tool_calls = self
            .metadata
            .get("tool_calls")
            .and_then(|v| serde_json::from_value::<Vec<ToolCall>>(v.clone()).ok());
        let text = |key: &str| {
            self.metadata
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
            tool_calls,
            tool_call_id: text("tool_call_id"),
            name: text("name"),
        }
    }
}

/// Metadata object recording a message's tool fields.
pub fn message_metadata(msg: &ChatMessage) -> Value {
    let mut meta = json!({});
    if let Some(ref calls) = msg.tool_calls {
        meta["tool_calls"] = json!(calls);
    }
    if let Some(ref id) = msg.tool_call_id {
        meta["tool_call_id"] = json!(id);
    }
    if let Some(ref name) = msg.name {
        meta["name"] = json!(name);
    }
    meta
}

/// A conversation with its full message list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub messages: Vec<StoredMessage>,
    pub metadata: Value,
}

impl Conversation {
    pub fn chat_history(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(StoredMessage::to_chat_message).collect()
    }
}

/// Listing row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Persistence collaborator for conversations.
pub trait ConversationStore: Send + Sync {
    /// Create an empty conversation and return its id.
    fn create(&self, title: &str) -> anyhow::Result<String>;

    fn get(&self, id: &str) -> anyhow::Result<Option<Conversation>>;

    /// Append a message and bump the conversation's `updated_at`.
    /// Fails if the conversation does not exist.
    fn append_message(
        &self,
        id: &str,
        role: Role,
        content: Option<&str>,
        metadata: &Value,
    ) -> anyhow::Result<()>;

    /// Most recently updated first.
    fn list(&self, limit: usize, offset: usize) -> anyhow::Result<Vec<ConversationSummary>>;

    /// Delete a conversation and its messages.  Returns whether it existed.
    fn delete(&self, id: &str) -> anyhow::Result<bool>;
}

// ---------------------------------------------------------------------------
// SQLite backend
// ---------------------------------------------------------------------------

/// SQLite-backed conversation store.
pub struct SqliteConversationStore {
    conn: Mutex<Connection>,
}

impl SqliteConversationStore {
    /// Open (or create) the database at `db_path`.
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open database {}", db_path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init(conn)
    }

    /// A throwaway store (useful for tests).
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open `:memory:` or a file path, as named by `storage.database`.
    pub fn open_configured(database: &str) -> anyhow::Result<Self> {
        if database == ":memory:" {
            Self::open_in_memory()
        } else {
            Self::open(Path::new(database))
        }
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversations (
                id         TEXT PRIMARY KEY,
                title      TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                metadata   TEXT NOT NULL DEFAULT '{}'
            );
            CREATE TABLE IF NOT EXISTS messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL REFERENCES conversations (id),
                role            TEXT NOT NULL,
                content         TEXT,
                timestamp       TEXT NOT NULL,
                metadata        TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS idx_messages_conversation_id
                ON messages (conversation_id);
            CREATE INDEX IF NOT EXISTS idx_conversations_updated_at
                ON conversations (updated_at);",
        )
        .context("failed to create conversation schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("conversation db poisoned"))
    }
}

fn now() -> String {
    Utc::now().naive_utc().format(TS_FORMAT).to_string()
}

fn parse_ts(raw: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .with_context(|| format!("bad timestamp in database: {raw}"))
}

fn parse_role(raw: &str) -> anyhow::Result<Role> {
    Role::parse(raw).ok_or_else(|| anyhow::anyhow!("unknown role in database: {raw}"))
}

impl ConversationStore for SqliteConversationStore {
    fn create(&self, title: &str) -> anyhow::Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let ts = now();
        self.lock()?.execute(
            "INSERT INTO conversations (id, title, created_at, updated_at, metadata)
             VALUES (?1, ?2, ?3, ?3, '{}')",
            params![id, title, ts],
        )?;
        tracing::debug!(conversation = %id, title, "conversation created");
        Ok(id)
    }

    fn get(&self, id: &str) -> anyhow::Result<Option<Conversation>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT title, created_at, updated_at, metadata FROM conversations WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((title, created_at, updated_at, metadata)) = row else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT role, content, timestamp, metadata
             FROM messages WHERE conversation_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (role, content, ts, meta) = row?;
            messages.push(StoredMessage {
                role: parse_role(&role)?,
                content,
                timestamp: parse_ts(&ts)?,
                metadata: serde_json::from_str(&meta).context("bad message metadata")?,
            });
        }

        Ok(Some(Conversation {
            id: id.to_string(),
            title,
            created_at: parse_ts(&created_at)?,
            updated_at: parse_ts(&updated_at)?,
            messages,
            metadata: serde_json::from_str(&metadata).context("bad conversation metadata")?,
        }))
    }

    fn append_message(
        &self,
        id: &str,
        role: Role,
        content: Option<&str>,
        metadata: &Value,
    ) -> anyhow::Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let exists = tx
            .query_row(
                "SELECT 1 FROM conversations WHERE id = ?1",
                params![id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            anyhow::bail!("conversation {id} not found");
        }

        let ts = now();
        tx.execute(
            "INSERT INTO messages (conversation_id, role, content, timestamp, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, role.as_str(), content, ts, metadata.to_string()],
        )?;
        tx.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![ts, id],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn list(&self, limit: usize, offset: usize) -> anyhow::Result<Vec<ConversationSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, created_at, updated_at FROM conversations
             ORDER BY updated_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, title, created_at, updated_at) = row?;
            out.push(ConversationSummary {
                id,
                title,
                created_at: parse_ts(&created_at)?,
                updated_at: parse_ts(&updated_at)?,
            });
        }
        Ok(out)
    }

    fn delete(&self, id: &str) -> anyhow::Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM messages WHERE conversation_id = ?1", params![id])?;
        let deleted = tx.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }
}
