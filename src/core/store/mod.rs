// src/core/store/mod.rs

//! The durable embedded SQL store.
//!
//! Every write path is serialized behind one process-wide mutex; reads open a
//! fresh short-lived connection and bypass it. Blocking SQLite work runs on
//! the blocking pool, so every store operation is a proper suspension point.

pub mod bindings;
pub mod channels;
pub mod groups;
pub mod queue;
pub mod settings;

pub use bindings::{ActiveBindingRow, BindingRow};
pub use channels::{BannedChannelRow, ChannelRow};
pub use groups::{DeleteReport, SourceGroupRow, TopicRow, TopicUpsert};
pub use queue::{JobStatus, RecoveryJobRow};

use crate::core::errors::MirrorError;
use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS source_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id INTEGER NOT NULL UNIQUE,
    title TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS topics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_group_id INTEGER NOT NULL,
    topic_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(source_group_id, topic_id),
    FOREIGN KEY(source_group_id) REFERENCES source_groups(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS channels (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id INTEGER NOT NULL UNIQUE,
    title TEXT NOT NULL,
    is_standby INTEGER NOT NULL DEFAULT 0,
    in_use INTEGER NOT NULL DEFAULT 0,
    consumed_at TEXT,
    admin_check_at TEXT,
    last_seen_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS topic_bindings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_group_id INTEGER NOT NULL,
    topic_id INTEGER NOT NULL,
    channel_chat_id INTEGER NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(source_group_id, topic_id),
    FOREIGN KEY(source_group_id) REFERENCES source_groups(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS banned_channels (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_group_id INTEGER NOT NULL,
    topic_id INTEGER NOT NULL,
    channel_chat_id INTEGER NOT NULL,
    reason TEXT,
    detected_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS recovery_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_group_id INTEGER NOT NULL,
    topic_id INTEGER NOT NULL,
    old_channel_chat_id INTEGER NOT NULL,
    new_channel_chat_id INTEGER,
    reason TEXT,
    status TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_cloned_message_id INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

struct StoreInner {
    path: PathBuf,
    write_lock: Mutex<()>,
}

/// Handle to the embedded store; cheap to clone and share across tasks.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Opens the store, creating the file, the schema, and any missing
    /// columns (additive migrations only).
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, MirrorError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self {
            inner: Arc::new(StoreInner {
                path,
                write_lock: Mutex::new(()),
            }),
        };

        store
            .write(|conn| {
                conn.execute_batch(SCHEMA)?;
                ensure_column(conn, "channels", "admin_check_at", "TEXT")?;
                ensure_column(
                    conn,
                    "recovery_queue",
                    "last_cloned_message_id",
                    "INTEGER NOT NULL DEFAULT 0",
                )?;
                Ok(())
            })
            .await?;

        Ok(store)
    }

    /// Current time as an ISO-8601 UTC string with seconds precision.
    pub(crate) fn now() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Runs a read-only closure on a fresh connection, off the async threads.
    pub(crate) async fn read<T, F>(&self, f: F) -> Result<T, MirrorError>
    where
        F: FnOnce(&Connection) -> Result<T, MirrorError> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.inner.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path)?;
            f(&conn)
        })
        .await
        .map_err(|e| MirrorError::Store(format!("store task failed: {e}")))?
    }

    /// Runs a write closure under the process-wide write mutex. Multi-statement
    /// closures use an explicit transaction on the connection they receive.
    pub(crate) async fn write<T, F>(&self, f: F) -> Result<T, MirrorError>
    where
        F: FnOnce(&mut Connection) -> Result<T, MirrorError> + Send + 'static,
        T: Send + 'static,
    {
        let _guard = self.inner.write_lock.lock().await;
        let path = self.inner.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = Connection::open(&path)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| MirrorError::Store(format!("store task failed: {e}")))?
    }
}

/// Adds `column` to `table` when a prior schema version lacks it.
fn ensure_column(
    conn: &Connection,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<(), MirrorError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let existing: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<_, _>>()?;
    if !existing.iter().any(|name| name == column) {
        conn.execute(
            &format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"),
            [],
        )?;
    }
    Ok(())
}
