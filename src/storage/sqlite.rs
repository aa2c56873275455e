//! SQLite storage backend.
//!
//! ## Schema
//! ```text
//! channels(id, name UNIQUE, added_at, paused, paused_at)
//! events_<name>(id, event_type, event_id, chatroom_id, timestamp, user_id,
//!               username, content, sender_data, metadata, raw_payload, created_at)
//! ```
//!
//! One event table per channel, created by `add_channel`. Table names come from
//! [`ChannelName::table_name`], which only ever contains `[a-z0-9_]`.
//! Statements run on the blocking pool; the connection sits behind a
//! `parking_lot::Mutex`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

use crate::channel::ChannelName;
use crate::error::StoreError;
use crate::protocol::StructuredEvent;
use crate::storage::{ChannelRecord, ChannelStats, EventRow, Storage};

const PRAGMAS: &str = "PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000; PRAGMA synchronous = NORMAL;";

const CREATE_CHANNELS: &str = "
CREATE TABLE IF NOT EXISTS channels (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    name      TEXT    NOT NULL UNIQUE,
    added_at  TEXT    NOT NULL,
    paused    INTEGER NOT NULL DEFAULT 0,
    paused_at TEXT
);";

fn create_events_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type  TEXT NOT NULL,
            event_id    TEXT,
            chatroom_id TEXT,
            timestamp   TEXT,
            user_id     TEXT,
            username    TEXT,
            content     TEXT,
            sender_data TEXT,
            metadata    TEXT,
            raw_payload TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_event_type ON {table}(event_type);
        CREATE INDEX IF NOT EXISTS idx_{table}_created_at ON {table}(created_at);"
    )
}

/// rusqlite-backed [`Storage`].
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("create dir: {e}")))?;
        }
        let conn = Connection::open(path)?;
        let storage = Self::init(conn, path.to_owned())?;
        info!(path = %path.display(), "database opened");
        Ok(storage)
    }

    /// Opens an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, PathBuf::from(":memory:"))
    }

    fn init(conn: Connection, path: PathBuf) -> Result<Self, StoreError> {
        conn.execute_batch(PRAGMAS)
            .map_err(|e| StoreError::Database(format!("pragmas: {e}")))?;
        conn.execute_batch(CREATE_CHANNELS)
            .map_err(|e| StoreError::Database(format!("schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Io(format!("blocking task: {e}")))?
    }

    async fn names_where(&self, filter: &'static str) -> Result<Vec<ChannelName>, StoreError> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT name FROM channels {filter} ORDER BY name");
            let mut stmt = conn.prepare(&sql)?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names.iter().filter_map(|n| ChannelName::new(n)).collect())
        })
        .await
    }
}

fn is_tracked(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    Ok(conn
        .query_row("SELECT 1 FROM channels WHERE name = ?1", [name], |_| Ok(()))
        .optional()?
        .is_some())
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("timestamp {s:?}: {e}")))
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn store_event(
        &self,
        channel: &ChannelName,
        event: &StructuredEvent,
    ) -> Result<bool, StoreError> {
        let name = channel.clone();
        let row = EventRow::prepare(event);
        self.with_conn(move |conn| {
            if !is_tracked(conn, name.as_str())? {
                return Ok(false);
            }
            let sql = format!(
                "INSERT INTO {} (event_type, event_id, chatroom_id, timestamp, user_id, username,
                                 content, sender_data, metadata, raw_payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                name.table_name()
            );
            conn.execute(
                &sql,
                params![
                    row.event_type,
                    row.event_id,
                    row.chatroom_id,
                    row.timestamp,
                    row.user_id,
                    row.username,
                    row.content,
                    row.sender_data,
                    row.metadata,
                    row.raw_payload,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(true)
        })
        .await
    }

    async fn channel_exists(&self, channel: &ChannelName) -> Result<bool, StoreError> {
        let name = channel.clone();
        self.with_conn(move |conn| is_tracked(conn, name.as_str()))
            .await
    }

    async fn add_channel(&self, channel: &ChannelName) -> Result<bool, StoreError> {
        let name = channel.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO channels (name, added_at, paused) VALUES (?1, ?2, 0)",
                params![name.as_str(), Utc::now().to_rfc3339()],
            )?;
            tx.execute_batch(&create_events_sql(&name.table_name()))?;
            tx.commit()?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn pause_channel(&self, channel: &ChannelName) -> Result<bool, StoreError> {
        let name = channel.clone();
        self.with_conn(move |conn| {
            let n = conn.execute(
                "UPDATE channels SET paused = 1, paused_at = ?2 WHERE name = ?1",
                params![name.as_str(), Utc::now().to_rfc3339()],
            )?;
            Ok(n == 1)
        })
        .await
    }

    async fn resume_channel(&self, channel: &ChannelName) -> Result<bool, StoreError> {
        let name = channel.clone();
        self.with_conn(move |conn| {
            let n = conn.execute(
                "UPDATE channels SET paused = 0, paused_at = NULL WHERE name = ?1",
                [name.as_str()],
            )?;
            Ok(n == 1)
        })
        .await
    }

    async fn get_active_channels(&self) -> Result<Vec<ChannelName>, StoreError> {
        self.names_where("WHERE paused = 0").await
    }

    async fn get_paused_channels(&self) -> Result<Vec<ChannelName>, StoreError> {
        self.names_where("WHERE paused = 1").await
    }

    async fn get_all_channels(&self) -> Result<Vec<ChannelName>, StoreError> {
        self.names_where("").await
    }

    async fn list_channels(&self) -> Result<Vec<ChannelRecord>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, added_at, paused, paused_at FROM channels ORDER BY name",
            )?;
            let raw = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut out = Vec::with_capacity(raw.len());
            for (name, added_at, paused, paused_at) in raw {
                let Some(name) = ChannelName::new(&name) else {
                    continue;
                };
                out.push(ChannelRecord {
                    name,
                    added_at: parse_time(&added_at)?,
                    paused,
                    paused_at: paused_at.as_deref().map(parse_time).transpose()?,
                });
            }
            Ok(out)
        })
        .await
    }

    async fn channel_stats(&self, channel: &ChannelName) -> Result<ChannelStats, StoreError> {
        let name = channel.clone();
        self.with_conn(move |conn| {
            if !is_tracked(conn, name.as_str())? {
                return Err(StoreError::NotFound(name.to_string()));
            }
            let table = name.table_name();

            let (total, first, last, users) = conn.query_row(
                &format!(
                    "SELECT COUNT(*), MIN(created_at), MAX(created_at), COUNT(DISTINCT user_id) FROM {table}"
                ),
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT event_type, COUNT(*) FROM {table} GROUP BY event_type"
            ))?;
            let by_kind = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
                })?
                .collect::<Result<BTreeMap<_, _>, _>>()?;

            Ok(ChannelStats {
                total_events: total as u64,
                by_kind,
                first_event_at: first,
                last_event_at: last,
                unique_users: users as u64,
            })
        })
        .await
    }
}
