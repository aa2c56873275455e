//! PostgreSQL storage backend.
//!
//! ## Schema
//! ```text
//! channels(id, name UNIQUE, added_at TIMESTAMPTZ, paused BOOLEAN, paused_at TIMESTAMPTZ)
//! events_<name>(id, event_type, event_id, chatroom_id, timestamp TIMESTAMPTZ, user_id,
//!               username, content, sender_data JSONB, metadata JSONB,
//!               raw_payload JSONB, created_at TIMESTAMPTZ)
//! ```
//!
//! Same table layout as [`SqliteStorage`](crate::SqliteStorage), with native
//! timestamp and JSON column types. One connection is shared behind an async
//! mutex; its driver task runs on the runtime until the storage is dropped.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info};

use crate::channel::ChannelName;
use crate::error::StoreError;
use crate::protocol::StructuredEvent;
use crate::storage::{ChannelRecord, ChannelStats, EventRow, Storage};

const CREATE_CHANNELS: &str = "
CREATE TABLE IF NOT EXISTS channels (
    id        SERIAL      PRIMARY KEY,
    name      TEXT        NOT NULL UNIQUE,
    added_at  TIMESTAMPTZ NOT NULL,
    paused    BOOLEAN     NOT NULL DEFAULT FALSE,
    paused_at TIMESTAMPTZ
);";

fn create_events_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id          SERIAL      PRIMARY KEY,
            event_type  TEXT        NOT NULL,
            event_id    TEXT,
            chatroom_id TEXT,
            timestamp   TIMESTAMPTZ,
            user_id     TEXT,
            username    TEXT,
            content     TEXT,
            sender_data JSONB,
            metadata    JSONB,
            raw_payload JSONB       NOT NULL,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_event_type ON {table}(event_type);
        CREATE INDEX IF NOT EXISTS idx_{table}_created_at ON {table}(created_at);"
    )
}

/// Connection settings for [`PostgresStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresOptions {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: Option<String>,
    pub connect_timeout: Duration,
}

impl Default for PostgresOptions {
    /// `postgres@localhost:5432/roomvisor`, no password, 10s connect timeout.
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "roomvisor".to_string(),
            user: "postgres".to_string(),
            password: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl PostgresOptions {
    /// Driver configuration for these settings.
    pub fn to_config(&self) -> tokio_postgres::Config {
        let mut cfg = tokio_postgres::Config::new();
        cfg.host(&self.host)
            .port(self.port)
            .dbname(&self.dbname)
            .user(&self.user)
            .connect_timeout(self.connect_timeout)
            .application_name("roomvisor");
        if let Some(password) = &self.password {
            cfg.password(password);
        }
        cfg
    }
}

/// tokio-postgres-backed [`Storage`].
#[derive(Clone)]
pub struct PostgresStorage {
    client: Arc<Mutex<Client>>,
}

impl PostgresStorage {
    /// Connects with `opts` and creates the `channels` table if needed.
    pub async fn connect(opts: &PostgresOptions) -> Result<Self, StoreError> {
        let storage = Self::connect_with(opts.to_config()).await?;
        info!(host = %opts.host, port = opts.port, dbname = %opts.dbname, "postgres storage ready");
        Ok(storage)
    }

    /// Connects with a prepared driver configuration.
    pub async fn connect_with(config: tokio_postgres::Config) -> Result<Self, StoreError> {
        let (client, connection) = config.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "postgres connection closed");
            }
        });
        client
            .batch_execute(CREATE_CHANNELS)
            .await
            .map_err(|e| StoreError::Database(format!("schema: {e}")))?;
        Ok(Self {
            client: Arc::new(Mutex::new(client)),
        })
    }

    async fn names_where(&self, filter: &str) -> Result<Vec<ChannelName>, StoreError> {
        let client = self.client.lock().await;
        let rows = client
            .query(&format!("SELECT name FROM channels {filter} ORDER BY name"), &[])
            .await?;
        let mut names = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(name) = ChannelName::new(row.try_get::<_, &str>(0)?) {
                names.push(name);
            }
        }
        Ok(names)
    }
}

async fn is_tracked(client: &Client, name: &str) -> Result<bool, StoreError> {
    Ok(client
        .query_opt("SELECT 1 FROM channels WHERE name = $1", &[&name])
        .await?
        .is_some())
}

/// Parses a prepared JSON column; text that is not JSON is dropped.
fn json_column(text: Option<&str>) -> Option<Value> {
    text.and_then(|t| serde_json::from_str(t).ok())
}

fn upstream_time(text: Option<&str>) -> Option<DateTime<Utc>> {
    let text = text?;
    match DateTime::parse_from_rfc3339(text) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(_) => {
            debug!(timestamp = text, "unparseable event timestamp, using storage time");
            None
        }
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn store_event(
        &self,
        channel: &ChannelName,
        event: &StructuredEvent,
    ) -> Result<bool, StoreError> {
        let row = EventRow::prepare(event);
        let raw_payload: Value = serde_json::from_str(&row.raw_payload)?;
        let sender_data = json_column(row.sender_data.as_deref());
        let metadata = json_column(row.metadata.as_deref());
        let now = Utc::now();
        let timestamp = upstream_time(row.timestamp.as_deref()).unwrap_or(now);

        let client = self.client.lock().await;
        if !is_tracked(&client, channel.as_str()).await? {
            return Ok(false);
        }
        let sql = format!(
            "INSERT INTO {} (event_type, event_id, chatroom_id, timestamp, user_id, username,
                             content, sender_data, metadata, raw_payload, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            channel.table_name()
        );
        client
            .execute(
                &sql,
                &[
                    &row.event_type,
                    &row.event_id,
                    &row.chatroom_id,
                    &timestamp,
                    &row.user_id,
                    &row.username,
                    &row.content,
                    &sender_data,
                    &metadata,
                    &raw_payload,
                    &now,
                ],
            )
            .await?;
        Ok(true)
    }

    async fn channel_exists(&self, channel: &ChannelName) -> Result<bool, StoreError> {
        let client = self.client.lock().await;
        is_tracked(&client, channel.as_str()).await
    }

    async fn add_channel(&self, channel: &ChannelName) -> Result<bool, StoreError> {
        let now = Utc::now();
        let mut client = self.client.lock().await;
        let tx = client.transaction().await?;
        let inserted = tx
            .execute(
                "INSERT INTO channels (name, added_at, paused) VALUES ($1, $2, FALSE)
                 ON CONFLICT (name) DO NOTHING",
                &[&channel.as_str(), &now],
            )
            .await?;
        tx.batch_execute(&create_events_sql(&channel.table_name()))
            .await?;
        tx.commit().await?;
        Ok(inserted == 1)
    }

    async fn pause_channel(&self, channel: &ChannelName) -> Result<bool, StoreError> {
        let now = Utc::now();
        let client = self.client.lock().await;
        let n = client
            .execute(
                "UPDATE channels SET paused = TRUE, paused_at = $2 WHERE name = $1",
                &[&channel.as_str(), &now],
            )
            .await?;
        Ok(n == 1)
    }

    async fn resume_channel(&self, channel: &ChannelName) -> Result<bool, StoreError> {
        let client = self.client.lock().await;
        let n = client
            .execute(
                "UPDATE channels SET paused = FALSE, paused_at = NULL WHERE name = $1",
                &[&channel.as_str()],
            )
            .await?;
        Ok(n == 1)
    }

    async fn get_active_channels(&self) -> Result<Vec<ChannelName>, StoreError> {
        self.names_where("WHERE paused = FALSE").await
    }

    async fn get_paused_channels(&self) -> Result<Vec<ChannelName>, StoreError> {
        self.names_where("WHERE paused = TRUE").await
    }

    async fn get_all_channels(&self) -> Result<Vec<ChannelName>, StoreError> {
        self.names_where("").await
    }

    async fn list_channels(&self) -> Result<Vec<ChannelRecord>, StoreError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT name, added_at, paused, paused_at FROM channels ORDER BY name",
                &[],
            )
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let Some(name) = ChannelName::new(row.try_get::<_, &str>(0)?) else {
                continue;
            };
            out.push(ChannelRecord {
                name,
                added_at: row.try_get(1)?,
                paused: row.try_get(2)?,
                paused_at: row.try_get(3)?,
            });
        }
        Ok(out)
    }

    async fn channel_stats(&self, channel: &ChannelName) -> Result<ChannelStats, StoreError> {
        let client = self.client.lock().await;
        if !is_tracked(&client, channel.as_str()).await? {
            return Err(StoreError::NotFound(channel.to_string()));
        }
        let table = channel.table_name();

        let row = client
            .query_one(
                &format!(
                    "SELECT COUNT(*), MIN(created_at), MAX(created_at), COUNT(DISTINCT user_id) FROM {table}"
                ),
                &[],
            )
            .await?;
        let total: i64 = row.try_get(0)?;
        let first: Option<DateTime<Utc>> = row.try_get(1)?;
        let last: Option<DateTime<Utc>> = row.try_get(2)?;
        let users: i64 = row.try_get(3)?;

        let rows = client
            .query(
                &format!("SELECT event_type, COUNT(*) FROM {table} GROUP BY event_type"),
                &[],
            )
            .await?;
        let mut by_kind = BTreeMap::new();
        for row in &rows {
            by_kind.insert(row.try_get::<_, String>(0)?, row.try_get::<_, i64>(1)? as u64);
        }

        Ok(ChannelStats {
            total_events: total as u64,
            by_kind,
            first_event_at: first.map(|t| t.to_rfc3339()),
            last_event_at: last.map(|t| t.to_rfc3339()),
            unique_users: users as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageKind;
    use serde_json::json;
    use tokio_postgres::config::Host;

    #[test]
    fn test_options_map_onto_driver_config() {
        let opts = PostgresOptions {
            host: "db.internal".into(),
            port: 6543,
            dbname: "chat".into(),
            user: "ingest".into(),
            password: Some("secret".into()),
            connect_timeout: Duration::from_secs(3),
        };
        let cfg = opts.to_config();
        assert_eq!(cfg.get_hosts(), &[Host::Tcp("db.internal".into())]);
        assert_eq!(cfg.get_ports(), &[6543]);
        assert_eq!(cfg.get_dbname(), Some("chat"));
        assert_eq!(cfg.get_user(), Some("ingest"));
        assert_eq!(cfg.get_password(), Some(&b"secret"[..]));
        assert_eq!(cfg.get_connect_timeout(), Some(&Duration::from_secs(3)));
    }

    #[test]
    fn test_default_options_have_no_password() {
        let cfg = PostgresOptions::default().to_config();
        assert_eq!(cfg.get_password(), None);
        assert_eq!(cfg.get_ports(), &[5432]);
    }

    #[test]
    fn test_event_table_ddl() {
        let table = ChannelName::new("Foo_Bar").unwrap().table_name();
        let sql = create_events_sql(&table);
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS events_foo_bar"));
        assert!(sql.contains("raw_payload JSONB"));
        assert!(sql.contains("idx_events_foo_bar_created_at"));
    }

    #[test]
    fn test_json_and_time_columns() {
        assert_eq!(json_column(Some(r#"{"id":1}"#)), Some(json!({"id": 1})));
        assert_eq!(json_column(Some("not json")), None);
        assert_eq!(json_column(None), None);

        let t = upstream_time(Some("2025-01-01T00:00:00+02:00")).unwrap();
        assert_eq!(t.to_rfc3339(), "2024-12-31T22:00:00+00:00");
        assert!(upstream_time(Some("yesterday")).is_none());
    }

    /// Runs against a live server when `ROOMVISOR_TEST_PG_URL` is set.
    #[tokio::test]
    async fn test_live_server_contract() {
        let Ok(url) = std::env::var("ROOMVISOR_TEST_PG_URL") else {
            return;
        };
        let s = PostgresStorage::connect_with(url.parse().unwrap())
            .await
            .unwrap();
        let ch = ChannelName::new(&format!("pgtest_{}", rand::random::<u32>())).unwrap();

        assert!(!s.store_event(&ch, &chat(1, "early")).await.unwrap());
        assert!(s.add_channel(&ch).await.unwrap());
        assert!(!s.add_channel(&ch).await.unwrap());
        assert!(s.store_event(&ch, &chat(1, "hi")).await.unwrap());
        assert!(s.store_event(&ch, &chat(2, "yo")).await.unwrap());

        let stats = s.channel_stats(&ch).await.unwrap();
        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.unique_users, 2);
        assert_eq!(stats.by_kind[r"App\Events\ChatMessageEvent"], 2);

        assert!(s.pause_channel(&ch).await.unwrap());
        assert!(s.get_paused_channels().await.unwrap().contains(&ch));
        let record = s
            .list_channels()
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.name == ch)
            .unwrap();
        assert!(record.paused && record.paused_at.is_some());
        assert!(s.resume_channel(&ch).await.unwrap());
        assert!(s.get_active_channels().await.unwrap().contains(&ch));

        let client = s.client.lock().await;
        client
            .batch_execute(&format!(
                "DROP TABLE {}; DELETE FROM channels WHERE name = '{}';",
                ch.table_name(),
                ch.as_str()
            ))
            .await
            .unwrap();
    }

    fn chat(user: u64, text: &str) -> StructuredEvent {
        StructuredEvent {
            kind: MessageKind::ChatMessage,
            fields: json!({
                "id": format!("m-{user}"),
                "chatroom_id": 1,
                "content": text,
                "created_at": "2025-01-01T00:00:00+00:00",
                "sender": { "id": user, "username": format!("user{user}") }
            }),
        }
    }
}
