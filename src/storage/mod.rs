//! # Storage collaborator.
//!
//! The runtime persists two things: the set of tracked channels (with their paused
//! flag) and the structured events each session forwards.
//!
//! ## Contents
//! - [`Storage`] async contract shared by every backend
//! - [`EventRow`] backend-neutral column set produced by row preparation
//! - [`MemoryStorage`] in-process backend (tests, `--memory`)
//! - [`SqliteStorage`] rusqlite backend (feature `sqlite`, on by default)
//! - [`PostgresStorage`] tokio-postgres backend (feature `postgres`)
//!
//! ## Rules
//! - Implementations are safe for concurrent use; callers hold no lock around them.
//! - Channel keys are always [`ChannelName`]s, so nothing unsanitised reaches a backend.
//! - Events for a channel that was never added are not stored (`Ok(false)`).

mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod row;
#[cfg(feature = "sqlite")]
mod sqlite;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::channel::ChannelName;
use crate::error::StoreError;
use crate::protocol::StructuredEvent;

pub use memory::MemoryStorage;
#[cfg(feature = "postgres")]
pub use postgres::{PostgresOptions, PostgresStorage};
pub use row::EventRow;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

/// Persisted channel state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
    pub name: ChannelName,
    pub added_at: DateTime<Utc>,
    pub paused: bool,
    pub paused_at: Option<DateTime<Utc>>,
}

/// Aggregates over one channel's stored events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub total_events: u64,
    /// Event counts keyed by wire event name.
    pub by_kind: BTreeMap<String, u64>,
    /// Earliest storage time.
    pub first_event_at: Option<String>,
    /// Latest storage time.
    pub last_event_at: Option<String>,
    /// Distinct non-null user ids.
    pub unique_users: u64,
}

/// Durable channel and event store.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Stores one event. Returns `false` if the channel is not tracked.
    async fn store_event(
        &self,
        channel: &ChannelName,
        event: &StructuredEvent,
    ) -> Result<bool, StoreError>;

    async fn channel_exists(&self, channel: &ChannelName) -> Result<bool, StoreError>;

    /// Tracks a channel. Returns `false` if it was already tracked.
    async fn add_channel(&self, channel: &ChannelName) -> Result<bool, StoreError>;

    /// Marks a tracked channel paused. Returns `false` if it is not tracked.
    async fn pause_channel(&self, channel: &ChannelName) -> Result<bool, StoreError>;

    /// Clears the paused flag. Returns `false` if it is not tracked.
    async fn resume_channel(&self, channel: &ChannelName) -> Result<bool, StoreError>;

    /// Tracked, non-paused channels, sorted.
    async fn get_active_channels(&self) -> Result<Vec<ChannelName>, StoreError>;

    /// Tracked, paused channels, sorted.
    async fn get_paused_channels(&self) -> Result<Vec<ChannelName>, StoreError>;

    /// Every tracked channel, sorted.
    async fn get_all_channels(&self) -> Result<Vec<ChannelName>, StoreError>;

    /// Full records of every tracked channel, sorted by name.
    async fn list_channels(&self) -> Result<Vec<ChannelRecord>, StoreError>;

    /// Aggregates for one channel; `NotFound` if it is not tracked.
    async fn channel_stats(&self, channel: &ChannelName) -> Result<ChannelStats, StoreError>;
}
