//! In-process storage backend.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::channel::ChannelName;
use crate::error::StoreError;
use crate::protocol::StructuredEvent;
use crate::storage::{ChannelRecord, ChannelStats, EventRow, Storage};

#[derive(Debug)]
struct StoredEvent {
    row: EventRow,
    created_at: String,
}

#[derive(Debug)]
struct Tracked {
    record: ChannelRecord,
    events: Vec<StoredEvent>,
}

/// Keeps channels and events in memory; contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    channels: Mutex<BTreeMap<ChannelName, Tracked>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows stored for `channel`, oldest first.
    pub fn events(&self, channel: &ChannelName) -> Vec<EventRow> {
        self.channels
            .lock()
            .get(channel)
            .map(|t| t.events.iter().map(|e| e.row.clone()).collect())
            .unwrap_or_default()
    }

    /// Makes every subsequent `store_event` fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    fn names_where(&self, pred: impl Fn(&ChannelRecord) -> bool) -> Vec<ChannelName> {
        self.channels
            .lock()
            .values()
            .filter(|t| pred(&t.record))
            .map(|t| t.record.name.clone())
            .collect()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn store_event(
        &self,
        channel: &ChannelName,
        event: &StructuredEvent,
    ) -> Result<bool, StoreError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Io("writes disabled".to_string()));
        }
        let mut channels = self.channels.lock();
        let Some(tracked) = channels.get_mut(channel) else {
            return Ok(false);
        };
        tracked.events.push(StoredEvent {
            row: EventRow::prepare(event),
            created_at: Utc::now().to_rfc3339(),
        });
        Ok(true)
    }

    async fn channel_exists(&self, channel: &ChannelName) -> Result<bool, StoreError> {
        Ok(self.channels.lock().contains_key(channel))
    }

    async fn add_channel(&self, channel: &ChannelName) -> Result<bool, StoreError> {
        let mut channels = self.channels.lock();
        if channels.contains_key(channel) {
            return Ok(false);
        }
        channels.insert(
            channel.clone(),
            Tracked {
                record: ChannelRecord {
                    name: channel.clone(),
                    added_at: Utc::now(),
                    paused: false,
                    paused_at: None,
                },
                events: Vec::new(),
            },
        );
        Ok(true)
    }

    async fn pause_channel(&self, channel: &ChannelName) -> Result<bool, StoreError> {
        let mut channels = self.channels.lock();
        let Some(t) = channels.get_mut(channel) else {
            return Ok(false);
        };
        t.record.paused = true;
        t.record.paused_at = Some(Utc::now());
        Ok(true)
    }

    async fn resume_channel(&self, channel: &ChannelName) -> Result<bool, StoreError> {
        let mut channels = self.channels.lock();
        let Some(t) = channels.get_mut(channel) else {
            return Ok(false);
        };
        t.record.paused = false;
        t.record.paused_at = None;
        Ok(true)
    }

    async fn get_active_channels(&self) -> Result<Vec<ChannelName>, StoreError> {
        Ok(self.names_where(|r| !r.paused))
    }

    async fn get_paused_channels(&self) -> Result<Vec<ChannelName>, StoreError> {
        Ok(self.names_where(|r| r.paused))
    }

    async fn get_all_channels(&self) -> Result<Vec<ChannelName>, StoreError> {
        Ok(self.names_where(|_| true))
    }

    async fn list_channels(&self) -> Result<Vec<ChannelRecord>, StoreError> {
        Ok(self
            .channels
            .lock()
            .values()
            .map(|t| t.record.clone())
            .collect())
    }

    async fn channel_stats(&self, channel: &ChannelName) -> Result<ChannelStats, StoreError> {
        let channels = self.channels.lock();
        let tracked = channels
            .get(channel)
            .ok_or_else(|| StoreError::NotFound(channel.to_string()))?;

        let mut stats = ChannelStats::default();
        let mut users = HashSet::new();
        for e in &tracked.events {
            stats.total_events += 1;
            *stats.by_kind.entry(e.row.event_type.clone()).or_default() += 1;
            if let Some(uid) = &e.row.user_id {
                users.insert(uid.as_str());
            }
            if stats.first_event_at.as_deref().is_none_or(|f| e.created_at.as_str() < f) {
                stats.first_event_at = Some(e.created_at.clone());
            }
            if stats.last_event_at.as_deref().is_none_or(|l| e.created_at.as_str() > l) {
                stats.last_event_at = Some(e.created_at.clone());
            }
        }
        stats.unique_users = users.len() as u64;
        Ok(stats)
    }
}
