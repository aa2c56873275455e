//! # Channel status tracker with sequence-based ordering.
//!
//! Maintains the live supervision status of each channel from lifecycle events,
//! using event sequence numbers to handle out-of-order delivery.
//!
//! ## Architecture
//! ```text
//! Supervisors ──► Bus ──► SubscriberSet ──► StatusTracker::on_event()
//!                                                   │
//!                                                   ▼
//!                                   HashMap<String, Entry{last_seq, status}>
//! ```
//!
//! ## Transitions
//! ```text
//! ChannelStarted     → Idle
//! AttemptStarting    → Connecting
//! SessionEstablished → Live
//! BackoffScheduled   → Backoff
//! RetryExhausted     → Exhausted
//! ChannelStopped     → Stopped   (Exhausted is kept)
//! ChannelPaused      → Stopped
//! ```
//!
//! ## Rules
//! - Events with `seq <= last_seq` for the channel are rejected (stale)
//! - Reads are **eventually consistent** with the registry

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Observable supervision status of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Not supervised since the process started.
    Idle,
    /// An attempt is resolving, connecting or subscribing.
    Connecting,
    /// Subscribed and receiving.
    Live,
    /// Waiting out a retry delay.
    Backoff,
    /// Supervision ended because a retry budget ran out.
    Exhausted,
    /// Supervision ended by `stop`, `pause` or shutdown.
    Stopped,
}

impl ChannelStatus {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            ChannelStatus::Idle => "idle",
            ChannelStatus::Connecting => "connecting",
            ChannelStatus::Live => "live",
            ChannelStatus::Backoff => "backoff",
            ChannelStatus::Exhausted => "exhausted",
            ChannelStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    last_seq: u64,
    status: ChannelStatus,
}

/// Thread-safe tracker of per-channel supervision status.
#[derive(Default)]
pub struct StatusTracker {
    state: RwLock<HashMap<String, Entry>>,
}

impl StatusTracker {
    /// Creates a new empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `ev` if it is newer than the last event seen for its channel.
    ///
    /// Returns `true` if the status changed.
    pub async fn update(&self, ev: &Event) -> bool {
        let Some(name) = ev.channel.as_deref() else {
            return false;
        };
        let next = match ev.kind {
            EventKind::ChannelStarted => ChannelStatus::Idle,
            EventKind::AttemptStarting => ChannelStatus::Connecting,
            EventKind::SessionEstablished => ChannelStatus::Live,
            EventKind::BackoffScheduled => ChannelStatus::Backoff,
            EventKind::RetryExhausted => ChannelStatus::Exhausted,
            EventKind::ChannelStopped | EventKind::ChannelPaused => ChannelStatus::Stopped,
            _ => return false,
        };

        let mut state = self.state.write().await;
        let entry = state.entry(name.to_string()).or_insert(Entry {
            last_seq: 0,
            status: ChannelStatus::Idle,
        });
        if entry.last_seq != 0 && ev.seq <= entry.last_seq {
            return false;
        }
        entry.last_seq = ev.seq;

        let next = match (entry.status, next) {
            (ChannelStatus::Exhausted, ChannelStatus::Stopped) => ChannelStatus::Exhausted,
            (_, next) => next,
        };
        let changed = entry.status != next;
        entry.status = next;
        changed
    }

    /// Current status of `name` (`Idle` if never seen).
    pub async fn status(&self, name: &str) -> ChannelStatus {
        self.state
            .read()
            .await
            .get(name)
            .map(|e| e.status)
            .unwrap_or(ChannelStatus::Idle)
    }

    /// Sorted `(name, status)` pairs for every channel seen so far.
    pub async fn snapshot(&self) -> Vec<(String, ChannelStatus)> {
        let state = self.state.read().await;
        let mut out: Vec<(String, ChannelStatus)> = state
            .iter()
            .map(|(name, e)| (name.clone(), e.status))
            .collect();
        out.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

#[async_trait]
impl Subscribe for StatusTracker {
    async fn on_event(&self, event: &Event) {
        self.update(event).await;
    }

    fn name(&self) -> &'static str {
        "status"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(kind: EventKind) -> Event {
        Event::new(kind).with_channel("xqc")
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let t = StatusTracker::new();
        assert_eq!(t.status("xqc").await, ChannelStatus::Idle);

        t.update(&ev(EventKind::ChannelStarted)).await;
        t.update(&ev(EventKind::AttemptStarting)).await;
        assert_eq!(t.status("xqc").await, ChannelStatus::Connecting);
        t.update(&ev(EventKind::SessionEstablished)).await;
        assert_eq!(t.status("xqc").await, ChannelStatus::Live);
        t.update(&ev(EventKind::BackoffScheduled)).await;
        assert_eq!(t.status("xqc").await, ChannelStatus::Backoff);
        t.update(&ev(EventKind::ChannelStopped)).await;
        assert_eq!(t.status("xqc").await, ChannelStatus::Stopped);
    }

    #[tokio::test]
    async fn test_exhausted_survives_stop() {
        let t = StatusTracker::new();
        t.update(&ev(EventKind::RetryExhausted)).await;
        t.update(&ev(EventKind::ChannelStopped)).await;
        assert_eq!(t.status("xqc").await, ChannelStatus::Exhausted);

        t.update(&ev(EventKind::ChannelStarted)).await;
        assert_eq!(t.status("xqc").await, ChannelStatus::Idle);
    }

    #[tokio::test]
    async fn test_stale_events_rejected() {
        let t = StatusTracker::new();
        let old = ev(EventKind::SessionEstablished);
        let new = ev(EventKind::ChannelStopped);
        assert!(t.update(&new).await);
        assert!(!t.update(&old).await);
        assert_eq!(t.status("xqc").await, ChannelStatus::Stopped);
    }

    #[tokio::test]
    async fn test_snapshot_sorted() {
        let t = StatusTracker::new();
        t.update(&Event::new(EventKind::ChannelStarted).with_channel("b")).await;
        t.update(&Event::new(EventKind::ChannelStarted).with_channel("a")).await;
        let names: Vec<String> = t.snapshot().await.into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
