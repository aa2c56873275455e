//! # Lifecycle events emitted by the orchestrator and channel supervisors.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Channel management**: started, stopped, paused, resumed
//! - **Attempt lifecycle**: attempt starting, session established, attempt failed, backoff
//! - **Terminal states**: retry budget exhausted, forced or timed-out stop
//! - **Runtime**: shutdown and subscriber health
//!
//! The [`Event`] struct carries additional metadata such as timestamps, channel name,
//! reasons, close codes and backoff delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use roomvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::BackoffScheduled)
//!     .with_channel("xqc")
//!     .with_attempt(3)
//!     .with_delay(Duration::from_secs(8))
//!     .with_code(4200);
//!
//! assert_eq!(ev.kind, EventKind::BackoffScheduled);
//! assert_eq!(ev.channel.as_deref(), Some("xqc"));
//! assert_eq!(ev.delay_ms, Some(8000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::error::FailureClass;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `channel`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `channel`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Shutdown events ===
    /// Orchestrator shutdown began; no new supervision is accepted.
    ShutdownRequested,

    /// Every supervision entry has been drained.
    ShutdownComplete,

    // === Channel management ===
    /// A supervision entry was created and its supervisor spawned.
    ///
    /// Sets:
    /// - `channel`: channel name
    ChannelStarted,

    /// A supervisor exited and its entry was removed.
    ///
    /// Sets:
    /// - `channel`: channel name
    /// - `reason`: why supervision ended (e.g. "stopped", "retry_exhausted")
    ChannelStopped,

    /// Channel was stopped and marked paused in storage.
    ChannelPaused,

    /// Channel was marked unpaused in storage and started.
    ChannelResumed,

    // === Attempt lifecycle ===
    /// A session attempt is starting.
    ///
    /// Sets:
    /// - `channel`: channel name
    /// - `attempt`: attempt number (1-based, per supervision lifetime)
    AttemptStarting,

    /// The subscribe frame was sent; the session is receiving.
    ///
    /// Sets:
    /// - `channel`: channel name
    /// - `attempt`: attempt number
    /// - `reason`: subscribed topic
    SessionEstablished,

    /// A session attempt ended with a failure.
    ///
    /// Sets:
    /// - `channel`: channel name
    /// - `attempt`: attempt number
    /// - `code`: close code (closures only)
    /// - `track`: retry track the failure was charged to
    /// - `reason`: failure message
    AttemptFailed,

    /// Next attempt scheduled after a failure.
    ///
    /// Sets:
    /// - `channel`: channel name
    /// - `attempt`: retry count on the charged track
    /// - `delay_ms`: delay before the next attempt
    /// - `track`: retry track
    BackoffScheduled,

    // === Terminal states ===
    /// A retry track ran out of budget; supervision ends.
    ///
    /// Sets:
    /// - `channel`: channel name
    /// - `attempt`: final count on the exhausted track
    /// - `track`: exhausted track
    RetryExhausted,

    /// `stop` aborted a supervisor that ignored cancellation for the grace period.
    StopForced,

    /// The aborted supervisor still did not terminate within the abort grace.
    StopTimedOut,
}

impl EventKind {
    /// Returns a short stable label (kebab-case) for log lines.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::SubscriberPanicked => "subscriber-panicked",
            EventKind::SubscriberOverflow => "subscriber-overflow",
            EventKind::ShutdownRequested => "shutdown-requested",
            EventKind::ShutdownComplete => "shutdown-complete",
            EventKind::ChannelStarted => "channel-started",
            EventKind::ChannelStopped => "channel-stopped",
            EventKind::ChannelPaused => "channel-paused",
            EventKind::ChannelResumed => "channel-resumed",
            EventKind::AttemptStarting => "attempt-starting",
            EventKind::SessionEstablished => "session-established",
            EventKind::AttemptFailed => "attempt-failed",
            EventKind::BackoffScheduled => "backoff-scheduled",
            EventKind::RetryExhausted => "retry-exhausted",
            EventKind::StopForced => "stop-forced",
            EventKind::StopTimedOut => "stop-timed-out",
        }
    }
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Channel name (or subscriber name for subscriber events).
    pub channel: Option<Arc<str>>,
    /// Attempt or retry count.
    pub attempt: Option<u32>,
    /// Backoff delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Close code of a failed attempt.
    pub code: Option<u16>,
    /// Retry track a failure was charged to.
    pub track: Option<FailureClass>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            channel: None,
            attempt: None,
            delay_ms: None,
            code: None,
            track: None,
            reason: None,
        }
    }

    /// Attaches a channel name.
    #[inline]
    pub fn with_channel(mut self, channel: impl Into<Arc<str>>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a backoff delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a close code.
    #[inline]
    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    /// Attaches the retry track.
    #[inline]
    pub fn with_track(mut self, track: FailureClass) -> Self {
        self.track = Some(track);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_channel(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_channel(subscriber)
            .with_reason(info)
    }
}
