//! # LogWriter: lifecycle events as tracing records
//!
//! Renders every [`Event`] as one `tracing` record on the `roomvisor::lifecycle`
//! target, so channel transitions are visible through whatever subscriber the
//! binary installs.
//!
//! ## Example output (fmt layer)
//! ```text
//! INFO  channel started channel="xqc"
//! INFO  session established channel="xqc" attempt=1 topic="chatrooms.668.v2"
//! WARN  attempt failed channel="xqc" attempt=2 track="connection" code=4200 reason="..."
//! WARN  backoff scheduled channel="xqc" retry=1 track="connection" delay_ms=1500
//! ERROR retry budget exhausted channel="xqc" retry=11 track="generic"
//! INFO  channel stopped channel="xqc" reason="stopped"
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

const TARGET: &str = "roomvisor::lifecycle";

/// Tracing-backed event writer.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let channel = e.channel.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        let track = e.track.map(|t| t.as_label()).unwrap_or("-");

        match e.kind {
            EventKind::ChannelStarted => info!(target: TARGET, channel, "channel started"),
            EventKind::ChannelStopped => info!(target: TARGET, channel, reason, "channel stopped"),
            EventKind::ChannelPaused => info!(target: TARGET, channel, "channel paused"),
            EventKind::ChannelResumed => info!(target: TARGET, channel, "channel resumed"),
            EventKind::AttemptStarting => {
                debug!(target: TARGET, channel, attempt = e.attempt, "attempt starting")
            }
            EventKind::SessionEstablished => info!(
                target: TARGET,
                channel,
                attempt = e.attempt,
                topic = reason,
                "session established"
            ),
            EventKind::AttemptFailed => warn!(
                target: TARGET,
                channel,
                attempt = e.attempt,
                track,
                code = e.code,
                reason,
                "attempt failed"
            ),
            EventKind::BackoffScheduled => warn!(
                target: TARGET,
                channel,
                retry = e.attempt,
                track,
                delay_ms = e.delay_ms,
                "backoff scheduled"
            ),
            EventKind::RetryExhausted => error!(
                target: TARGET,
                channel,
                retry = e.attempt,
                track,
                "retry budget exhausted"
            ),
            EventKind::StopForced => {
                warn!(target: TARGET, channel, "supervisor ignored cancellation; aborted")
            }
            EventKind::StopTimedOut => {
                error!(target: TARGET, channel, "supervisor did not terminate after abort")
            }
            EventKind::ShutdownRequested => info!(target: TARGET, "shutdown requested"),
            EventKind::ShutdownComplete => info!(target: TARGET, "shutdown complete"),
            EventKind::SubscriberOverflow => {
                warn!(target: TARGET, subscriber = channel, reason, "subscriber overflow")
            }
            EventKind::SubscriberPanicked => {
                error!(target: TARGET, subscriber = channel, reason, "subscriber panicked")
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
