//! # Global runtime configuration.
//!
//! Provides [`Config`] centralized settings for the ingestion runtime.
//!
//! Config is used in three places:
//! 1. **Orchestrator creation**: `Orchestrator::new(config, storage, lookup, connector, subscribers)`
//! 2. **Session attempts**: endpoint, topic naming, keepalive and receive-poll timings
//! 3. **Channel supervisors**: the two-track [`RetryPolicy`]
//!
//! ## Sentinel values
//! - `keepalive_interval = 0s` → keepalive disabled (no pings are sent)
//! - `bus_capacity = 0` → clamped to 1 by the bus

use std::path::PathBuf;
use std::time::Duration;

use crate::error::CLOSE_INTERNAL_ERROR;
use crate::policies::RetryPolicy;

/// Upstream websocket endpoint.
pub const DEFAULT_ENDPOINT: &str =
    "wss://ws-us2.pusher.com/app/32cbd69e4b950bf97679?protocol=7&client=js&version=7.6.0&flash=false";

/// Channel metadata API; the channel name is appended.
pub const DEFAULT_LOOKUP_URL: &str = "https://kick.com/api/v2/channels/";

/// Sink for messages the classifier does not recognise.
pub const DEFAULT_OVERFLOW_LOG: &str = "unhandled_messages.txt";

/// Global configuration for the ingestion runtime.
///
/// ## Field groups
/// - **Transport**: `endpoint`, `topic_namespace`, `topic_version`, `subscribe_event`
/// - **Keepalive**: `keepalive_interval`, `keepalive_timeout`, `keepalive_max_failures`, `keepalive_close_code`
/// - **Receive**: `recv_poll` bounds every receive wait and therefore cancellation latency
/// - **Supervision**: `retry`, `stop_grace`, `abort_grace`
/// - **Collaborators**: `lookup_base_url`, `lookup_timeout`, `overflow_log`
/// - **Classification**: `ignored_events`, `extra_handled_events`
#[derive(Clone, Debug)]
pub struct Config {
    /// Websocket URL every session connects to.
    pub endpoint: String,
    /// First segment of the subscribe topic (`<namespace>.<id>.<version>`).
    pub topic_namespace: String,
    /// Last segment of the subscribe topic.
    pub topic_version: String,
    /// Event name of the outbound subscribe envelope.
    pub subscribe_event: String,

    /// Idle time after which a ping is sent.
    pub keepalive_interval: Duration,
    /// How long to wait for the matching pong.
    pub keepalive_timeout: Duration,
    /// Consecutive ping timeouts that force a closure.
    pub keepalive_max_failures: u32,
    /// Close code synthesized when the keepalive gives up.
    pub keepalive_close_code: u16,

    /// Upper bound of a single receive wait.
    pub recv_poll: Duration,

    /// Two-track retry policy used by every channel supervisor.
    pub retry: RetryPolicy,
    /// How long `stop` waits for a cooperative exit.
    pub stop_grace: Duration,
    /// How long `stop` waits after aborting the supervisor task.
    pub abort_grace: Duration,

    /// Base URL of the channel lookup API.
    pub lookup_base_url: String,
    /// Per-request lookup timeout.
    pub lookup_timeout: Duration,
    /// Path of the unhandled-message overflow log.
    pub overflow_log: PathBuf,

    /// Protocol housekeeping events, dropped silently.
    pub ignored_events: Vec<String>,
    /// Additional event names stored with generic row preparation.
    pub extra_handled_events: Vec<String>,

    /// Capacity of the lifecycle event bus.
    pub bus_capacity: usize,
}

impl Config {
    /// Returns the keepalive interval as an `Option`.
    ///
    /// - `None` → keepalive disabled
    /// - `Some(d)` → ping after `d` without a successful keepalive
    #[inline]
    pub fn keepalive(&self) -> Option<Duration> {
        if self.keepalive_interval == Duration::ZERO {
            None
        } else {
            Some(self.keepalive_interval)
        }
    }

    /// Returns a receive poll interval of at least 1ms.
    #[inline]
    pub fn recv_poll_clamped(&self) -> Duration {
        self.recv_poll.max(Duration::from_millis(1))
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Builds the subscribe topic for a resolved session identifier.
    pub fn topic(&self, session_id: &str) -> String {
        format!(
            "{}.{}.{}",
            self.topic_namespace, session_id, self.topic_version
        )
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - upstream endpoint and `chatrooms.<id>.v2` topics, `pusher:subscribe`
    /// - keepalive every 1200s, 30s pong timeout, 3 failures → close 1011
    /// - 1s receive poll
    /// - [`RetryPolicy::default`] (generic 10 × 2s doubling, connection 50 × 1.5 capped at 30s)
    /// - stop grace 5s, abort grace 2s
    /// - lookup against the public API with a 10s timeout
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            topic_namespace: "chatrooms".to_string(),
            topic_version: "v2".to_string(),
            subscribe_event: "pusher:subscribe".to_string(),
            keepalive_interval: Duration::from_secs(1200),
            keepalive_timeout: Duration::from_secs(30),
            keepalive_max_failures: 3,
            keepalive_close_code: CLOSE_INTERNAL_ERROR,
            recv_poll: Duration::from_secs(1),
            retry: RetryPolicy::default(),
            stop_grace: Duration::from_secs(5),
            abort_grace: Duration::from_secs(2),
            lookup_base_url: DEFAULT_LOOKUP_URL.to_string(),
            lookup_timeout: Duration::from_secs(10),
            overflow_log: PathBuf::from(DEFAULT_OVERFLOW_LOG),
            ignored_events: crate::protocol::DEFAULT_IGNORED_EVENTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            extra_handled_events: Vec::new(),
            bus_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_format() {
        let cfg = Config::default();
        assert_eq!(cfg.topic("12345"), "chatrooms.12345.v2");
    }

    #[test]
    fn test_sentinels() {
        let mut cfg = Config::default();
        assert_eq!(cfg.keepalive(), Some(Duration::from_secs(1200)));
        cfg.keepalive_interval = Duration::ZERO;
        assert_eq!(cfg.keepalive(), None);

        cfg.bus_capacity = 0;
        assert_eq!(cfg.bus_capacity_clamped(), 1);

        cfg.recv_poll = Duration::ZERO;
        assert_eq!(cfg.recv_poll_clamped(), Duration::from_millis(1));
    }

    #[test]
    fn test_default_severe_codes_include_keepalive_code() {
        let cfg = Config::default();
        assert!(cfg.retry.severe_codes.contains(&cfg.keepalive_close_code));
    }
}
