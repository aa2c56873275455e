//! # Session: one connection attempt for one channel.
//!
//! ```text
//! resolve(name) ──► connect(endpoint) ──► send subscribe(topic) ──► SessionEstablished
//!                                                │
//!            ┌───────────────────────────────────┘
//!            ▼
//!   loop {
//!     cancelled?                      → Ok(())
//!     keepalive due?  ping (≤ timeout) → ok: reset failures + clock
//!                                      → timeout: failures += 1, reset clock,
//!                                        failures == max → Closed(1011 "ping timeout")
//!                                      → closed: propagate
//!     recv (≤ recv_poll)              → nothing: loop
//!                                      → text: decode → classify → dispatch
//!   }
//!   close transport
//! ```
//!
//! ## Rules
//! - Every suspension point races the cancellation token, so a stop request
//!   is observed within one receive poll.
//! - Decode failures, storage failures and overflow-log failures are logged and
//!   swallowed; only closures and attempt-level errors end the attempt.
//! - Messages are dispatched in arrival order; nothing is buffered or batched.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::ChannelName;
use crate::config::Config;
use crate::error::{Closure, SessionError};
use crate::events::{Bus, Event, EventKind};
use crate::lookup::ChannelLookup;
use crate::protocol::{Classification, Classifier, Envelope, OverflowLog, subscribe_message};
use crate::storage::Storage;
use crate::transport::{Connector, Transport};

/// Upper bound for the closing handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Collaborators shared by every session of every channel.
pub(crate) struct SessionContext {
    pub cfg: Arc<Config>,
    pub lookup: Arc<dyn ChannelLookup>,
    pub connector: Arc<dyn Connector>,
    pub storage: Arc<dyn Storage>,
    pub classifier: Classifier,
    pub overflow: OverflowLog,
    pub bus: Bus,
}

impl SessionContext {
    pub fn new(
        cfg: Arc<Config>,
        lookup: Arc<dyn ChannelLookup>,
        connector: Arc<dyn Connector>,
        storage: Arc<dyn Storage>,
        bus: Bus,
    ) -> Self {
        let classifier = Classifier::new(
            cfg.ignored_events.iter().cloned(),
            cfg.extra_handled_events.iter().cloned(),
        );
        let overflow = OverflowLog::new(cfg.overflow_log.clone());
        Self {
            cfg,
            lookup,
            connector,
            storage,
            classifier,
            overflow,
            bus,
        }
    }
}

/// How one attempt ended.
#[derive(Debug)]
pub(crate) struct AttemptReport {
    /// Text frames received during the attempt.
    pub received: u64,
    /// `Ok(())` only when the attempt ended because of cancellation.
    pub result: Result<(), SessionError>,
}

/// Per-attempt counters.
#[derive(Default)]
struct Tally {
    received: u64,
    stored: u64,
    unhandled: u64,
}

/// Keepalive bookkeeping for one connection.
struct Keepalive {
    interval: Option<Duration>,
    last: Instant,
    failures: u32,
}

impl Keepalive {
    fn new(interval: Option<Duration>) -> Self {
        Self {
            interval,
            last: Instant::now(),
            failures: 0,
        }
    }

    fn due(&self) -> bool {
        self.interval
            .is_some_and(|every| self.last.elapsed() > every)
    }
}

/// Runs a single attempt; never retries.
pub(crate) struct Session<'a> {
    ctx: &'a SessionContext,
    channel: &'a ChannelName,
    attempt: u32,
    token: &'a CancellationToken,
    tally: Tally,
}

impl<'a> Session<'a> {
    pub fn new(
        ctx: &'a SessionContext,
        channel: &'a ChannelName,
        attempt: u32,
        token: &'a CancellationToken,
    ) -> Self {
        Self {
            ctx,
            channel,
            attempt,
            token,
            tally: Tally::default(),
        }
    }

    /// Runs the attempt to completion.
    pub async fn run(mut self) -> AttemptReport {
        let result = self.attempt().await;
        debug!(
            channel = %self.channel,
            attempt = self.attempt,
            received = self.tally.received,
            stored = self.tally.stored,
            unhandled = self.tally.unhandled,
            "attempt finished"
        );
        AttemptReport {
            received: self.tally.received,
            result,
        }
    }

    async fn attempt(&mut self) -> Result<(), SessionError> {
        let ctx = self.ctx;
        let token = self.token;

        let resolved = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            r = ctx.lookup.resolve(self.channel) => r?,
        };
        let topic = ctx.cfg.topic(&resolved.session_id);
        debug!(channel = %self.channel, session_id = %resolved.session_id, "channel resolved");

        let mut transport = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            r = ctx.connector.connect(&ctx.cfg.endpoint) => r?,
        };
        info!(channel = %self.channel, attempt = self.attempt, "connected");

        let result = self.drive(transport.as_mut(), &topic).await;

        if time::timeout(CLOSE_TIMEOUT, transport.close()).await.is_err() {
            debug!(channel = %self.channel, "close handshake timed out");
        }
        info!(channel = %self.channel, "disconnected");
        result
    }

    async fn drive(
        &mut self,
        transport: &mut dyn Transport,
        topic: &str,
    ) -> Result<(), SessionError> {
        let ctx = self.ctx;
        let token = self.token;

        transport
            .send_text(subscribe_message(&ctx.cfg.subscribe_event, topic))
            .await?;
        ctx.bus.publish(
            Event::new(EventKind::SessionEstablished)
                .with_channel(self.channel)
                .with_attempt(self.attempt)
                .with_reason(topic),
        );

        let poll = ctx.cfg.recv_poll_clamped();
        let mut keepalive = Keepalive::new(ctx.cfg.keepalive());

        loop {
            if token.is_cancelled() {
                return Ok(());
            }

            if keepalive.due() {
                let ping = time::timeout(ctx.cfg.keepalive_timeout, transport.ping());
                tokio::select! {
                    _ = token.cancelled() => return Ok(()),
                    r = ping => match r {
                        Ok(Ok(())) => {
                            keepalive.failures = 0;
                            keepalive.last = Instant::now();
                            debug!(channel = %self.channel, "keepalive ok");
                        }
                        Ok(Err(e)) => {
                            warn!(channel = %self.channel, error = %e, "connection lost during keepalive");
                            return Err(e);
                        }
                        Err(_elapsed) => {
                            keepalive.failures += 1;
                            keepalive.last = Instant::now();
                            warn!(
                                channel = %self.channel,
                                failures = keepalive.failures,
                                max = ctx.cfg.keepalive_max_failures,
                                "keepalive timed out"
                            );
                            if keepalive.failures >= ctx.cfg.keepalive_max_failures {
                                error!(channel = %self.channel, "keepalive failures exhausted, closing");
                                return Err(SessionError::Closed(Closure::keepalive(
                                    ctx.cfg.keepalive_close_code,
                                )));
                            }
                        }
                    }
                }
            }

            let text = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                r = time::timeout(poll, transport.recv()) => match r {
                    Err(_elapsed) => continue,
                    Ok(r) => r?,
                },
            };
            self.tally.received += 1;
            self.dispatch(&text).await;
        }
    }

    /// Decodes, classifies and forwards one frame. Never fails.
    async fn dispatch(&mut self, text: &str) {
        let ctx = self.ctx;
        let env = match Envelope::decode(text) {
            Ok(env) => env,
            Err(e) => {
                warn!(channel = %self.channel, error = %e, "undecodable frame dropped");
                return;
            }
        };

        match ctx.classifier.classify(env) {
            Classification::Ignored => {}
            Classification::Handled(event) => {
                match ctx.storage.store_event(self.channel, &event).await {
                    Ok(true) => self.tally.stored += 1,
                    Ok(false) => {
                        warn!(channel = %self.channel, kind = %event.kind, "event not stored: channel not tracked");
                    }
                    Err(e) => {
                        error!(
                            channel = %self.channel,
                            kind = %event.kind,
                            error = %e,
                            label = e.as_label(),
                            "failed to store event"
                        );
                    }
                }
            }
            Classification::Unhandled(env) => {
                self.tally.unhandled += 1;
                debug!(channel = %self.channel, event = %env.event, "unhandled event");
                if let Err(e) = ctx.overflow.append(&env.raw).await {
                    error!(
                        channel = %self.channel,
                        path = %ctx.overflow.path().display(),
                        error = %e,
                        "failed to append to overflow log"
                    );
                }
            }
        }
    }
}
