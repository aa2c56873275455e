//! # ChannelSupervisor: retry loop around sessions for one channel.
//!
//! Runs [`Session`] attempts back to back until cancellation or until a retry
//! track runs out of budget.
//!
//! ## Event flow
//! ```text
//! AttemptStarting → [session] → Ok (cancelled)          → exit Cancelled
//!                             → Err(e) → AttemptFailed
//!                                   ├─► received > 0  → RetryState::reset()
//!                                   └─► RetryPolicy::on_failure(e)
//!                                         ├─► Retry{delay}  → BackoffScheduled → [sleep | cancel]
//!                                         └─► Exhausted     → RetryExhausted   → exit Exhausted
//! ```
//!
//! ## Rules
//! - Attempts run **sequentially**; at most one live session per supervisor.
//! - Counters reset only after an attempt that received at least one frame.
//!   An attempt that subscribes and closes without traffic keeps its counters.
//! - Cancellation is checked before each attempt and races every backoff sleep.

use std::sync::Arc;

use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::channel::ChannelName;
use crate::core::session::{Session, SessionContext};
use crate::error::FailureClass;
use crate::events::{Event, EventKind};
use crate::policies::{RetryDecision, RetryState};

/// Why a supervisor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SupervisorExit {
    /// Cancellation was requested.
    Cancelled,
    /// A retry track ran out of budget.
    Exhausted { class: FailureClass, count: u32 },
}

impl SupervisorExit {
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorExit::Cancelled => "stopped",
            SupervisorExit::Exhausted { .. } => "retry_exhausted",
        }
    }
}

/// Supervises the sessions of a single channel.
pub(crate) struct ChannelSupervisor {
    ctx: Arc<SessionContext>,
    channel: ChannelName,
    state: RetryState,
    attempt: u32,
}

impl ChannelSupervisor {
    pub fn new(ctx: Arc<SessionContext>, channel: ChannelName) -> Self {
        Self {
            ctx,
            channel,
            state: RetryState::default(),
            attempt: 0,
        }
    }

    /// Runs until `token` is cancelled or a retry budget is exhausted.
    pub async fn run(mut self, token: CancellationToken) -> SupervisorExit {
        loop {
            if token.is_cancelled() {
                return SupervisorExit::Cancelled;
            }

            self.attempt = self.attempt.saturating_add(1);
            self.ctx.bus.publish(
                Event::new(EventKind::AttemptStarting)
                    .with_channel(&self.channel)
                    .with_attempt(self.attempt),
            );

            let report = Session::new(&self.ctx, &self.channel, self.attempt, &token)
                .run()
                .await;

            let err = match report.result {
                Ok(()) => return SupervisorExit::Cancelled,
                Err(e) => e,
            };

            if report.received > 0 && !self.state.is_clean() {
                info!(channel = %self.channel, received = report.received, "session recovered, retry counters reset");
                self.state.reset();
            }

            let decision = self.ctx.cfg.retry.on_failure(&mut self.state, &err);
            let class = match decision {
                RetryDecision::Retry { class, .. } | RetryDecision::Exhausted { class, .. } => class,
            };

            let mut failed = Event::new(EventKind::AttemptFailed)
                .with_channel(&self.channel)
                .with_attempt(self.attempt)
                .with_track(class)
                .with_reason(err.to_string());
            if let Some(code) = err.close_code() {
                failed = failed.with_code(code);
            }
            self.ctx.bus.publish(failed);

            match decision {
                RetryDecision::Exhausted { class, count } => {
                    error!(
                        channel = %self.channel,
                        track = class.as_label(),
                        count,
                        error = %err,
                        "retry budget exhausted, stopping"
                    );
                    self.ctx.bus.publish(
                        Event::new(EventKind::RetryExhausted)
                            .with_channel(&self.channel)
                            .with_attempt(count)
                            .with_track(class)
                            .with_reason(err.to_string()),
                    );
                    return SupervisorExit::Exhausted { class, count };
                }
                RetryDecision::Retry {
                    class,
                    count,
                    delay,
                } => {
                    let max = match class {
                        FailureClass::SevereClosure => self.ctx.cfg.retry.connection.max_retries,
                        FailureClass::Generic => self.ctx.cfg.retry.generic.max_retries,
                    };
                    warn!(
                        channel = %self.channel,
                        track = class.as_label(),
                        code = err.close_code(),
                        count,
                        max,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, retrying"
                    );
                    self.ctx.bus.publish(
                        Event::new(EventKind::BackoffScheduled)
                            .with_channel(&self.channel)
                            .with_attempt(count)
                            .with_delay(delay)
                            .with_track(class),
                    );

                    let sleep = time::sleep(delay);
                    tokio::pin!(sleep);
                    select! {
                        _ = &mut sleep => {}
                        _ = token.cancelled() => return SupervisorExit::Cancelled,
                    }
                }
            }
        }
    }
}
