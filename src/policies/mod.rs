//! Retry policies.
//!
//! This module groups the knobs that control **whether** a channel supervisor
//! retries a failed session and **how long** it waits first.
//!
//! ## Contents
//! - [`BackoffPolicy`] how a delay grows with the retry count (first / factor / max / exponent cap)
//! - [`JitterPolicy`]  randomization to avoid synchronized reconnects
//! - [`RetryPolicy`]   two independent [`RetryTrack`]s selected by failure class
//! - [`RetryState`]    per-supervision counters
//!
//! ## Quick wiring
//! ```text
//! Config { retry: RetryPolicy, .. }
//!      └─► core::supervisor::ChannelSupervisor uses:
//!           - retry.on_failure(&mut state, &err) to pick track, count and delay
//!           - state.reset() after a session that received at least one message
//! ```

mod backoff;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use retry::{RetryDecision, RetryPolicy, RetryState, RetryTrack};
