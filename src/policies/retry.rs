//! # Two-track retry policy.
//!
//! A channel supervisor charges every failed session attempt to one of two
//! independent tracks:
//!
//! ```text
//! SessionError ──classify(severe_codes)──┬─► SevereClosure ─► connection track
//!                                        │     max 50, delay = min(1s × 1.5^min(n,8), 30s)
//!                                        │     for n ≤ 10, flat 30s afterwards
//!                                        └─► Generic ───────► generic track
//!                                              max 10, delay = 2s × 2^(n-1), uncapped
//! ```
//!
//! Counters live in [`RetryState`], are only ever incremented by
//! [`RetryPolicy::on_failure`], and are zeroed by [`RetryState::reset`] once a
//! session has proven itself by receiving at least one message.

use std::time::Duration;

use crate::error::{CLOSE_INTERNAL_ERROR, CLOSE_SERVER_RESTART, FailureClass, SessionError};
use crate::policies::{BackoffPolicy, JitterPolicy};

/// Budget and delay curve for one failure class.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryTrack {
    /// Retries allowed; the failure that pushes the counter past it is terminal.
    pub max_retries: u32,
    /// Delay curve.
    pub backoff: BackoffPolicy,
    /// Subtracted from the retry count to obtain the backoff exponent.
    pub exponent_offset: u32,
    /// Once the retry count exceeds this, the delay stays at the curve ceiling.
    pub flat_after: Option<u32>,
}

impl RetryTrack {
    /// Generic failures: `2s × 2^(n-1)`, no cap, 10 retries.
    pub fn generic() -> Self {
        Self {
            max_retries: 10,
            backoff: BackoffPolicy {
                first: Duration::from_secs(2),
                factor: 2.0,
                max: None,
                max_exponent: None,
                jitter: JitterPolicy::None,
            },
            exponent_offset: 1,
            flat_after: None,
        }
    }

    /// Severe closures: `min(1s × 1.5^min(n,8), 30s)` for the first 10, then 30s; 50 retries.
    pub fn connection() -> Self {
        Self {
            max_retries: 50,
            backoff: BackoffPolicy {
                first: Duration::from_secs(1),
                factor: 1.5,
                max: Some(Duration::from_secs(30)),
                max_exponent: Some(8),
                jitter: JitterPolicy::None,
            },
            exponent_offset: 0,
            flat_after: Some(10),
        }
    }

    /// Delay before retry number `count` (1-based).
    pub fn delay(&self, count: u32) -> Duration {
        match self.flat_after {
            Some(limit) if count > limit => self.backoff.ceiling(),
            _ => self
                .backoff
                .next(count.saturating_sub(self.exponent_offset)),
        }
    }

    /// Returns `true` if `count` is past the budget.
    #[inline]
    pub fn exhausted(&self, count: u32) -> bool {
        count > self.max_retries
    }
}

/// Per-supervision retry counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Failures charged to the generic track.
    pub generic: u32,
    /// Failures charged to the connection track.
    pub connection: u32,
}

impl RetryState {
    /// Zeroes both counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Returns `true` if no failure has been counted since the last reset.
    pub fn is_clean(&self) -> bool {
        self.generic == 0 && self.connection == 0
    }
}

/// What the supervisor does after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay` (cancellably), then run another attempt.
    Retry {
        class: FailureClass,
        count: u32,
        delay: Duration,
    },
    /// Budget exhausted: supervision ends.
    Exhausted { class: FailureClass, count: u32 },
}

/// Both tracks plus the close codes that select the connection track.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub generic: RetryTrack,
    pub connection: RetryTrack,
    /// Close codes treated as severe (server restart, keepalive timeout).
    pub severe_codes: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            generic: RetryTrack::generic(),
            connection: RetryTrack::connection(),
            severe_codes: vec![CLOSE_SERVER_RESTART, CLOSE_INTERNAL_ERROR],
        }
    }
}

impl RetryPolicy {
    /// Classifies `err`, charges the matching counter and decides.
    pub fn on_failure(&self, state: &mut RetryState, err: &SessionError) -> RetryDecision {
        self.decide(state, err.classify(&self.severe_codes))
    }

    /// Charges one failure of `class` and decides.
    pub fn decide(&self, state: &mut RetryState, class: FailureClass) -> RetryDecision {
        let (track, counter) = match class {
            FailureClass::SevereClosure => (&self.connection, &mut state.connection),
            FailureClass::Generic => (&self.generic, &mut state.generic),
        };
        *counter = counter.saturating_add(1);
        let count = *counter;

        if track.exhausted(count) {
            RetryDecision::Exhausted { class, count }
        } else {
            RetryDecision::Retry {
                class,
                count,
                delay: track.delay(count),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CLOSE_NORMAL, Closure};

    fn severe() -> SessionError {
        SessionError::Closed(Closure::new(CLOSE_SERVER_RESTART, "restart"))
    }

    fn ordinary() -> SessionError {
        SessionError::Closed(Closure::new(CLOSE_NORMAL, "bye"))
    }

    #[test]
    fn test_connection_delay_sequence() {
        let track = RetryTrack::connection();
        for k in 1..=10u32 {
            let expected = (1.5f64.powi(k.min(8) as i32)).min(30.0);
            assert_eq!(
                track.delay(k),
                Duration::from_secs_f64(expected),
                "attempt {k}"
            );
        }
        for k in 11..=60u32 {
            assert_eq!(track.delay(k), Duration::from_secs(30), "attempt {k}");
        }
    }

    #[test]
    fn test_generic_delay_sequence_uncapped() {
        let track = RetryTrack::generic();
        assert_eq!(track.delay(1), Duration::from_secs(2));
        assert_eq!(track.delay(2), Duration::from_secs(4));
        assert_eq!(track.delay(5), Duration::from_secs(32));
        assert_eq!(track.delay(10), Duration::from_secs(1024));
        assert_eq!(track.delay(15), Duration::from_secs(32768));
    }

    #[test]
    fn test_severe_failures_charge_connection_track() {
        let policy = RetryPolicy::default();
        let mut state = RetryState::default();

        let d = policy.on_failure(&mut state, &severe());
        assert_eq!(
            d,
            RetryDecision::Retry {
                class: FailureClass::SevereClosure,
                count: 1,
                delay: Duration::from_secs_f64(1.5),
            }
        );
        assert_eq!(state, RetryState { generic: 0, connection: 1 });
    }

    #[test]
    fn test_ordinary_closures_charge_generic_track() {
        let policy = RetryPolicy::default();
        let mut state = RetryState::default();

        for n in 1..=10 {
            match policy.on_failure(&mut state, &ordinary()) {
                RetryDecision::Retry { class, count, .. } => {
                    assert_eq!(class, FailureClass::Generic);
                    assert_eq!(count, n);
                }
                other => panic!("unexpected {other:?} at {n}"),
            }
        }
        assert_eq!(
            policy.on_failure(&mut state, &ordinary()),
            RetryDecision::Exhausted {
                class: FailureClass::Generic,
                count: 11
            }
        );
        assert_eq!(state.connection, 0);
    }

    #[test]
    fn test_connection_track_exhausts_after_fifty() {
        let policy = RetryPolicy::default();
        let mut state = RetryState::default();
        for _ in 0..50 {
            assert!(matches!(
                policy.on_failure(&mut state, &severe()),
                RetryDecision::Retry { .. }
            ));
        }
        assert!(matches!(
            policy.on_failure(&mut state, &severe()),
            RetryDecision::Exhausted { count: 51, .. }
        ));
        assert_eq!(state.generic, 0);
    }

    #[test]
    fn test_tracks_are_independent() {
        let policy = RetryPolicy::default();
        let mut state = RetryState::default();
        policy.on_failure(&mut state, &severe());
        policy.on_failure(&mut state, &ordinary());
        policy.on_failure(&mut state, &severe());
        assert_eq!(state, RetryState { generic: 1, connection: 2 });

        state.reset();
        assert!(state.is_clean());
    }
}
