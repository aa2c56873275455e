//! # Backoff curve for retry delays.
//!
//! [`BackoffPolicy`] maps an exponent to a delay:
//!
//! ```text
//! delay(n) = first × factor^min(n, max_exponent)     then clamped to `max` (if any)
//! ```
//!
//! then jitter is applied. The base delay is derived purely from `n`, so jitter
//! output never feeds back into later calculations.
//!
//! `max = None` means the curve is unbounded: it keeps doubling (or whatever
//! `factor` says) for as long as the caller keeps asking.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use roomvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_secs(1),
//!     factor: 1.5,
//!     max: Some(Duration::from_secs(30)),
//!     max_exponent: Some(8),
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_secs(1));
//! assert_eq!(backoff.next(2), Duration::from_secs_f64(2.25));
//! // exponent capped at 8
//! assert_eq!(backoff.next(9), backoff.next(8));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Exponential backoff curve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay for exponent 0.
    pub first: Duration,
    /// Multiplicative growth factor (`>= 1.0` expected).
    pub factor: f64,
    /// Upper clamp; `None` leaves the curve unbounded.
    pub max: Option<Duration>,
    /// Exponent cap; larger exponents behave like this one.
    pub max_exponent: Option<u32>,
    /// Randomization applied after clamping.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a doubling curve from 1s, capped at 30s, without jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            factor: 2.0,
            max: Some(Duration::from_secs(30)),
            max_exponent: None,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay for exponent `n`.
    ///
    /// Overflowing or non-finite intermediate values saturate to `max`, or to
    /// [`Duration::MAX`] for unbounded curves.
    pub fn next(&self, n: u32) -> Duration {
        self.jitter.apply(self.base(n))
    }

    /// The un-jittered delay for exponent `n`.
    pub fn base(&self, n: u32) -> Duration {
        let exp = self.max_exponent.map_or(n, |cap| n.min(cap));
        let exp = exp.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let unclamped = if secs.is_finite() && secs >= 0.0 {
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        } else {
            Duration::MAX
        };

        match self.max {
            Some(max) => unclamped.min(max),
            None => unclamped,
        }
    }

    /// The ceiling delay: `max`, or the un-jittered `first` for unbounded curves.
    pub fn ceiling(&self) -> Duration {
        self.jitter.apply(self.max.unwrap_or(self.first))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubling(max: Option<Duration>) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_secs(2),
            factor: 2.0,
            max,
            max_exponent: None,
            jitter: JitterPolicy::None,
        }
    }

    #[test]
    fn test_exponent_zero_returns_first() {
        assert_eq!(doubling(None).next(0), Duration::from_secs(2));
    }

    #[test]
    fn test_exponential_growth_no_jitter() {
        let policy = doubling(None);
        assert_eq!(policy.next(1), Duration::from_secs(4));
        assert_eq!(policy.next(2), Duration::from_secs(8));
        assert_eq!(policy.next(9), Duration::from_secs(1024));
    }

    #[test]
    fn test_unbounded_curve_has_no_cap() {
        let policy = doubling(None);
        assert_eq!(policy.next(20), Duration::from_secs(2 * (1 << 20)));
    }

    #[test]
    fn test_clamped_to_max() {
        let policy = doubling(Some(Duration::from_secs(30)));
        assert_eq!(policy.next(3), Duration::from_secs(16));
        assert_eq!(policy.next(4), Duration::from_secs(30));
        assert_eq!(policy.next(10), Duration::from_secs(30));
    }

    #[test]
    fn test_exponent_cap() {
        let policy = BackoffPolicy {
            first: Duration::from_secs(1),
            factor: 1.5,
            max: Some(Duration::from_secs(30)),
            max_exponent: Some(8),
            jitter: JitterPolicy::None,
        };
        let capped = Duration::from_secs_f64(1.5f64.powi(8));
        assert_eq!(policy.next(8), capped);
        assert_eq!(policy.next(9), capped);
        assert_eq!(policy.next(u32::MAX), capped);
    }

    #[test]
    fn test_overflow_saturates() {
        assert_eq!(doubling(None).next(u32::MAX), Duration::MAX);
        assert_eq!(
            doubling(Some(Duration::from_secs(10))).next(u32::MAX),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_ceiling() {
        assert_eq!(
            doubling(Some(Duration::from_secs(30))).ceiling(),
            Duration::from_secs(30)
        );
        assert_eq!(doubling(None).ceiling(), Duration::from_secs(2));
    }

    #[test]
    fn test_full_jitter_never_exceeds_base() {
        let policy = BackoffPolicy {
            jitter: JitterPolicy::Full,
            ..doubling(Some(Duration::from_secs(30)))
        };
        for n in 0..12 {
            assert!(policy.next(n) <= policy.base(n), "exponent {n}");
        }
    }
}
