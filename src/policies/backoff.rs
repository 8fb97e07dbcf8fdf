//! # Backoff policy for node restarts.
//!
//! The delay for attempt `n` (0-indexed) is `first × factor^n`, clamped to `max`,
//! then jitter is applied. The base is derived purely from the attempt number,
//! so jitter never feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use nodevisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_secs(1),
//!     max: Duration::from_secs(30),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_secs(1));
//! assert_eq!(backoff.next(3), Duration::from_secs(8));
//! assert_eq!(backoff.next(10), Duration::from_secs(30));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Restart backoff policy.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay before the first restart.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Jitter applied to the clamped base.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Constant 100ms delay, capped at 30s, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay for the given attempt number (0-indexed).
    pub fn next(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(first_ms: u64, max_ms: u64, factor: f64) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(first_ms),
            max: Duration::from_millis(max_ms),
            factor,
            jitter: JitterPolicy::None,
        }
    }

    #[test]
    fn test_exponential_growth() {
        let p = policy(100, 30_000, 2.0);
        assert_eq!(p.next(0), Duration::from_millis(100));
        assert_eq!(p.next(1), Duration::from_millis(200));
        assert_eq!(p.next(4), Duration::from_millis(1600));
    }

    #[test]
    fn test_constant_factor() {
        let p = policy(500, 30_000, 1.0);
        for attempt in 0..10 {
            assert_eq!(p.next(attempt), Duration::from_millis(500));
        }
    }

    #[test]
    fn test_clamps() {
        assert_eq!(policy(10_000, 5_000, 2.0).next(0), Duration::from_millis(5_000));
        assert_eq!(policy(100, 1_000, 2.0).next(10), Duration::from_millis(1_000));
        assert_eq!(policy(100, 10_000, 2.0).next(u32::MAX), Duration::from_millis(10_000));
    }

    #[test]
    fn test_equal_jitter_keeps_half() {
        let p = BackoffPolicy {
            jitter: JitterPolicy::Equal,
            ..policy(1_000, 30_000, 1.0)
        };
        for attempt in 0..20 {
            let d = p.next(attempt);
            assert!(d >= Duration::from_millis(500) && d <= Duration::from_millis(1_000));
        }
    }
}
