//! Retry policy and predicates for handling transient failures.
//!
//! The client wraps every request in a bounded loop of `max_retries + 1`
//! attempts. Between attempts it sleeps for an exponentially growing, jittered
//! delay computed by [`RetryPolicy::delay_for_attempt`]. Whether a failure is
//! worth another attempt is decided by a [`RetryPredicate`].

use crate::Error;
use rand::Rng;
use std::time::Duration;

/// Longest pause a policy may ask for between attempts.
pub const MAX_DELAY_LIMIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Defines how many times and how long to wait between retries.
///
/// The delay after failed attempt `a` (0-indexed) is
/// `min(base_delay * backoff_multiplier^a + jitter, max_delay)`, where jitter
/// is drawn uniformly from `[0, 10%)` of the exponential term.
///
/// # Examples
///
/// ```
/// use nfeio_http::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy {
///     max_retries: 5,
///     base_delay: Duration::from_millis(100),
///     max_delay: Duration::from_secs(30),
///     backoff_multiplier: 2.0,
/// };
///
/// // 100ms, 200ms, 400ms... before jitter
/// assert_eq!(policy.exponential_delay(2), Duration::from_millis(400));
/// assert!(policy.delay_for_attempt(2) >= Duration::from_millis(400));
/// assert!(policy.delay_for_attempt(20) <= Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt. `0` disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry, before jitter.
    pub base_delay: Duration,
    /// Upper bound for any single delay, jitter included.
    pub max_delay: Duration,
    /// Growth factor per attempt. Must be greater than `1.0`.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Returns `base_delay * backoff_multiplier^attempt`, capped at `max_delay`.
    pub fn exponential_delay(&self, attempt: u32) -> Duration {
        self.ms_to_duration(self.exponential_ms(attempt))
    }

    /// Returns the jittered delay to sleep after failed attempt `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponential = self.exponential_ms(attempt);
        let jitter = if exponential > 0.0 {
            rand::thread_rng().gen_range(0.0..exponential * 0.1)
        } else {
            0.0
        };
        let max_ms = self.max_delay.as_secs_f64() * 1000.0;
        self.ms_to_duration((exponential + jitter).min(max_ms))
    }

    // f64 milliseconds lose precision near Duration::MAX; fall back to the cap.
    fn ms_to_duration(&self, ms: f64) -> Duration {
        Duration::try_from_secs_f64(ms / 1000.0)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn exponential_ms(&self, attempt: u32) -> f64 {
        let base_ms = self.base_delay.as_secs_f64() * 1000.0;
        let max_ms = self.max_delay.as_secs_f64() * 1000.0;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = base_ms * self.backoff_multiplier.powi(exponent);
        if delay.is_finite() {
            delay.min(max_ms)
        } else {
            max_ms
        }
    }

    pub(crate) fn validate(&self) -> crate::Result<()> {
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier <= 1.0 {
            return Err(Error::configuration(format!(
                "backoff_multiplier must be greater than 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.max_delay > MAX_DELAY_LIMIT {
            return Err(Error::configuration(format!(
                "max_delay must not exceed {}s, got {:?}",
                MAX_DELAY_LIMIT.as_secs(),
                self.max_delay
            )));
        }
        if self.base_delay > self.max_delay {
            return Err(Error::configuration(
                "base_delay must not exceed max_delay",
            ));
        }
        Ok(())
    }
}

/// Trait for determining whether a failed request should be retried.
///
/// The retry ceiling is enforced by the client before the predicate is
/// consulted, so a predicate only decides retryability, never the count.
///
/// # Examples
///
/// ```
/// use nfeio_http::{Error, ErrorKind, RetryPredicate};
///
/// struct RetryOnlyTimeouts;
///
/// impl RetryPredicate for RetryOnlyTimeouts {
///     fn should_retry(&self, error: &Error, _attempt: u32) -> bool {
///         error.kind() == ErrorKind::Timeout
///     }
/// }
/// ```
pub trait RetryPredicate: Send + Sync {
    /// Determines whether the request should be retried.
    ///
    /// `attempt` is the 0-indexed attempt that just failed.
    fn should_retry(&self, error: &Error, attempt: u32) -> bool;
}

/// Retry all errors that are marked as retryable.
///
/// This uses [`Error::is_retryable`] and is the default predicate.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnRetryable;

impl RetryPredicate for RetryOnRetryable {
    fn should_retry(&self, error: &Error, _attempt: u32) -> bool {
        error.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn policy(base_ms: u64, max_ms: u64, multiplier: f64) -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
            backoff_multiplier: multiplier,
        }
    }

    #[test]
    fn test_exponential_delays() {
        let policy = policy(100, 10_000, 2.0);

        assert_eq!(policy.exponential_delay(0), Duration::from_millis(100));
        assert_eq!(policy.exponential_delay(1), Duration::from_millis(200));
        assert_eq!(policy.exponential_delay(2), Duration::from_millis(400));
        assert_eq!(policy.exponential_delay(3), Duration::from_millis(800));
        assert_eq!(policy.exponential_delay(10), Duration::from_millis(10_000));
    }

    #[test]
    fn test_delay_within_bounds() {
        let policy = policy(100, 5_000, 1.5);

        for attempt in 0..40 {
            let floor = policy.exponential_delay(attempt);
            for _ in 0..20 {
                let delay = policy.delay_for_attempt(attempt);
                assert!(delay <= policy.max_delay, "attempt {attempt}: {delay:?}");
                assert!(delay >= floor, "attempt {attempt}: {delay:?} < {floor:?}");
            }
        }
    }

    #[test]
    fn test_jitter_is_below_ten_percent() {
        let policy = policy(1_000, 60_000, 2.0);

        for _ in 0..50 {
            let delay = policy.delay_for_attempt(0);
            assert!(delay >= Duration::from_millis(1_000));
            assert!(delay < Duration::from_millis(1_100));
        }
    }

    #[test]
    fn test_huge_attempts_do_not_overflow() {
        let policy = policy(1_000, 30_000, 10.0);
        assert_eq!(policy.exponential_delay(u32::MAX), Duration::from_millis(30_000));
        assert!(policy.delay_for_attempt(u32::MAX) <= Duration::from_millis(30_000));
    }

    #[test]
    fn test_zero_base_delay() {
        let policy = policy(0, 1_000, 2.0);
        assert_eq!(policy.delay_for_attempt(3), Duration::ZERO);
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::none().validate().is_ok());

        let err = policy(100, 1_000, 1.0).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = policy(100, 1_000, f64::NAN).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = policy(2_000, 1_000, 2.0).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let unbounded = RetryPolicy {
            max_delay: Duration::MAX,
            ..RetryPolicy::default()
        };
        let err = unbounded.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_near_max_duration_does_not_panic() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::MAX / 2,
            max_delay: Duration::MAX,
            backoff_multiplier: 2.0,
        };
        assert!(policy.exponential_delay(10) > Duration::MAX / 2);
        assert!(policy.delay_for_attempt(10) <= Duration::MAX);
    }

    #[test]
    fn test_retry_on_retryable_delegates() {
        let predicate = RetryOnRetryable;
        assert!(predicate.should_retry(&Error::connection("reset"), 0));
        assert!(!predicate.should_retry(&Error::configuration("bad"), 0));
    }
}
