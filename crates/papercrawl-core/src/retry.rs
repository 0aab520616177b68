//! Bounded retry with exponential backoff for stage operations

use std::fmt;
use std::time::Duration;

use indicatif::ProgressBar;

use crate::error::{ConfigError, ErrorKind, StageError};
use crate::rate_limit::RateLimiter;

/// Upper bound on `max_attempts`; beyond this the backoff grows absurd.
const MAX_ATTEMPTS_LIMIT: u32 = 32;

/// Longest sleep between two attempts; the exponential schedule saturates here.
pub const MAX_BACKOFF: Duration = Duration::from_secs(3600);

/// Terminal failure of a retried operation.
#[derive(Debug)]
pub struct RetryFailure {
    /// Error returned by the last attempt
    pub error: StageError,
    /// Number of times the operation was invoked
    pub attempts: u32,
}

impl RetryFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl fmt::Display for RetryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = if self.attempts == 1 { "" } else { "s" };
        write!(f, "{} (after {} attempt{plural})", self.error, self.attempts)
    }
}

impl std::error::Error for RetryFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Retry policy: at most `max_attempts` invocations, sleeping
/// `initial_delay × backoff_multiplier^(n-1)` after the n-th failed attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_multiplier: f64,
    retryable: Vec<ErrorKind>,
}

impl Default for RetryPolicy {
    /// 3 attempts, 1s initial delay, doubling.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            retryable: ErrorKind::DEFAULT_RETRYABLE.to_vec(),
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        backoff_multiplier: f64,
        retryable: &[ErrorKind],
    ) -> Result<Self, ConfigError> {
        if max_attempts == 0 || max_attempts > MAX_ATTEMPTS_LIMIT {
            return Err(ConfigError::InvalidRetryPolicy(format!(
                "max_attempts must be in 1..={MAX_ATTEMPTS_LIMIT}, got {max_attempts}"
            )));
        }
        if initial_delay.is_zero() {
            return Err(ConfigError::InvalidRetryPolicy(
                "initial delay must be positive".to_string(),
            ));
        }
        // Strictly increasing delays need a multiplier above 1
        if !backoff_multiplier.is_finite() || backoff_multiplier <= 1.0 {
            return Err(ConfigError::InvalidRetryPolicy(format!(
                "backoff multiplier must be > 1, got {backoff_multiplier}"
            )));
        }
        Ok(Self {
            max_attempts,
            initial_delay,
            backoff_multiplier,
            retryable: retryable.to_vec(),
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// Delay after the `attempt`-th failure (1-based): 1s, 2s, 4s, ... by default,
    /// capped at [`MAX_BACKOFF`].
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(MAX_ATTEMPTS_LIMIT) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exp);
        Duration::try_from_secs_f64(secs).map_or(MAX_BACKOFF, |d| d.min(MAX_BACKOFF))
    }

    /// Run `attempt_fn` until it succeeds, fails with a non-retryable kind,
    /// or `max_attempts` is exhausted.
    pub fn execute<T>(
        &self,
        label: &str,
        pb: &ProgressBar,
        mut attempt_fn: impl FnMut() -> Result<T, StageError>,
    ) -> Result<T, RetryFailure> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match attempt_fn() {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_attempts && self.is_retryable(e.kind()) => {
                    let mut delay = self.backoff_duration(attempt);
                    if let Some(hint) = e.retry_after() {
                        delay = delay.max(hint);
                    }
                    pb.set_message(format!("{label}: retry {attempt}/{}...", self.max_attempts));
                    log::warn!(
                        "{label}: attempt {attempt}/{} failed: {e}, retrying in {delay:?}",
                        self.max_attempts
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => {
                    log::debug!("{label}: giving up after {attempt} attempt(s): {e}");
                    return Err(RetryFailure {
                        error: e,
                        attempts: attempt,
                    });
                }
            }
        }
    }

    /// Like [`execute`](Self::execute), taking one rate-limiter permit before every attempt.
    pub fn execute_guarded<T>(
        &self,
        limiter: &RateLimiter,
        label: &str,
        pb: &ProgressBar,
        mut attempt_fn: impl FnMut() -> Result<T, StageError>,
    ) -> Result<T, RetryFailure> {
        self.execute(label, pb, || {
            limiter.acquire();
            attempt_fn()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::time::Instant;

    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(5),
            2.0,
            ErrorKind::DEFAULT_RETRYABLE,
        )
        .unwrap()
    }

    #[test]
    fn backoff_exponential() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_duration(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_duration(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_duration(3), Duration::from_secs(4));
    }

    #[test]
    fn backoff_saturates_at_cap() {
        let policy =
            RetryPolicy::new(32, Duration::from_secs(1), 10.0, ErrorKind::DEFAULT_RETRYABLE)
                .unwrap();
        assert_eq!(policy.backoff_duration(3), Duration::from_secs(100));
        assert_eq!(policy.backoff_duration(31), MAX_BACKOFF);
        assert_eq!(policy.backoff_duration(u32::MAX), MAX_BACKOFF);

        let policy = RetryPolicy::new(32, Duration::from_secs(1), f64::MAX, &[]).unwrap();
        assert_eq!(policy.backoff_duration(2), MAX_BACKOFF);
        assert_eq!(policy.backoff_duration(32), MAX_BACKOFF);
    }

    #[test]
    fn rejects_bad_parameters() {
        let kinds = ErrorKind::DEFAULT_RETRYABLE;
        assert!(RetryPolicy::new(0, Duration::from_secs(1), 2.0, kinds).is_err());
        assert!(RetryPolicy::new(3, Duration::ZERO, 2.0, kinds).is_err());
        assert!(RetryPolicy::new(3, Duration::from_secs(1), 1.0, kinds).is_err());
        assert!(RetryPolicy::new(3, Duration::from_secs(1), f64::NAN, kinds).is_err());
        assert!(RetryPolicy::new(100, Duration::from_secs(1), 2.0, kinds).is_err());
    }

    #[test]
    fn success_first_try() {
        let calls = Cell::new(0);
        let result = fast_policy(3).execute("t", &ProgressBar::hidden(), || {
            calls.set(calls.get() + 1);
            Ok::<_, StageError>(42)
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn non_retryable_short_circuits() {
        let calls = Cell::new(0);
        let result: Result<(), _> = fast_policy(5).execute("t", &ProgressBar::hidden(), || {
            calls.set(calls.get() + 1);
            Err(StageError::NotFound("gone".into()))
        });
        let failure = result.unwrap_err();
        assert_eq!(calls.get(), 1);
        assert_eq!(failure.attempts, 1);
        assert_eq!(failure.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn retryable_exhausts_attempts_with_growing_delays() {
        let mut stamps = Vec::new();
        let result: Result<(), _> = fast_policy(4).execute("t", &ProgressBar::hidden(), || {
            stamps.push(Instant::now());
            Err(StageError::Transient("flaky".into()))
        });
        let failure = result.unwrap_err();
        assert_eq!(failure.attempts, 4);
        assert_eq!(stamps.len(), 4);

        let gaps: Vec<Duration> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
        // Each gap covers at least its scheduled backoff: 5ms, 10ms, 20ms
        assert!(gaps[0] >= Duration::from_millis(5));
        assert!(gaps[1] >= Duration::from_millis(10));
        assert!(gaps[2] >= Duration::from_millis(20));
    }

    #[test]
    fn recovers_after_transient_failure() {
        let calls = Cell::new(0);
        let result = fast_policy(3).execute("t", &ProgressBar::hidden(), || {
            calls.set(calls.get() + 1);
            if calls.get() < 2 {
                Err(StageError::RateLimited {
                    retry_after: None,
                    message: "slow down".into(),
                })
            } else {
                Ok("done")
            }
        });
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn retry_after_hint_extends_delay() {
        let hint = Duration::from_millis(60);
        let mut stamps = Vec::new();
        let result = fast_policy(3).execute("t", &ProgressBar::hidden(), || {
            stamps.push(Instant::now());
            if stamps.len() == 1 {
                Err(StageError::RateLimited {
                    retry_after: Some(hint),
                    message: "HTTP 429".into(),
                })
            } else {
                Ok(())
            }
        });
        assert!(result.is_ok());
        assert_eq!(stamps.len(), 2);
        // Scheduled backoff is 5ms; the server hint wins
        assert!(stamps[1] - stamps[0] >= hint);
    }

    #[test]
    fn custom_retryable_set() {
        let policy = RetryPolicy::new(
            3,
            Duration::from_millis(1),
            2.0,
            &[ErrorKind::CorruptArchive],
        )
        .unwrap();
        let calls = Cell::new(0);
        let _ = policy.execute("t", &ProgressBar::hidden(), || {
            calls.set(calls.get() + 1);
            Err::<(), _>(StageError::Transient("not in set".into()))
        });
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn guarded_takes_permit_per_attempt() {
        let interval = Duration::from_millis(15);
        let limiter = RateLimiter::new(interval).unwrap();
        let mut permits = Vec::new();
        let _ = fast_policy(3).execute_guarded(&limiter, "t", &ProgressBar::hidden(), || {
            permits.push(limiter.last_permitted().unwrap());
            Err::<(), _>(StageError::Transient("again".into()))
        });
        assert_eq!(permits.len(), 3);
        for pair in permits.windows(2) {
            assert!(pair[1] - pair[0] >= interval);
        }
    }

    #[test]
    fn failure_display_mentions_attempts() {
        let failure = RetryFailure {
            error: StageError::Transient("timeout".into()),
            attempts: 3,
        };
        assert_eq!(failure.to_string(), "transient: timeout (after 3 attempts)");
    }
}
