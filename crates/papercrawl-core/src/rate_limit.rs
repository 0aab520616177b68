//! Process-wide minimum-interval rate limiter
//!
//! Upstream services (arXiv, Semantic Scholar) throttle per client, not per
//! endpoint, so one limiter instance guards every outbound call of a run.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::ConfigError;

/// Enforces a minimum wall-clock gap between consecutive [`acquire`](Self::acquire) returns.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    /// Instant the previous `acquire` returned
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Zero interval is a configuration error: it would silently disable limiting.
    pub fn new(min_interval: Duration) -> Result<Self, ConfigError> {
        if min_interval.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "minimum interval must be positive".to_string(),
            ));
        }
        Ok(Self {
            min_interval,
            last: Mutex::new(None),
        })
    }

    /// Block until `min_interval` has passed since the previous permit.
    ///
    /// Returns the instant this permit was stamped; consecutive stamps are
    /// never closer than `min_interval`.
    pub fn acquire(&self) -> Instant {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                log::trace!("rate limiter: waiting {wait:?}");
                std::thread::sleep(wait);
            }
        }
        let now = Instant::now();
        *last = Some(now);
        now
    }

    /// Stamp of the most recent permit, if any.
    pub fn last_permitted(&self) -> Option<Instant> {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_rejected() {
        assert!(matches!(
            RateLimiter::new(Duration::ZERO),
            Err(ConfigError::InvalidInterval(_))
        ));
    }

    #[test]
    fn first_acquire_does_not_wait() {
        let limiter = RateLimiter::new(Duration::from_secs(10)).unwrap();
        let start = Instant::now();
        limiter.acquire();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn consecutive_permits_respect_interval() {
        let interval = Duration::from_millis(40);
        let limiter = RateLimiter::new(interval).unwrap();
        let stamps: Vec<Instant> = (0..4).map(|_| limiter.acquire()).collect();
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= interval);
        }
    }

    #[test]
    fn no_wait_after_interval_already_passed() {
        let interval = Duration::from_millis(20);
        let limiter = RateLimiter::new(interval).unwrap();
        limiter.acquire();
        std::thread::sleep(Duration::from_millis(30));
        let before = Instant::now();
        limiter.acquire();
        assert!(before.elapsed() < Duration::from_millis(15));
    }

    #[test]
    fn last_permitted_tracks_acquire() {
        let limiter = RateLimiter::new(Duration::from_millis(1)).unwrap();
        assert!(limiter.last_permitted().is_none());
        let stamp = limiter.acquire();
        assert_eq!(limiter.last_permitted(), Some(stamp));
    }
}
