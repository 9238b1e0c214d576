//! Failsafe mechanisms (spec §4.4, §4.5, §7): rate limiting, the circuit
//! breaker, and transient-error retry, bundled per backend/issuer into one
//! `Failsafe` wrapper.

mod circuit_breaker;
mod rate_limiter;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerStats, CircuitState, OnStateChange, build_circuit_breaker_error};
pub use rate_limiter::{InMemorySlidingStore, RateLimiter, RateLimiterStore, SlidingWindowLimiter, TokenBucketLimiter};
pub use retry::{RetryPolicy, with_retry};

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::{Error, Result};

/// Combined failsafe wrapper: rate limiter, circuit breaker, and retry
/// policy for one logical backend (e.g. the token issuer, or an external
/// resource the core calls out to).
#[derive(Clone)]
pub struct Failsafe {
    /// Circuit breaker.
    pub circuit_breaker: Arc<CircuitBreaker>,
    /// Rate limiter.
    pub rate_limiter: Arc<RateLimiter>,
    /// Retry policy for transient errors.
    pub retry_policy: RetryPolicy,
}

impl Failsafe {
    /// Build a failsafe bundle from the root configuration, using the
    /// sliding-window rate-limiting algorithm by default.
    #[must_use]
    pub fn new(name: &str, config: &Config) -> Self {
        Self {
            circuit_breaker: Arc::new(CircuitBreaker::new(name, &config.circuit_breaker)),
            rate_limiter: Arc::new(RateLimiter::sliding_window(&config.rate_limit)),
            retry_policy: RetryPolicy::new(&config.retry),
        }
    }

    /// Build a failsafe bundle using the token-bucket rate-limiting
    /// algorithm instead of the sliding-window default.
    #[must_use]
    pub fn with_token_bucket(name: &str, config: &Config) -> Self {
        Self {
            circuit_breaker: Arc::new(CircuitBreaker::new(name, &config.circuit_breaker)),
            rate_limiter: Arc::new(RateLimiter::token_bucket(&config.rate_limit)),
            retry_policy: RetryPolicy::new(&config.retry),
        }
    }

    /// Whether a call for `id` may proceed right now: checks the circuit
    /// first (no point consuming quota on a call that will be rejected
    /// anyway), then the rate limiter.
    ///
    /// # Errors
    /// Returns [`Error::CircuitOpen`] or [`Error::RateLimitExceeded`].
    pub fn check(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        if !self.circuit_breaker.can_proceed() {
            return Err(Error::CircuitOpen);
        }
        self.rate_limiter.allow(id, now)
    }

    /// Record a success against the circuit breaker.
    pub fn record_success(&self) {
        self.circuit_breaker.record_success();
    }

    /// Record a failure against the circuit breaker.
    pub fn record_failure(&self) {
        self.circuit_breaker.record_failure();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_denies_once_rate_limit_is_exhausted() {
        let mut config = Config::default();
        config.rate_limit.rate = 1;
        config.rate_limit.window = std::time::Duration::from_secs(60);
        let fs = Failsafe::new("test-backend", &config);
        let now = Utc::now();
        assert!(fs.check("client-a", now).is_ok());
        assert_eq!(fs.check("client-a", now), Err(Error::RateLimitExceeded));
    }

    #[test]
    fn check_fails_fast_once_circuit_is_open() {
        let mut config = Config::default();
        config.circuit_breaker.failure_threshold = 1;
        let fs = Failsafe::new("test-backend", &config);
        fs.record_failure();
        assert_eq!(fs.check("client-a", Utc::now()), Err(Error::CircuitOpen));
    }
}
