//! Rate limiting (spec §4.4): a pluggable algorithm interface over a
//! pluggable storage interface, with sliding-window and token-bucket
//! implementations. Per-id state lives behind a `DashMap`, mirroring the
//! sharded-lock pattern the store layer uses elsewhere in this crate — each
//! id's mutation happens under that shard's lock, giving the per-id
//! isolation spec §4.4/§5 require without a global mutex.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::{Error, Result};

/// Storage abstraction for the sliding-window algorithm (spec §4.4 "Store
/// interface"). Kept separate from the algorithm so alternate backends can
/// be substituted without touching the algorithm.
pub trait RateLimiterStore: Send + Sync {
    /// Record an event at `time` for `id`.
    fn add(&self, id: &str, time: DateTime<Utc>);
    /// Return all recorded event times for `id` at or after `start`.
    fn get_window(&self, id: &str, start: DateTime<Utc>) -> Vec<DateTime<Utc>>;
    /// Clear all state for `id`.
    fn reset(&self, id: &str);
    /// Remove `id` entirely (distinct from `reset`: drops the entry, not
    /// just its contents).
    fn remove(&self, id: &str);
    /// Drop every id whose most recent activity is older than `threshold`.
    fn cleanup(&self, threshold: DateTime<Utc>);
}

/// In-memory sliding-window store: an ordered deque of event timestamps per id.
#[derive(Default)]
pub struct InMemorySlidingStore {
    windows: DashMap<String, VecDeque<DateTime<Utc>>>,
}

impl InMemorySlidingStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimiterStore for InMemorySlidingStore {
    fn add(&self, id: &str, time: DateTime<Utc>) {
        self.windows.entry(id.to_string()).or_default().push_back(time);
    }

    fn get_window(&self, id: &str, start: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        self.windows
            .get(id)
            .map(|w| w.iter().filter(|&&t| t >= start).copied().collect())
            .unwrap_or_default()
    }

    fn reset(&self, id: &str) {
        if let Some(mut w) = self.windows.get_mut(id) {
            w.clear();
        }
    }

    fn remove(&self, id: &str) {
        self.windows.remove(id);
    }

    fn cleanup(&self, threshold: DateTime<Utc>) {
        self.windows.retain(|_, w| w.back().is_some_and(|&last| last >= threshold));
    }
}

/// Sliding-window rate limiter (spec §4.4).
///
/// On a request at time `t`: entries older than `t - window` are dropped;
/// if the remaining count is `>= rate`, the request is denied; otherwise
/// `t` is appended and the request is allowed. `rate == 0` or `window ==
/// Duration::ZERO` always denies.
pub struct SlidingWindowLimiter<S: RateLimiterStore = InMemorySlidingStore> {
    store: S,
    rate: u64,
    window: chrono::Duration,
    inactivity_threshold: Duration,
}

impl SlidingWindowLimiter<InMemorySlidingStore> {
    /// Build a sliding-window limiter with the default in-memory store.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_store(config, InMemorySlidingStore::new())
    }
}

impl<S: RateLimiterStore> SlidingWindowLimiter<S> {
    /// Build a sliding-window limiter over a caller-supplied store.
    #[must_use]
    pub fn with_store(config: &RateLimitConfig, store: S) -> Self {
        Self {
            store,
            rate: config.rate,
            window: chrono::Duration::from_std(config.window).unwrap_or(chrono::Duration::seconds(60)),
            inactivity_threshold: config.inactivity_threshold,
        }
    }

    /// Evaluate and, if allowed, record a request for `id` at `now`.
    ///
    /// # Errors
    /// Returns [`Error::RateLimitExceeded`] if the window is already full.
    pub fn allow(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        if self.rate == 0 || self.window.is_zero() {
            return Err(Error::RateLimitExceeded);
        }
        let start = now - self.window;
        let count = self.store.get_window(id, start).len() as u64;
        if count >= self.rate {
            return Err(Error::RateLimitExceeded);
        }
        self.store.add(id, now);
        Ok(())
    }

    /// Remaining quota for `id` as of `now`.
    #[must_use]
    pub fn remaining_quota(&self, id: &str, now: DateTime<Utc>) -> u64 {
        if self.rate == 0 || self.window.is_zero() {
            return 0;
        }
        let start = now - self.window;
        let count = self.store.get_window(id, start).len() as u64;
        self.rate.saturating_sub(count)
    }

    /// Clear all recorded state for `id`.
    pub fn reset(&self, id: &str) {
        self.store.reset(id);
    }

    /// Background maintenance: drop ids idle longer than
    /// `inactivity_threshold`.
    pub fn cleanup(&self, now: DateTime<Utc>) {
        let threshold = chrono::Duration::from_std(self.inactivity_threshold)
            .ok()
            .and_then(|d| now.checked_sub_signed(d))
            .unwrap_or(now);
        self.store.cleanup(threshold);
    }
}

#[derive(Clone, Copy)]
struct BucketState {
    tokens: f64,
    last_refill: DateTime<Utc>,
}

/// Token-bucket rate limiter (spec §4.4).
///
/// State per id is `{tokens, last_refill}`. On a request at time `t`:
/// `refill = floor((t - last_refill) * rate)`; `tokens = min(burst, tokens +
/// refill)`; if `tokens >= 1`, consume one and allow; otherwise deny. Burst
/// caps steady-state quota even as the rate would otherwise accumulate it
/// unboundedly.
pub struct TokenBucketLimiter {
    buckets: DashMap<String, BucketState>,
    rate_per_sec: f64,
    burst: f64,
    inactivity_threshold: Duration,
}

impl TokenBucketLimiter {
    /// Build a token-bucket limiter. `config.rate` is interpreted as tokens
    /// per second; `config.burst` is the bucket capacity.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            rate_per_sec: config.rate as f64,
            burst: config.burst as f64,
            inactivity_threshold: config.inactivity_threshold,
        }
    }

    /// Evaluate and, if allowed, consume one token for `id` at `now`.
    ///
    /// # Errors
    /// Returns [`Error::RateLimitExceeded`] if no tokens remain.
    pub fn allow(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        if self.rate_per_sec <= 0.0 || self.burst <= 0.0 {
            return Err(Error::RateLimitExceeded);
        }

        let mut entry = self.buckets.entry(id.to_string()).or_insert(BucketState {
            tokens: self.burst,
            last_refill: now,
        });

        let elapsed = (now - entry.last_refill).num_milliseconds().max(0) as f64 / 1000.0;
        let refill = (elapsed * self.rate_per_sec).floor();
        entry.tokens = (entry.tokens + refill).min(self.burst);
        entry.last_refill = now;

        if entry.tokens >= 1.0 {
            entry.tokens -= 1.0;
            Ok(())
        } else {
            Err(Error::RateLimitExceeded)
        }
    }

    /// Remaining whole tokens for `id` without consuming any, as of `now`.
    #[must_use]
    pub fn remaining_quota(&self, id: &str, now: DateTime<Utc>) -> u64 {
        match self.buckets.get(id) {
            None => self.burst as u64,
            Some(entry) => {
                let elapsed = (now - entry.last_refill).num_milliseconds().max(0) as f64 / 1000.0;
                let refill = (elapsed * self.rate_per_sec).floor();
                ((entry.tokens + refill).min(self.burst)) as u64
            }
        }
    }

    /// Reset `id` back to a full bucket.
    pub fn reset(&self, id: &str) {
        self.buckets.remove(id);
    }

    /// Background maintenance: drop ids idle longer than
    /// `inactivity_threshold`.
    pub fn cleanup(&self, now: DateTime<Utc>) {
        let threshold = chrono::Duration::from_std(self.inactivity_threshold).unwrap_or(chrono::Duration::hours(1));
        self.buckets.retain(|_, b| now - b.last_refill < threshold);
    }
}

/// Either rate-limiting algorithm, selected by configuration (spec §4.4
/// "Pluggable algorithm interface").
pub enum RateLimiter {
    /// Sliding-window algorithm.
    SlidingWindow(SlidingWindowLimiter<InMemorySlidingStore>),
    /// Token-bucket algorithm.
    TokenBucket(TokenBucketLimiter),
}

impl RateLimiter {
    /// Build a sliding-window limiter.
    #[must_use]
    pub fn sliding_window(config: &RateLimitConfig) -> Self {
        Self::SlidingWindow(SlidingWindowLimiter::new(config))
    }

    /// Build a token-bucket limiter.
    #[must_use]
    pub fn token_bucket(config: &RateLimitConfig) -> Self {
        Self::TokenBucket(TokenBucketLimiter::new(config))
    }

    /// `Allow(ctx, id)` (spec §4.4): consume one unit of quota for `id`.
    ///
    /// # Errors
    /// Returns [`Error::RateLimitExceeded`] if the quota is exhausted.
    pub fn allow(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        match self {
            Self::SlidingWindow(l) => l.allow(id, now),
            Self::TokenBucket(l) => l.allow(id, now),
        }
    }

    /// Remaining quota for `id`.
    #[must_use]
    pub fn remaining_quota(&self, id: &str, now: DateTime<Utc>) -> u64 {
        match self {
            Self::SlidingWindow(l) => l.remaining_quota(id, now),
            Self::TokenBucket(l) => l.remaining_quota(id, now),
        }
    }

    /// Reset `id`'s quota.
    pub fn reset(&self, id: &str) {
        match self {
            Self::SlidingWindow(l) => l.reset(id),
            Self::TokenBucket(l) => l.reset(id),
        }
    }

    /// Background cleanup of inactive ids.
    pub fn cleanup(&self, now: DateTime<Utc>) {
        match self {
            Self::SlidingWindow(l) => l.cleanup(now),
            Self::TokenBucket(l) => l.cleanup(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rate: u64, window_secs: u64, burst: u64) -> RateLimitConfig {
        RateLimitConfig {
            rate,
            window: Duration::from_secs(window_secs),
            burst,
            inactivity_threshold: Duration::from_secs(3600),
        }
    }

    // ── Sliding window ──────────────────────────────────────────────────

    #[test]
    fn sliding_window_allows_up_to_rate_then_denies() {
        let limiter = SlidingWindowLimiter::new(&config(5, 1, 0));
        let t0 = Utc::now();
        for _ in 0..5 {
            assert!(limiter.allow("client-x", t0).is_ok());
        }
        assert_eq!(limiter.allow("client-x", t0), Err(Error::RateLimitExceeded));
        assert_eq!(limiter.remaining_quota("client-x", t0), 0);
    }

    #[test]
    fn sliding_window_recovers_after_window_elapses() {
        let limiter = SlidingWindowLimiter::new(&config(5, 1, 0));
        let t0 = Utc::now();
        for _ in 0..5 {
            limiter.allow("client-x", t0).unwrap();
        }
        let t1 = t0 + chrono::Duration::milliseconds(1100);
        assert_eq!(limiter.remaining_quota("client-x", t1), 5);
        assert!(limiter.allow("client-x", t1).is_ok());
    }

    #[test]
    fn sliding_window_isolates_ids() {
        let limiter = SlidingWindowLimiter::new(&config(1, 1, 0));
        let t0 = Utc::now();
        assert!(limiter.allow("a", t0).is_ok());
        assert_eq!(limiter.allow("a", t0), Err(Error::RateLimitExceeded));
        assert!(limiter.allow("b", t0).is_ok(), "id b must not be affected by id a's quota");
    }

    #[test]
    fn sliding_window_zero_rate_always_denies() {
        let limiter = SlidingWindowLimiter::new(&config(0, 1, 0));
        assert_eq!(limiter.allow("x", Utc::now()), Err(Error::RateLimitExceeded));
    }

    // ── Token bucket ────────────────────────────────────────────────────

    #[test]
    fn token_bucket_allows_burst_then_denies() {
        let limiter = TokenBucketLimiter::new(&config(1, 0, 3));
        let t0 = Utc::now();
        assert!(limiter.allow("x", t0).is_ok());
        assert!(limiter.allow("x", t0).is_ok());
        assert!(limiter.allow("x", t0).is_ok());
        assert_eq!(limiter.allow("x", t0), Err(Error::RateLimitExceeded));
    }

    #[test]
    fn token_bucket_refills_over_time() {
        let limiter = TokenBucketLimiter::new(&config(1, 0, 1));
        let t0 = Utc::now();
        assert!(limiter.allow("x", t0).is_ok());
        assert_eq!(limiter.allow("x", t0), Err(Error::RateLimitExceeded));
        let t1 = t0 + chrono::Duration::seconds(2);
        assert!(limiter.allow("x", t1).is_ok());
    }

    #[test]
    fn token_bucket_never_exceeds_burst_at_steady_state() {
        let limiter = TokenBucketLimiter::new(&config(10, 0, 2));
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(100);
        assert_eq!(limiter.remaining_quota("x", t1), 2);
    }

    #[test]
    fn token_bucket_isolates_ids() {
        let limiter = TokenBucketLimiter::new(&config(1, 0, 1));
        let t0 = Utc::now();
        limiter.allow("a", t0).unwrap();
        assert_eq!(limiter.allow("a", t0), Err(Error::RateLimitExceeded));
        assert!(limiter.allow("b", t0).is_ok());
    }
}
