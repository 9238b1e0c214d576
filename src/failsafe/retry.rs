//! Retry with backoff for transient storage errors (spec §7 propagation
//! policy). Built on `backon`'s `Retryable` combinator rather than
//! hand-rolled backoff bookkeeping.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::debug;

use crate::Error;
use crate::config::RetryConfig;

/// Retry policy built from [`RetryConfig`].
#[derive(Clone)]
pub struct RetryPolicy {
    enabled: bool,
    builder: ExponentialBuilder,
}

impl RetryPolicy {
    /// Build a policy from configuration.
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        let retries = config.max_attempts.saturating_sub(1);
        let builder = ExponentialBuilder::default()
            .with_min_delay(config.initial_backoff)
            .with_max_delay(config.max_backoff)
            .with_factor(config.multiplier as f32)
            .with_max_times(retries as usize)
            .without_jitter();
        Self {
            enabled: config.enabled,
            builder,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

/// Run `f`, retrying on [`is_retryable`] errors per `policy`, then returning
/// the last error unwrapped — **not** wrapping it as [`Error::StoreUnavailable`];
/// callers that want that translation (e.g. the token store) apply it
/// themselves once retries are exhausted, since only they know the operation
/// was a storage call.
///
/// # Errors
/// Returns the last error from `f` once attempts are exhausted, or
/// immediately if the error is not retryable.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, name: &str, f: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    if !policy.enabled {
        return f_once(f).await;
    }

    let name = name.to_string();
    f.retry(policy.builder)
        .when(is_retryable)
        .notify(move |err: &Error, dur: Duration| {
            debug!(operation = %name, delay_ms = dur.as_millis(), error = %err, "retrying after backoff");
        })
        .await
}

async fn f_once<F, Fut, T>(mut f: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    f().await
}

/// Whether `error` represents a transient condition worth retrying (spec §7:
/// only transient storage errors, never validation failures).
fn is_retryable(error: &Error) -> bool {
    matches!(error, Error::StoreUnavailable(_) | Error::Timeout)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn retries_transient_storage_error_once_then_succeeds() {
        let policy = RetryPolicy::new(&RetryConfig {
            enabled: true,
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 2.0,
        });
        let calls = AtomicU32::new(0);
        let result = with_retry(&policy, "test-op", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(Error::StoreUnavailable("down".into()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(&RetryConfig {
            enabled: true,
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 2.0,
        });
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = with_retry(&policy, "test-op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::StoreUnavailable("down".into()))
        })
        .await;
        assert_eq!(result, Err(Error::StoreUnavailable("down".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_error_is_returned_immediately() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = with_retry(&policy, "test-op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::InvalidScope("bad".into()))
        })
        .await;
        assert_eq!(result, Err(Error::InvalidScope("bad".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_policy_calls_exactly_once() {
        let policy = RetryPolicy::new(&RetryConfig {
            enabled: false,
            ..RetryConfig::default()
        });
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = with_retry(&policy, "test-op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::StoreUnavailable("down".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
