//! Propagating request context: deadline + cooperative cancellation.
//!
//! Every long-running operation in the core (issuance, validation, store
//! calls) accepts a [`Ctx`] and must return promptly with
//! [`Error::Cancelled`](crate::Error::Cancelled) once it fires, per spec §5.
//! A `watch<bool>` channel plays the same role here that a broadcast
//! shutdown receiver plays for this crate's background tasks (see
//! [`crate::store::spawn_reaper`]), generalized to a single in-flight
//! request tree with a per-request deadline.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::{Error, Result};

/// A cancellable, deadline-bounded request context.
#[derive(Clone)]
pub struct Ctx {
    deadline: Option<Instant>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl Ctx {
    /// A context with no deadline and no cancellation — use only at the
    /// outermost call site (tests, or a caller that manages its own timeout).
    #[must_use]
    pub fn background() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            deadline: None,
            cancel_tx: tx,
            cancel_rx: rx,
        }
    }

    /// A context that expires after `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        let mut ctx = Self::background();
        ctx.deadline = Some(Instant::now() + timeout);
        ctx
    }

    /// Derive a child context whose deadline is `min(self.deadline, timeout
    /// from now)` — "all timeouts are bounded above by the ctx deadline" (§5).
    /// Cancelling the parent cancels every child sharing its signal.
    #[must_use]
    pub fn bounded(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(d) if d < candidate => Some(d),
            _ => Some(candidate),
        };
        Self {
            deadline,
            cancel_tx: self.cancel_tx.clone(),
            cancel_rx: self.cancel_rx.clone(),
        }
    }

    /// Trigger cancellation for this context and every context derived from it.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Remaining time until the deadline, or `None` if unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Race `fut` against cancellation and the deadline.
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`] if cancelled first,
    /// [`Error::Timeout`] if the deadline elapses first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = T>,
    {
        let mut cancel_rx = self.cancel_rx.clone();
        let wait_cancelled = async {
            if *cancel_rx.borrow() {
                return;
            }
            let _ = cancel_rx.changed().await;
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = wait_cancelled => Err(Error::Cancelled),
                    () = tokio::time::sleep_until(deadline) => Err(Error::Timeout),
                    v = fut => Ok(v),
                }
            }
            None => {
                tokio::select! {
                    () = wait_cancelled => Err(Error::Cancelled),
                    v = fut => Ok(v),
                }
            }
        }
    }

    /// `true` once this context (or an ancestor) has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn background_context_never_times_out() {
        let ctx = Ctx::background();
        let out = ctx.run(async { 42 }).await.unwrap();
        assert_eq!(out, 42);
    }

    #[tokio::test]
    async fn timeout_fires_before_slow_future_completes() {
        let ctx = Ctx::with_timeout(Duration::from_millis(10));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                1
            })
            .await;
        assert_eq!(result, Err(Error::Timeout));
    }

    #[tokio::test]
    async fn explicit_cancel_short_circuits_run() {
        let ctx = Ctx::with_timeout(Duration::from_secs(5));
        ctx.cancel();
        let result = ctx.run(async { 1 }).await;
        assert_eq!(result, Err(Error::Cancelled));
    }

    #[tokio::test]
    async fn bounded_never_exceeds_parent_deadline() {
        let parent = Ctx::with_timeout(Duration::from_millis(10));
        let child = parent.bounded(Duration::from_secs(10));
        let result = child
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                1
            })
            .await;
        assert_eq!(result, Err(Error::Timeout));
    }

    #[tokio::test]
    async fn cancelling_parent_cancels_child() {
        let parent = Ctx::background();
        let child = parent.bounded(Duration::from_secs(5));
        parent.cancel();
        assert!(child.is_cancelled());
    }
}
