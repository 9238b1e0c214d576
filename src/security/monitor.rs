//! Security monitor (spec §4.7): per-event-type threshold counters that
//! dispatch an [`Alert`] to every registered handler once a threshold is
//! reached. Dispatch is concurrent and fire-and-forget — a handler failure
//! is logged but never propagates back to the recording call (spec §4.7,
//! §5 "Invokes alert handlers ... does not block the recording path"):
//! broadcast to every sink, swallow individual send failures.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::config::MonitorConfig;

/// The event types the monitor tracks (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEvent {
    /// A token or credential failed validation.
    AuthFailures,
    /// A request pattern flagged as suspicious by a caller-defined heuristic.
    SuspiciousRequests,
    /// A rate limiter denied a request.
    RateLimitViolations,
    /// A scope-escalation attempt was blocked. Alerts immediately (threshold 1).
    PrivilegeEscalation,
    /// An audit entry failed integrity verification. Alerts immediately (threshold 1).
    AuditTamperAttempts,
}

impl SecurityEvent {
    fn threshold(self, config: &MonitorConfig) -> u64 {
        match self {
            Self::AuthFailures => config.auth_failures_threshold,
            Self::SuspiciousRequests => config.suspicious_requests_threshold,
            Self::RateLimitViolations => config.rate_limit_violations_threshold,
            Self::PrivilegeEscalation => config.privilege_escalation_threshold,
            Self::AuditTamperAttempts => config.audit_tamper_attempts_threshold,
        }
    }

    /// `critical` for the two immediate-alert event types, `warning` otherwise.
    #[must_use]
    pub fn severity(self) -> AlertSeverity {
        match self {
            Self::PrivilegeEscalation | Self::AuditTamperAttempts => AlertSeverity::Critical,
            _ => AlertSeverity::Warning,
        }
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational; no immediate operator action implied.
    Info,
    /// Threshold crossed; worth operator attention.
    Warning,
    /// Tamper evidence or privilege escalation; dispatched immediately.
    Critical,
}

/// A dispatched security alert (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// The event type that triggered this alert.
    pub event_type: SecurityEvent,
    /// Alert severity.
    pub severity: AlertSeverity,
    /// Human-readable summary.
    pub message: String,
    /// The client/principal this alert concerns, if known.
    pub client_id: Option<String>,
    /// Source IP, if known.
    pub source_ip: Option<String>,
    /// When the alert was raised.
    pub timestamp: DateTime<Utc>,
    /// Free-form key-value context.
    pub metadata: HashMap<String, String>,
}

/// A sink that an [`Alert`] is dispatched to. Implementations must be
/// `Send + Sync` since dispatch fans out concurrently across every
/// registered handler.
#[async_trait::async_trait]
pub trait AlertHandler: Send + Sync {
    /// Handle one alert. Errors are logged by the monitor and never
    /// propagate to the recording call.
    async fn handle(&self, alert: &Alert) -> Result<(), String>;
}

/// A handler that drops every alert. The monitor's own default when no
/// sink has been registered (spec §9 "inject a metrics/handler interface;
/// a no-op implementation is acceptable for tests").
pub struct NoopHandler;

#[async_trait::async_trait]
impl AlertHandler for NoopHandler {
    async fn handle(&self, _alert: &Alert) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Default)]
struct Counter {
    count: AtomicU64,
}

/// Threshold-based security monitor. One instance is shared across the
/// core; every subsystem that observes a security-relevant event calls the
/// matching `record_*` method.
pub struct SecurityMonitor {
    config: MonitorConfig,
    counters: RwLock<HashMap<(SecurityEvent, String), Arc<Counter>>>,
    handlers: RwLock<Vec<Arc<dyn AlertHandler>>>,
}

impl SecurityMonitor {
    /// Build a monitor from configuration, with no handlers registered.
    #[must_use]
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            counters: RwLock::new(HashMap::new()),
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an additional alert sink. Handlers are invoked in
    /// registration order, but concurrently with each other.
    pub fn register_handler(&self, handler: Arc<dyn AlertHandler>) {
        self.handlers.write().push(handler);
    }

    /// Record one occurrence of `event` for `client_id`, dispatching an
    /// alert once the configured threshold is reached. Privilege-escalation
    /// and audit-tamper events always alert immediately (threshold 1) per
    /// spec §4.7 and are never gated by accumulated count.
    pub async fn record(
        &self,
        event: SecurityEvent,
        client_id: impl Into<String>,
        source_ip: Option<String>,
        message: impl Into<String>,
    ) {
        let client_id = client_id.into();
        let threshold = event.threshold(&self.config);

        let counter = {
            let mut counters = self.counters.write();
            Arc::clone(
                counters
                    .entry((event, client_id.clone()))
                    .or_insert_with(|| Arc::new(Counter::default())),
            )
        };
        let count = counter.count.fetch_add(1, Ordering::Relaxed) + 1;

        if count >= threshold {
            let alert = Alert {
                event_type: event,
                severity: event.severity(),
                message: message.into(),
                client_id: Some(client_id),
                source_ip,
                timestamp: Utc::now(),
                metadata: HashMap::new(),
            };
            self.dispatch(alert).await;
        }
    }

    /// Dispatch `alert` to every registered handler concurrently. A
    /// handler that errors, panics, or exceeds the configured dispatch
    /// timeout is logged and otherwise ignored (spec §5 "fire-and-forget;
    /// does not block the recording path").
    async fn dispatch(&self, alert: Alert) {
        let handlers: Vec<_> = self.handlers.read().clone();
        let deadline = self.config.handler_dispatch_timeout;

        let alert = Arc::new(alert);
        let calls = handlers.into_iter().map(|handler| {
            let alert = Arc::clone(&alert);
            async move {
                match timeout(deadline, handler.handle(&alert)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "security alert handler failed"),
                    Err(_) => tracing::warn!("security alert handler exceeded dispatch deadline"),
                }
            }
        });
        futures_join_all(calls).await;
    }

    /// Reset the counter for `(event, client_id)`, e.g. after an
    /// operator-initiated unblock.
    pub fn reset(&self, event: SecurityEvent, client_id: &str) {
        if let Some(counter) = self.counters.read().get(&(event, client_id.to_string())) {
            counter.count.store(0, Ordering::Relaxed);
        }
    }

    /// Current count for `(event, client_id)`, 0 if never recorded.
    #[must_use]
    pub fn count_for(&self, event: SecurityEvent, client_id: &str) -> u64 {
        self.counters
            .read()
            .get(&(event, client_id.to_string()))
            .map_or(0, |c| c.count.load(Ordering::Relaxed))
    }
}

/// Small local stand-in for `futures::future::join_all` — this crate does
/// not otherwise need the `futures` dependency, so a minimal fan-in over
/// an iterator of same-typed futures is enough here.
async fn futures_join_all<I, F>(iter: I)
where
    I: IntoIterator<Item = F>,
    F: std::future::Future<Output = ()>,
{
    let mut set = tokio::task::JoinSet::new();
    for fut in iter {
        set.spawn(fut);
    }
    while set.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use super::*;

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl AlertHandler for CountingHandler {
        async fn handle(&self, _alert: &Alert) -> Result<(), String> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn alert_fires_once_threshold_is_reached() {
        let mut config = MonitorConfig::default();
        config.auth_failures_threshold = 3;
        let monitor = SecurityMonitor::new(config);
        let calls = Arc::new(AtomicUsize::new(0));
        monitor.register_handler(Arc::new(CountingHandler { calls: Arc::clone(&calls) }));

        for _ in 0..2 {
            monitor.record(SecurityEvent::AuthFailures, "client-a", None, "bad signature").await;
        }
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 0, "threshold not yet reached");

        monitor.record(SecurityEvent::AuthFailures, "client-a", None, "bad signature").await;
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn privilege_escalation_alerts_immediately() {
        let monitor = SecurityMonitor::new(MonitorConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        monitor.register_handler(Arc::new(CountingHandler { calls: Arc::clone(&calls) }));

        monitor
            .record(SecurityEvent::PrivilegeEscalation, "client-b", None, "scope escalation blocked")
            .await;
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn counters_are_isolated_per_client() {
        let mut config = MonitorConfig::default();
        config.auth_failures_threshold = 1;
        let monitor = SecurityMonitor::new(config);
        let calls = Arc::new(AtomicUsize::new(0));
        monitor.register_handler(Arc::new(CountingHandler { calls: Arc::clone(&calls) }));

        monitor.record(SecurityEvent::AuthFailures, "client-a", None, "x").await;
        assert_eq!(monitor.count_for(SecurityEvent::AuthFailures, "client-b"), 0);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_failing_handler_does_not_prevent_others_from_running() {
        struct FailingHandler;
        #[async_trait::async_trait]
        impl AlertHandler for FailingHandler {
            async fn handle(&self, _alert: &Alert) -> Result<(), String> {
                Err("sink unavailable".into())
            }
        }

        let mut config = MonitorConfig::default();
        config.auth_failures_threshold = 1;
        let monitor = SecurityMonitor::new(config);
        let calls = Arc::new(AtomicUsize::new(0));
        monitor.register_handler(Arc::new(FailingHandler));
        monitor.register_handler(Arc::new(CountingHandler { calls: Arc::clone(&calls) }));

        monitor.record(SecurityEvent::AuthFailures, "client-a", None, "x").await;
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }
}
