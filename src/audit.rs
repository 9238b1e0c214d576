//! Tamper-evident audit log (spec §4.6): every entry's `mac` covers a
//! canonical serialization of its own fields plus, when chaining is
//! enabled, the previous entry's `mac` — so removing or reordering an
//! entry breaks every MAC after it, not just its own.
//!
//! Grounded on `crypto::mac` for the HMAC-SHA256 primitive and on the
//! `AuditEvent`/`emit` shape of the key-server audit trail this module
//! supersedes, generalized from a fixed set of token lifecycle events to
//! an open `event_type: String` so any subsystem can append to the log.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::crypto::mac::{Hmac256Key, compute_mac, verify_mac};
use crate::security::{SecurityEvent, SecurityMonitor};
use crate::{Error, Result};

/// Caller-supplied fields for one audit entry. `id`, `timestamp`, `mac`,
/// and `prev_mac` are assigned by [`AuditLog::append`].
#[derive(Debug, Clone)]
pub struct AuditEntryDraft {
    /// What kind of event this is, e.g. `"token.issued"`, `"token.revoked"`.
    pub event_type: String,
    /// The principal this event concerns.
    pub subject: String,
    /// The operation performed, e.g. `"issue"`, `"revoke"`, `"validate"`.
    pub action: String,
    /// The resource acted on, e.g. a token id.
    pub resource: String,
    /// Outcome, e.g. `"success"`, `"denied"`, `"error"`.
    pub result: String,
    /// Free-form context, serialized into the entry verbatim.
    pub details: String,
}

/// A persisted, tamper-evident audit entry (spec §4.6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique id assigned at append time.
    pub id: String,
    /// Append timestamp, RFC3339 with nanosecond precision.
    pub timestamp: DateTime<Utc>,
    /// Event type.
    pub event_type: String,
    /// Subject of the event.
    pub subject: String,
    /// Action performed.
    pub action: String,
    /// Resource acted on.
    pub resource: String,
    /// Outcome.
    pub result: String,
    /// Free-form details.
    pub details: String,
    /// `HMAC(key, canonical(self) [ || prevMac ])`.
    pub mac: String,
    /// The previous entry's MAC, if chaining is enabled. `None` for the
    /// first entry in a log, or for every entry when chaining is off.
    pub prev_mac: Option<String>,
}

impl AuditEntry {
    fn canonical_message(
        id: &str,
        timestamp: DateTime<Utc>,
        event_type: &str,
        subject: &str,
        action: &str,
        resource: &str,
        result: &str,
        details_len: usize,
        prev_mac: Option<&str>,
    ) -> String {
        let ts = timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true);
        let mut message =
            format!("{id}|{event_type}|{subject}|{action}|{resource}|{result}|{ts}|{details_len}");
        if let Some(prev) = prev_mac {
            message.push('|');
            message.push_str(prev);
        }
        message
    }

    fn message(&self) -> String {
        Self::canonical_message(
            &self.id,
            self.timestamp,
            &self.event_type,
            &self.subject,
            &self.action,
            &self.resource,
            &self.result,
            self.details.len(),
            self.prev_mac.as_deref(),
        )
    }
}

/// Filter applied by [`AuditLog::query`]. `None` on a field means "don't
/// filter on this dimension".
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Match entries for this subject only.
    pub subject: Option<String>,
    /// Match entries of this event type only.
    pub event_type: Option<String>,
    /// Match entries appended at or after this time.
    pub since: Option<DateTime<Utc>>,
}

impl AuditFilter {
    fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(subject) = &self.subject
            && &entry.subject != subject
        {
            return false;
        }
        if let Some(event_type) = &self.event_type
            && &entry.event_type != event_type
        {
            return false;
        }
        if let Some(since) = self.since
            && entry.timestamp < since
        {
            return false;
        }
        true
    }
}

/// Where appended entries land. Separate from the trait object the core
/// validates against so a deployment can fan an entry out to several sinks
/// (file, syslog, a remote collector) without the log itself knowing.
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync + 'static {
    /// Persist one already-MAC'd entry. Must be append-only: a sink that
    /// allows overwriting or deleting an entry defeats the chain.
    ///
    /// # Errors
    /// Returns [`Error::StoreUnavailable`] if the write fails.
    async fn write(&self, entry: AuditEntry) -> Result<()>;

    /// Return every stored entry matching `filter`, oldest first.
    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>>;
}

/// In-process audit sink. Sufficient for tests and for embedding this
/// crate behind a caller-supplied durable sink; holds every entry in
/// memory so it is not itself durable across restarts.
#[derive(Default)]
pub struct InMemoryAuditSink {
    entries: SyncMutex<Vec<AuditEntry>>,
}

impl InMemoryAuditSink {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn write(&self, entry: AuditEntry) -> Result<()> {
        self.entries.lock().push(entry);
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        Ok(self.entries.lock().iter().filter(|e| filter.matches(e)).cloned().collect())
    }
}

/// Tamper-evident audit log. One instance is shared across the core.
pub struct AuditLog {
    key: Hmac256Key,
    chain_enabled: bool,
    sink: Arc<dyn AuditSink>,
    monitor: Option<Arc<SecurityMonitor>>,
    last_mac: Mutex<Option<String>>,
}

impl AuditLog {
    /// Build a log keyed by `key`, writing to `sink`. When `monitor` is
    /// supplied, a failed [`AuditLog::verify`] immediately records
    /// [`SecurityEvent::AuditTamperAttempts`] (spec §4.6: integrity
    /// failures always alert, never gated by threshold).
    #[must_use]
    pub fn new(
        key: Hmac256Key,
        chain_enabled: bool,
        sink: Arc<dyn AuditSink>,
        monitor: Option<Arc<SecurityMonitor>>,
    ) -> Self {
        Self { key, chain_enabled, sink, monitor, last_mac: Mutex::new(None) }
    }

    /// Append `draft` to the log, assigning its id, timestamp, and MAC.
    /// Concurrent callers are serialized on the chain tail so `prev_mac`
    /// is always the immediately preceding entry's MAC.
    ///
    /// # Errors
    /// Returns [`Error::CryptoFailure`] if the MAC cannot be computed, or
    /// whatever [`AuditSink::write`] returns on a persistence failure.
    pub async fn append(&self, draft: AuditEntryDraft) -> Result<AuditEntry> {
        let mut last_mac = self.last_mac.lock().await;

        let id = crate::crypto::random::generate_id();
        let timestamp = Utc::now();
        let prev_mac = if self.chain_enabled { last_mac.clone() } else { None };

        let message = AuditEntry::canonical_message(
            &id,
            timestamp,
            &draft.event_type,
            &draft.subject,
            &draft.action,
            &draft.resource,
            &draft.result,
            draft.details.len(),
            prev_mac.as_deref(),
        );
        let mac = compute_mac(&self.key, message.as_bytes())?;

        let entry = AuditEntry {
            id,
            timestamp,
            event_type: draft.event_type,
            subject: draft.subject,
            action: draft.action,
            resource: draft.resource,
            result: draft.result,
            details: draft.details,
            mac: mac.clone(),
            prev_mac,
        };

        self.sink.write(entry.clone()).await?;
        *last_mac = Some(mac);
        Ok(entry)
    }

    /// Recompute `entry`'s MAC and compare it, in constant time, against
    /// the stored one. A mismatch raises [`SecurityEvent::AuditTamperAttempts`]
    /// immediately, bypassing threshold gating, before returning the error.
    ///
    /// # Errors
    /// Returns [`Error::IntegrityFailure`] on mismatch.
    pub async fn verify(&self, entry: &AuditEntry) -> Result<()> {
        let message = entry.message();
        let result = verify_mac(&self.key, message.as_bytes(), &entry.mac);
        if result.is_err()
            && let Some(monitor) = &self.monitor
        {
            monitor
                .record(
                    SecurityEvent::AuditTamperAttempts,
                    entry.subject.clone(),
                    None,
                    format!("audit entry {} failed integrity verification", entry.id),
                )
                .await;
        }
        result
    }

    /// Return every entry matching `filter`, oldest first. Non-mutating.
    ///
    /// # Errors
    /// Propagates whatever [`AuditSink::query`] returns.
    pub async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        self.sink.query(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(event_type: &str, subject: &str) -> AuditEntryDraft {
        AuditEntryDraft {
            event_type: event_type.to_string(),
            subject: subject.to_string(),
            action: "issue".to_string(),
            resource: "jti-1".to_string(),
            result: "success".to_string(),
            details: String::new(),
        }
    }

    fn log() -> AuditLog {
        AuditLog::new(Hmac256Key::generate(), true, Arc::new(InMemoryAuditSink::new()), None)
    }

    #[tokio::test]
    async fn appended_entry_verifies() {
        let log = log();
        let entry = log.append(draft("token.issued", "alice")).await.unwrap();
        log.verify(&entry).await.unwrap();
    }

    #[tokio::test]
    async fn tampered_entry_fails_verification() {
        let log = log();
        let mut entry = log.append(draft("token.issued", "alice")).await.unwrap();
        entry.result = "denied".to_string();
        assert_eq!(log.verify(&entry).await, Err(Error::IntegrityFailure));
    }

    #[tokio::test]
    async fn second_entry_chains_to_the_first() {
        let log = log();
        let first = log.append(draft("token.issued", "alice")).await.unwrap();
        let second = log.append(draft("token.validated", "alice")).await.unwrap();
        assert_eq!(second.prev_mac.as_deref(), Some(first.mac.as_str()));
    }

    #[tokio::test]
    async fn chaining_disabled_leaves_prev_mac_empty() {
        let log = AuditLog::new(Hmac256Key::generate(), false, Arc::new(InMemoryAuditSink::new()), None);
        log.append(draft("token.issued", "alice")).await.unwrap();
        let second = log.append(draft("token.validated", "alice")).await.unwrap();
        assert!(second.prev_mac.is_none());
    }

    #[tokio::test]
    async fn query_filters_by_subject() {
        let log = log();
        log.append(draft("token.issued", "alice")).await.unwrap();
        log.append(draft("token.issued", "bob")).await.unwrap();

        let results = log
            .query(&AuditFilter { subject: Some("alice".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].subject, "alice");
    }

    #[tokio::test]
    async fn tamper_detection_alerts_the_security_monitor() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        use crate::security::{Alert, AlertHandler};

        struct CountingHandler(Arc<AtomicUsize>);
        #[async_trait::async_trait]
        impl AlertHandler for CountingHandler {
            async fn handle(&self, _alert: &Alert) -> Result<(), String> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let monitor = Arc::new(SecurityMonitor::new(crate::config::MonitorConfig::default()));
        monitor.register_handler(Arc::new(CountingHandler(Arc::clone(&calls))));

        let log =
            AuditLog::new(Hmac256Key::generate(), true, Arc::new(InMemoryAuditSink::new()), Some(monitor));
        let mut entry = log.append(draft("token.issued", "alice")).await.unwrap();
        entry.mac = "deadbeef".to_string();

        assert!(log.verify(&entry).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
