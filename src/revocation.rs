//! Durable revocation registry (spec §6 RevocationRegistry contract,
//! §9 "in-memory revocation list ... explicitly rejected").
//!
//! [`PersistentRevocationLog`] is the backend this crate ships: a
//! log-structured append-only file (one JSON record per line) fronted by an
//! in-memory [`DashMap`] cache, per `SPEC_FULL.md`'s resolution of the §9
//! open question — "the in-memory path is only a cache fronting a
//! persistent registry." On construction the log is replayed to rebuild the
//! cache, so revocations survive a process restart (spec P2). A SQL-backed
//! implementation of the same trait is an equally valid choice; this crate
//! has no SQL dependency in its stack, so it ships the log-structured one.
//!
//! Follows the same read/parse/wrap-failures-as-[`Error::Config`] shape used
//! elsewhere in this crate for loading file-backed material, fronted by a
//! `DashMap` cache the way other per-key state in this crate is cached.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::{Error, Result};

/// One durable revocation record (spec §3 `RevocationStatus`, persisted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationRecord {
    /// Token id (JTI) that was revoked.
    pub id: String,
    /// When the revocation was recorded.
    pub revoked_at: DateTime<Utc>,
    /// Caller-supplied reason.
    pub reason: String,
    /// Identifier of the actor that requested revocation.
    pub revoked_by: String,
}

/// Durable index of revoked token ids, separate from the [`crate::store::Store`]
/// (spec §3 Ownership & lifecycle: "Revocation adds to RevocationRegistry
/// and may update the stored token's RevocationStatus" — two distinct
/// writes). MUST be durable across process restarts (spec §6).
#[async_trait::async_trait]
pub trait RevocationRegistry: Send + Sync + 'static {
    /// Whether `id` has been revoked.
    async fn is_revoked(&self, id: &str) -> bool;

    /// Record a revocation. Idempotent: revoking an already-revoked id is
    /// not an error and does not overwrite the original record (first
    /// revocation wins, so the original `revoked_at`/`reason` are preserved).
    ///
    /// # Errors
    /// Returns [`Error::StoreUnavailable`] if the durable write fails.
    async fn revoke(&self, id: &str, at: DateTime<Utc>, reason: &str, by: &str) -> Result<()>;

    /// Drop records older than `before` — a retention/GC hook, not a
    /// correctness requirement (a revoked token's own `expires_at` has
    /// already passed by the time its record becomes eligible for sweep).
    async fn sweep(&self, before: DateTime<Utc>);
}

/// The persistent, log-structured implementation this crate ships.
pub struct PersistentRevocationLog {
    path: PathBuf,
    cache: DashMap<String, RevocationRecord>,
    writer: Mutex<()>,
}

impl PersistentRevocationLog {
    /// Open (creating if absent) the log file at `path` and replay it to
    /// rebuild the in-memory cache.
    ///
    /// # Errors
    /// Returns [`Error::StoreUnavailable`] if the file cannot be opened or
    /// contains a line that fails to parse as a [`RevocationRecord`].
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let cache = DashMap::new();

        if path.exists() {
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
            let mut lines = BufReader::new(file).lines();
            while let Some(line) = lines
                .next_line()
                .await
                .map_err(|e| Error::StoreUnavailable(e.to_string()))?
            {
                if line.trim().is_empty() {
                    continue;
                }
                let record: RevocationRecord =
                    serde_json::from_str(&line).map_err(|e| Error::StoreUnavailable(e.to_string()))?;
                cache.entry(record.id.clone()).or_insert(record);
            }
        } else if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        }

        Ok(Self { path, cache, writer: Mutex::new(()) })
    }

    /// Number of records currently cached (for observability/tests).
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the cache holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[async_trait::async_trait]
impl RevocationRegistry for PersistentRevocationLog {
    async fn is_revoked(&self, id: &str) -> bool {
        self.cache.contains_key(id)
    }

    async fn revoke(&self, id: &str, at: DateTime<Utc>, reason: &str, by: &str) -> Result<()> {
        if self.cache.contains_key(id) {
            return Ok(());
        }

        let record = RevocationRecord {
            id: id.to_string(),
            revoked_at: at,
            reason: reason.to_string(),
            revoked_by: by.to_string(),
        };
        let line = serde_json::to_string(&record).map_err(|e| Error::StoreUnavailable(e.to_string()))?;

        // Single authoritative writer per id (spec §5): the mutex here
        // serializes appends from concurrent revokers in this process.
        let _guard = self.writer.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        file.write_all(b"\n").await.map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        file.flush().await.map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        drop(_guard);

        self.cache.insert(id.to_string(), record);
        Ok(())
    }

    async fn sweep(&self, before: DateTime<Utc>) {
        self.cache.retain(|_, record| record.revoked_at >= before);
    }
}

/// Non-durable cache-only registry. Exists for unit tests that don't want
/// filesystem side effects; never use it where spec P2 (durability across
/// restart) matters.
#[derive(Default)]
pub struct InMemoryRevocationRegistry {
    records: DashMap<String, RevocationRecord>,
}

impl InMemoryRevocationRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot all records, e.g. to seed a [`PersistentRevocationLog`] in
    /// a migration path.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, RevocationRecord> {
        self.records.iter().map(|e| (e.key().clone(), e.value().clone())).collect()
    }
}

#[async_trait::async_trait]
impl RevocationRegistry for InMemoryRevocationRegistry {
    async fn is_revoked(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    async fn revoke(&self, id: &str, at: DateTime<Utc>, reason: &str, by: &str) -> Result<()> {
        self.records.entry(id.to_string()).or_insert(RevocationRecord {
            id: id.to_string(),
            revoked_at: at,
            reason: reason.to_string(),
            revoked_by: by.to_string(),
        });
        Ok(())
    }

    async fn sweep(&self, before: DateTime<Utc>) {
        self.records.retain(|_, record| record.revoked_at >= before);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn revoke_then_is_revoked_round_trips() {
        let dir = tempfile_dir();
        let log = PersistentRevocationLog::open(dir.join("revocations.log")).await.unwrap();
        assert!(!log.is_revoked("jti-1").await);
        log.revoke("jti-1", Utc::now(), "compromised", "admin").await.unwrap();
        assert!(log.is_revoked("jti-1").await);
    }

    #[tokio::test]
    async fn revocation_survives_a_fresh_open_of_the_same_file() {
        let dir = tempfile_dir();
        let path = dir.join("revocations.log");

        {
            let log = PersistentRevocationLog::open(&path).await.unwrap();
            log.revoke("jti-1", Utc::now(), "compromised", "admin").await.unwrap();
        }

        // Simulated restart: a fresh instance replays the log file.
        let reopened = PersistentRevocationLog::open(&path).await.unwrap();
        assert!(reopened.is_revoked("jti-1").await);
        assert_eq!(reopened.len(), 1);
    }

    #[tokio::test]
    async fn revoking_twice_keeps_the_first_record() {
        let dir = tempfile_dir();
        let log = PersistentRevocationLog::open(dir.join("revocations.log")).await.unwrap();
        let first = Utc::now();
        log.revoke("jti-1", first, "first reason", "admin").await.unwrap();
        log.revoke("jti-1", Utc::now(), "second reason", "someone-else").await.unwrap();

        let reopened = PersistentRevocationLog::open(dir.join("revocations.log")).await.unwrap();
        assert_eq!(reopened.len(), 1);
        let _ = first;
    }

    #[tokio::test]
    async fn sweep_drops_records_older_than_the_cutoff() {
        let registry = InMemoryRevocationRegistry::new();
        registry.revoke("old", Utc::now() - chrono::Duration::days(400), "r", "admin").await.unwrap();
        registry.revoke("new", Utc::now(), "r", "admin").await.unwrap();

        registry.sweep(Utc::now() - chrono::Duration::days(365)).await;
        assert!(!registry.is_revoked("old").await);
        assert!(registry.is_revoked("new").await);
    }

    fn tempfile_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("poa-core-test-{}", uuid::Uuid::new_v4()));
        dir
    }
}
