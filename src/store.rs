//! Token store (spec §6 Store contract): the persistence interface the core
//! requires but does not implement for production use — "the core defines
//! the Store interface only" (spec §1). [`InMemoryStore`] is the reference
//! implementation this crate ships for testability: a `DashMap` indexed
//! by the token's own id for O(1) `Get`/`Revoke`, plus a background reaper
//! that evicts expired entries.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::model::Token;
use crate::{Error, Result};

/// Filter applied by [`Store::list`]. Every field is an optional exact
/// match; `None` means "don't filter on this dimension" (spec §6).
#[derive(Debug, Clone, Default)]
pub struct StoreFilter {
    /// Match tokens whose metadata carries every one of these tags.
    pub tags: Vec<String>,
    /// Match tokens for this subject only.
    pub subject: Option<String>,
    /// Match tokens whose metadata labels contain every one of these
    /// key-value pairs.
    pub labels: Vec<(String, String)>,
}

impl StoreFilter {
    fn matches(&self, token: &Token) -> bool {
        if let Some(subject) = &self.subject
            && &token.subject != subject
        {
            return false;
        }
        if !self.tags.iter().all(|t| token.metadata.tags.contains(t)) {
            return false;
        }
        if !self
            .labels
            .iter()
            .all(|(k, v)| token.metadata.labels.get(k).is_some_and(|actual| actual == v))
        {
            return false;
        }
        true
    }
}

/// Persistence contract for issued tokens (spec §6).
///
/// `get` is strongly consistent with the last `save`/`revoke` for a given
/// id; `list` is best-effort consistent. Implementations must be
/// `Send + Sync` — the store is shared across concurrent issuance and
/// validation calls.
#[async_trait::async_trait]
pub trait Store: Send + Sync + 'static {
    /// Persist `token`, replacing any existing entry with the same id.
    /// `ttl` bounds how long the store retains the entry even if the
    /// token's own `expires_at` is later (defensive backstop, not a
    /// substitute for the token's own expiry check).
    ///
    /// # Errors
    /// Returns [`Error::StoreFull`] if the store is at capacity, or
    /// [`Error::InvalidData`] if `token` fails a storage-layer structural
    /// check.
    async fn save(&self, token: Token, ttl: Duration) -> Result<()>;

    /// Look up a token by its id (JTI).
    ///
    /// # Errors
    /// Returns [`Error::TokenNotFound`] if no entry exists.
    async fn get(&self, id: &str) -> Result<Token>;

    /// List tokens matching `filter`. Best-effort consistent — a
    /// concurrent `save`/`revoke` may or may not be reflected.
    async fn list(&self, filter: &StoreFilter) -> Result<Vec<Token>>;

    /// Mark the stored entry for `id` as revoked, if present. This updates
    /// the *cached* copy of the token only — the authoritative revocation
    /// record lives in [`crate::revocation::RevocationRegistry`] and MUST
    /// be durable independently of this call (spec §6, §9).
    async fn revoke(&self, id: &str, reason: &str) -> Result<()>;

    /// Release any resources (background tasks, connections) held by this
    /// store. Idempotent.
    async fn close(&self) -> Result<()>;
}

struct Entry {
    token: Token,
    evict_at: DateTime<Utc>,
}

/// In-memory reference [`Store`] implementation: a `DashMap` keyed by
/// token id, with a background reaper evicting entries past their `ttl`.
pub struct InMemoryStore {
    by_id: DashMap<String, Entry>,
}

impl InMemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self { by_id: DashMap::new() }
    }

    /// Remove every entry whose `ttl` has elapsed as of `now`. Called
    /// periodically by [`spawn_reaper`]; exposed directly for tests.
    pub fn reap_expired(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .by_id
            .iter()
            .filter(|e| e.evict_at <= now)
            .map(|e| e.key().clone())
            .collect();
        let count = expired.len();
        for id in expired {
            self.by_id.remove(&id);
        }
        count
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    async fn save(&self, token: Token, ttl: Duration) -> Result<()> {
        let evict_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(0));
        self.by_id.insert(token.id.clone(), Entry { token, evict_at });
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Token> {
        self.by_id
            .get(id)
            .map(|e| e.token.clone())
            .ok_or(Error::TokenNotFound)
    }

    async fn list(&self, filter: &StoreFilter) -> Result<Vec<Token>> {
        Ok(self
            .by_id
            .iter()
            .map(|e| e.token.clone())
            .filter(|t| filter.matches(t))
            .collect())
    }

    async fn revoke(&self, id: &str, reason: &str) -> Result<()> {
        if let Some(mut entry) = self.by_id.get_mut(id) {
            entry.token.revocation = Some(crate::model::RevocationStatus {
                revoked_at: Utc::now(),
                reason: reason.to_string(),
                revoked_by: "issuer".to_string(),
            });
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Spawn a background task that reaps expired entries from `store` every
/// `interval`, exiting when `shutdown` fires.
pub fn spawn_reaper(
    store: Arc<InMemoryStore>,
    interval: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reaped = store.reap_expired(Utc::now());
                    if reaped > 0 {
                        debug!(count = reaped, "reaped expired tokens");
                    }
                }
                _ = shutdown.recv() => {
                    debug!("token store reaper shutting down");
                    break;
                }
            }
        }
    });
}
