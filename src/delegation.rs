//! Delegation chain validator (spec §4.2).
//!
//! Pure given its inputs plus its own revalidation-rate-limit table — it
//! never consults the token store. Cycle detection walks the edge set
//! `{(link.from_id -> link.to_id)}` by index, not by owning reference, per
//! spec §9's "arena of links indexed by from_id/to_id" re-architecture note
//! (the source pattern of cyclic owning references is explicitly rejected).

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::config::DelegationConfig;
use crate::model::DelegationLink;
use crate::{Error, Result};

/// Validates delegation chains against spec §3's structural invariants plus
/// a revalidation-storm guard (spec §4.2 step 4).
pub struct ChainValidator {
    config: DelegationConfig,
    /// Canonical chain hash -> last-validated-at, for the revalidation
    /// storm guard. Table-level concurrent map, GC'd on insertion.
    recent: DashMap<[u8; 32], DateTime<Utc>>,
}

impl ChainValidator {
    /// Build a validator from configuration.
    #[must_use]
    pub fn new(config: DelegationConfig) -> Self {
        Self {
            config,
            recent: DashMap::new(),
        }
    }

    /// Validate `chain` against every structural invariant in spec §3,
    /// then apply the revalidation-storm rate limit.
    ///
    /// # Errors
    /// Returns the first violated invariant as a typed [`Error`].
    pub fn validate(&self, chain: &[DelegationLink], now: DateTime<Utc>) -> Result<()> {
        self.validate_structure(chain, now)?;
        self.check_revalidation_window(chain, now)
    }

    /// The structural checks alone, without touching the revalidation-rate
    /// table — used by tests and by callers that intentionally re-validate
    /// (e.g. a stored chain re-checked at use time) without tripping the
    /// storm guard.
    ///
    /// # Errors
    /// Returns the first violated invariant as a typed [`Error`].
    pub fn validate_structure(&self, chain: &[DelegationLink], now: DateTime<Utc>) -> Result<()> {
        if chain.is_empty() {
            return Err(Error::EmptyChain);
        }
        if chain.len() > self.config.max_chain_length {
            return Err(Error::ChainTooLong);
        }

        detect_cycle(chain)?;

        for (i, link) in chain.iter().enumerate() {
            if link.level > self.config.max_depth {
                return Err(Error::DepthExceeded);
            }
            if i > 0 {
                let prev = &chain[i - 1];
                if link.from_id != prev.to_id {
                    return Err(Error::BrokenChain);
                }
                if link.level != prev.level + 1 {
                    return Err(Error::InvalidLevelProgression);
                }
            } else if link.level != 1 {
                return Err(Error::InvalidLevelProgression);
            }

            if !link.kind.allowed_levels().contains(&link.level) {
                return Err(Error::InvalidDelegationType);
            }

            if link.time > now {
                return Err(Error::FutureDelegation);
            }
            let age = now - link.time;
            let max_age = chrono::Duration::from_std(self.config.max_link_age)
                .unwrap_or(chrono::Duration::days(365));
            if age > max_age {
                return Err(Error::StaleDelegation);
            }
        }

        Ok(())
    }

    /// Reject a chain that was already validated within
    /// `config.revalidation_window` (spec §4.2 step 4), identified by a
    /// canonical hash of its links. GC's hash entries older than twice the
    /// window on every insertion.
    ///
    /// # Errors
    /// Returns [`Error::RateLimitExceeded`] if the identical chain was
    /// validated too recently.
    fn check_revalidation_window(&self, chain: &[DelegationLink], now: DateTime<Utc>) -> Result<()> {
        let key = canonical_hash(chain);
        let window = chrono::Duration::from_std(self.config.revalidation_window)
            .unwrap_or(chrono::Duration::minutes(1));

        if let Some(last) = self.recent.get(&key)
            && now - *last < window
        {
            return Err(Error::RateLimitExceeded);
        }
        self.recent.insert(key, now);

        let gc_before = now - window * 2;
        self.recent.retain(|_, ts| *ts >= gc_before);
        Ok(())
    }
}

/// DFS cycle detection over the `from_id -> to_id` edge set, tracking
/// `visited`/`on_stack` by node id (spec §4.2 step 2).
fn detect_cycle(chain: &[DelegationLink]) -> Result<()> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for link in chain {
        adjacency.entry(link.from_id.as_str()).or_default().push(link.to_id.as_str());
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut on_stack: HashSet<&str> = HashSet::new();

    for link in chain {
        if !visited.contains(link.from_id.as_str())
            && dfs_has_cycle(link.from_id.as_str(), &adjacency, &mut visited, &mut on_stack)
        {
            return Err(Error::ChainCycle);
        }
    }
    Ok(())
}

fn dfs_has_cycle<'a>(
    node: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    on_stack: &mut HashSet<&'a str>,
) -> bool {
    visited.insert(node);
    on_stack.insert(node);

    if let Some(neighbors) = adjacency.get(node) {
        for &next in neighbors {
            if on_stack.contains(next) {
                return true;
            }
            if !visited.contains(next) && dfs_has_cycle(next, adjacency, visited, on_stack) {
                return true;
            }
        }
    }

    on_stack.remove(node);
    false
}

/// Canonical form of a chain for hashing: the ordered tuple of
/// `(from_id, to_id, level)` per link, joined and hashed with SHA-256.
fn canonical_hash(chain: &[DelegationLink]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for link in chain {
        hasher.update(link.from_id.as_bytes());
        hasher.update(b"->");
        hasher.update(link.to_id.as_bytes());
        hasher.update(b"@");
        hasher.update(link.level.to_le_bytes());
        hasher.update(b";");
    }
    hasher.finalize().into()
}
