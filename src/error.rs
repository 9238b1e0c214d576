//! Error taxonomy for the PoA-P authorization core.
//!
//! Every variant carries a stable, kebab-case [`Error::code`] suitable for
//! transport layers (the core itself has none — see spec §6) and a
//! `Display` message safe to return to callers. Sensitive detail (raw token
//! values, key material, full delegation chains) never appears in a message;
//! it belongs in the audit log, keyed by request id.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable error taxonomy (spec §7).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ── Protocol ────────────────────────────────────────────────────────
    /// Malformed or incomplete request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Client is not authorized to perform the requested operation.
    #[error("unauthorized client")]
    UnauthorizedClient,
    /// The referenced grant is invalid, expired, or already used.
    #[error("invalid grant")]
    InvalidGrant,
    /// Requested scope is structurally invalid.
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    // ── Token ───────────────────────────────────────────────────────────
    /// Token signature/MAC does not verify, or is otherwise malformed.
    #[error("invalid token")]
    InvalidToken,
    /// `now > expiresAt (+ skew)`.
    #[error("token expired")]
    TokenExpired,
    /// `now < notBefore (- skew)`.
    #[error("token not yet valid")]
    NotYetValid,
    /// `now - issuedAt > MaxTokenAge`.
    #[error("token too old")]
    TokenTooOld,
    /// No record of this token id in the store.
    #[error("token not found")]
    TokenNotFound,
    /// Token id is present in the revocation registry.
    #[error("token revoked")]
    Revoked,

    // ── Authorization ───────────────────────────────────────────────────
    /// Requested scope exceeds what the base scopes grant.
    #[error("insufficient scope")]
    InsufficientScope,
    /// Requested scope jumps more than one hierarchy level above any base scope.
    #[error("scope escalation")]
    ScopeEscalation,
    /// Requested scope co-occurs with a base scope it is forbidden to combine with.
    #[error("forbidden scope combination")]
    ForbiddenCombination,
    /// Requested scope has no entry in the hierarchy table.
    #[error("unknown scope: {0}")]
    UnknownScope(String),

    // ── Delegation ──────────────────────────────────────────────────────
    /// Chain has zero links.
    #[error("empty delegation chain")]
    EmptyChain,
    /// Chain exceeds `MAX_CHAIN_LENGTH`.
    #[error("delegation chain too long")]
    ChainTooLong,
    /// A directed cycle exists over the chain's `fromID -> toID` edges.
    #[error("delegation chain contains a cycle")]
    ChainCycle,
    /// A link's level exceeds `MAX_DEPTH`.
    #[error("delegation depth exceeded")]
    DepthExceeded,
    /// `chain[i].fromID != chain[i-1].toID`.
    #[error("broken delegation chain")]
    BrokenChain,
    /// `chain[i].level != chain[i-1].level + 1`.
    #[error("invalid delegation level progression")]
    InvalidLevelProgression,
    /// `(type, level)` pair violates the type-level rule table.
    #[error("invalid delegation type for level")]
    InvalidDelegationType,
    /// `link.time > now`.
    #[error("delegation link timestamped in the future")]
    FutureDelegation,
    /// `now - link.time > 365 days`.
    #[error("stale delegation link")]
    StaleDelegation,

    // ── Rate / flow control ─────────────────────────────────────────────
    /// Caller has exhausted its rate-limit quota.
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    /// An issuance for this `clientID` is already in flight.
    #[error("duplicate issuance in flight")]
    DuplicateIssuance,
    /// Request id was already seen within the nonce window.
    #[error("nonce replay detected")]
    NonceReplay,
    /// Circuit breaker is open; call was not attempted.
    #[error("circuit open")]
    CircuitOpen,
    /// Concurrency bulkhead (e.g. half-open probe limit) is full.
    #[error("bulkhead full")]
    BulkheadFull,
    /// Retry budget exhausted.
    #[error("max retries exceeded")]
    MaxRetriesExceeded,
    /// Operation exceeded its deadline.
    #[error("operation timed out")]
    Timeout,
    /// Operation was cancelled via its context.
    #[error("operation cancelled")]
    Cancelled,

    // ── Integrity / crypto ──────────────────────────────────────────────
    /// A cryptographic operation (sign, verify, AEAD, KDF) failed.
    #[error("cryptographic failure")]
    CryptoFailure,
    /// A recomputed MAC did not match a stored/transmitted one.
    #[error("integrity check failed")]
    IntegrityFailure,
    /// Required key material was not available.
    #[error("missing key material")]
    MissingKey,

    // ── Storage ─────────────────────────────────────────────────────────
    /// Store rejected a write due to capacity limits.
    #[error("store full")]
    StoreFull,
    /// Store received structurally invalid data.
    #[error("invalid stored data")]
    InvalidData,
    /// A transient store error survived one retry and is now terminal.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Stable, kebab-case error code suitable for transport layers.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid-request",
            Self::UnauthorizedClient => "unauthorized-client",
            Self::InvalidGrant => "invalid-grant",
            Self::InvalidScope(_) => "invalid-scope",
            Self::InvalidToken => "invalid-token",
            Self::TokenExpired => "token-expired",
            Self::NotYetValid => "not-yet-valid",
            Self::TokenTooOld => "token-too-old",
            Self::TokenNotFound => "token-not-found",
            Self::Revoked => "revoked",
            Self::InsufficientScope => "insufficient-scope",
            Self::ScopeEscalation => "scope-escalation",
            Self::ForbiddenCombination => "forbidden-combination",
            Self::UnknownScope(_) => "unknown-scope",
            Self::EmptyChain => "empty-chain",
            Self::ChainTooLong => "chain-too-long",
            Self::ChainCycle => "chain-cycle",
            Self::DepthExceeded => "depth-exceeded",
            Self::BrokenChain => "broken-chain",
            Self::InvalidLevelProgression => "invalid-level-progression",
            Self::InvalidDelegationType => "invalid-delegation-type",
            Self::FutureDelegation => "future-delegation",
            Self::StaleDelegation => "stale-delegation",
            Self::RateLimitExceeded => "rate-limit-exceeded",
            Self::DuplicateIssuance => "duplicate-issuance",
            Self::NonceReplay => "nonce-replay",
            Self::CircuitOpen => "circuit-open",
            Self::BulkheadFull => "bulkhead-full",
            Self::MaxRetriesExceeded => "max-retries-exceeded",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::CryptoFailure => "crypto-failure",
            Self::IntegrityFailure => "integrity-failure",
            Self::MissingKey => "missing-key",
            Self::StoreFull => "store-full",
            Self::InvalidData => "invalid-data",
            Self::StoreUnavailable(_) => "store-unavailable",
            Self::Config(_) => "config-error",
        }
    }

    /// Whether this error always requires an audit entry plus an immediate
    /// security alert regardless of threshold gating (§7).
    #[must_use]
    pub fn always_alerts(&self) -> bool {
        matches!(self, Self::IntegrityFailure | Self::NonceReplay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_kebab_case_and_stable() {
        assert_eq!(Error::Revoked.code(), "revoked");
        assert_eq!(Error::ScopeEscalation.code(), "scope-escalation");
        assert_eq!(Error::NonceReplay.code(), "nonce-replay");
    }

    #[test]
    fn integrity_and_nonce_errors_always_alert() {
        assert!(Error::IntegrityFailure.always_alerts());
        assert!(Error::NonceReplay.always_alerts());
        assert!(!Error::InvalidToken.always_alerts());
    }

    #[test]
    fn messages_never_contain_sensitive_markers() {
        let e = Error::StoreUnavailable("connection refused".into());
        let msg = e.to_string();
        assert!(!msg.contains("mcpgw_"));
    }
}
