//! Internal tunable configuration for the PoA-P core.
//!
//! This is *not* the deployment configuration surface (YAML files, CLI
//! flags, web UI) — that is explicitly out of scope per spec §6. It is
//! the ambient settings layer every subsystem needs (thresholds, windows,
//! defaults): struct defaults overridden by environment variables via
//! `figment`.

use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Root configuration for the authorization core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Token lifecycle tunables.
    pub token: TokenConfig,
    /// Delegation chain tunables.
    pub delegation: DelegationConfig,
    /// Scope hierarchy and composition tunables.
    pub scope: ScopeConfig,
    /// Rate limiter tunables.
    pub rate_limit: RateLimitConfig,
    /// Circuit breaker tunables.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Concurrent issuer tunables.
    pub issuer: IssuerConfig,
    /// Audit log tunables.
    pub audit: AuditConfig,
    /// Security monitor tunables.
    pub monitor: MonitorConfig,
    /// Transient-error retry tunables.
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: TokenConfig::default(),
            delegation: DelegationConfig::default(),
            scope: ScopeConfig::default(),
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            issuer: IssuerConfig::default(),
            audit: AuditConfig::default(),
            monitor: MonitorConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration: struct defaults, then `POA_`-prefixed environment
    /// variable overrides (e.g. `POA_TOKEN__MAX_SCOPES_PER_TOKEN=7`).
    ///
    /// # Errors
    /// Returns [`Error::Config`] if an override cannot be deserialized into
    /// the expected shape.
    pub fn load() -> Result<Self> {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Env::prefixed("POA_").split("__"))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }
}

/// Token lifecycle tunables (spec §3, §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Primary maximum token age (default 24h).
    #[serde(with = "duration_secs")]
    pub max_token_age: Duration,
    /// Additional, independently configurable max-age check (spec §9 keeps
    /// both the 24h and 8h thresholds rather than resolving the ambiguity).
    #[serde(with = "duration_secs")]
    pub additional_max_token_age: Duration,
    /// Allowed clock skew for `notBefore`/`expiresAt` comparisons.
    #[serde(with = "duration_secs")]
    pub clock_skew: Duration,
    /// Maximum number of scope strings on one token.
    pub max_scopes_per_token: usize,
    /// Default token lifetime when the caller does not specify one.
    #[serde(with = "duration_secs")]
    pub default_ttl: Duration,
    /// Whether an empty scope set is permitted (system tokens only).
    pub allow_empty_scopes: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            max_token_age: Duration::from_secs(24 * 3600),
            additional_max_token_age: Duration::from_secs(8 * 3600),
            clock_skew: Duration::from_secs(30),
            max_scopes_per_token: 50,
            default_ttl: Duration::from_secs(3600),
            allow_empty_scopes: false,
        }
    }
}

/// Delegation chain tunables (spec §3, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegationConfig {
    /// `MAX_CHAIN_LENGTH`.
    pub max_chain_length: usize,
    /// `MAX_DEPTH`.
    pub max_depth: u32,
    /// Maximum age of a single delegation link (365 days).
    #[serde(with = "duration_secs")]
    pub max_link_age: Duration,
    /// Window within which an identical chain hash is not revalidated.
    #[serde(with = "duration_secs")]
    pub revalidation_window: Duration,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            max_chain_length: 10,
            max_depth: 5,
            max_link_age: Duration::from_secs(365 * 24 * 3600),
            revalidation_window: Duration::from_secs(60),
        }
    }
}

/// Scope engine tunables (spec §4.3). Defaults are the spec's illustrative
/// table; production deployments supply their own (spec §9 open question).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Maximum length of a single scope string.
    pub max_scope_len: usize,
    /// `scope -> hierarchy level` table.
    pub hierarchy: std::collections::BTreeMap<String, u32>,
    /// `scope -> scopes that must never co-occur with it` table.
    pub forbidden: std::collections::BTreeMap<String, Vec<String>>,
    /// Whether an empty requested-scope set is permitted at all (only ever
    /// legal for system tokens; policy-gated per spec §4.3).
    pub allow_empty_for_system: bool,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        let hierarchy = [("read", 1), ("write", 2), ("delete", 3), ("admin", 4), ("system", 5)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let forbidden = [
            ("read", vec!["admin", "delete", "system"]),
            ("write", vec!["admin", "system"]),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.into_iter().map(String::from).collect()))
        .collect();
        Self {
            max_scope_len: 100,
            hierarchy,
            forbidden,
            allow_empty_for_system: true,
        }
    }
}

/// Rate limiter tunables (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per window (sliding window) or per second (token bucket).
    pub rate: u64,
    /// Sliding-window duration.
    #[serde(with = "duration_secs")]
    pub window: Duration,
    /// Token-bucket burst capacity.
    pub burst: u64,
    /// Ids idle longer than this are dropped by background cleanup.
    #[serde(with = "duration_secs")]
    pub inactivity_threshold: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate: 100,
            window: Duration::from_secs(60),
            burst: 20,
            inactivity_threshold: Duration::from_secs(3600),
        }
    }
}

/// Circuit breaker tunables (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Enable the breaker (disabled always allows).
    pub enabled: bool,
    /// Consecutive failures in `Closed` before tripping to `Open`.
    pub failure_threshold: u32,
    /// Consecutive successes in `HalfOpen` before closing.
    pub success_threshold: u32,
    /// Time in `Open` before a probe is allowed (`HalfOpen`).
    #[serde(with = "duration_secs")]
    pub reset_timeout: Duration,
    /// Maximum concurrent probes allowed while `HalfOpen`.
    pub half_open_limit: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
            half_open_limit: 1,
        }
    }
}

/// Concurrent issuer tunables (spec §4.1, §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuerConfig {
    /// Minimum wall-clock duration an `Issue` call must take (timing
    /// equalization, default 100ms).
    #[serde(with = "duration_secs")]
    pub min_issuance_duration: Duration,
    /// Overall issuance deadline (default 10s, bounded by ctx deadline).
    #[serde(with = "duration_secs")]
    pub issuance_deadline: Duration,
    /// How long an in-flight issuance marker is honored before being
    /// considered stale (default 30s).
    #[serde(with = "duration_secs")]
    pub duplicate_issuance_window: Duration,
    /// Nonce freshness window (default 1h, GC'd on insertion).
    #[serde(with = "duration_secs")]
    pub nonce_window: Duration,
    /// Validation operation deadline (default 2s).
    #[serde(with = "duration_secs")]
    pub validation_deadline: Duration,
    /// Store operation deadline (default 1s).
    #[serde(with = "duration_secs")]
    pub store_deadline: Duration,
    /// `iss` value every token is issued with and every `Validate` call
    /// checks claims against (spec §4.1 `Validate`: "issuer/audience match").
    pub expected_issuer: String,
    /// Audiences a validated token's `aud` must intersect. Empty means no
    /// restriction is configured — any audience is accepted.
    pub expected_audience: Vec<String>,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            min_issuance_duration: Duration::from_millis(100),
            issuance_deadline: Duration::from_secs(10),
            duplicate_issuance_window: Duration::from_secs(30),
            nonce_window: Duration::from_secs(3600),
            validation_deadline: Duration::from_secs(2),
            store_deadline: Duration::from_secs(1),
            expected_issuer: "poa-core".to_string(),
            expected_audience: Vec::new(),
        }
    }
}

/// Audit log tunables (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Whether MAC chaining (`prevMac`) is enabled for this writer.
    pub chain_enabled: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { chain_enabled: true }
    }
}

/// Security monitor thresholds (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// `auth_failures` threshold (default 10).
    pub auth_failures_threshold: u64,
    /// `suspicious_requests` threshold (default 5).
    pub suspicious_requests_threshold: u64,
    /// `rate_limit_violations` threshold (default 20).
    pub rate_limit_violations_threshold: u64,
    /// `privilege_escalation` threshold (default 1 — immediate).
    pub privilege_escalation_threshold: u64,
    /// `audit_tamper_attempts` threshold (default 1 — immediate).
    pub audit_tamper_attempts_threshold: u64,
    /// Handler dispatch deadline (default 500ms).
    #[serde(with = "duration_secs")]
    pub handler_dispatch_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            auth_failures_threshold: 10,
            suspicious_requests_threshold: 5,
            rate_limit_violations_threshold: 20,
            privilege_escalation_threshold: 1,
            audit_tamper_attempts_threshold: 1,
            handler_dispatch_timeout: Duration::from_millis(500),
        }
    }
}

/// Transient storage-error retry tunables (spec §7 propagation policy:
/// "transient storage errors are retried once with backoff").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Whether retrying is enabled at all.
    pub enabled: bool,
    /// Total attempts including the first (spec default: 2 — one retry).
    pub max_attempts: u32,
    /// Backoff before the first retry.
    #[serde(with = "duration_secs")]
    pub initial_backoff: Duration,
    /// Backoff ceiling for later retries.
    #[serde(with = "duration_secs")]
    pub max_backoff: Duration,
    /// Exponential backoff multiplier.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 2,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

/// `serde` helper: (de)serialize a [`Duration`] as whole seconds, matching
/// the precision every tunable above actually needs.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
