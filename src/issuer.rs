//! The concurrent token issuer (spec §4.1, §5): the single entry point that
//! orders every precondition check, persists before returning, and
//! time-equalizes its response so two requests — one cheaply rejected, one
//! expensively approved — take the same wall-clock time from the caller's
//! perspective.
//!
//! Duplicate-issuance detection is a keyed exclusion over `client_id`
//! (spec §9 flags "a map of per-request reply channels" as the wrong shape
//! for this; a `DashMap` entry acting as a keyed mutex is enough). This is
//! "exclude concurrent siblings outright" rather than "join the in-flight
//! caller" since a second concurrent issuance for the same client is a
//! caller bug, not a request to join.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as DashEntry;
use tracing::{info, warn};

use crate::audit::{AuditEntryDraft, AuditLog};
use crate::config::{Config, IssuerConfig, TokenConfig};
use crate::context::Ctx;
use crate::crypto::KeyManager;
use crate::delegation::ChainValidator;
use crate::failsafe::Failsafe;
use crate::model::{Claims, DelegationLink, Metadata, PoADefinition, Scope, Token};
use crate::revocation::RevocationRegistry;
use crate::scope::ScopeEngine;
use crate::security::{SecurityEvent, SecurityMonitor};
use crate::store::Store;
use crate::{Error, Result};

/// Everything needed to issue one token (spec §4.1 `Issue` parameters).
#[derive(Debug, Clone)]
pub struct IssueRequest {
    /// Requesting client (agent) identifier — the duplicate-issuance and
    /// rate-limit key.
    pub client_id: String,
    /// Principal this token will act for.
    pub subject: String,
    /// Intended audience(s).
    pub audience: Vec<String>,
    /// Scope being requested.
    pub requested_scopes: Vec<Scope>,
    /// Scope already held, against which the request is composed (spec §4.3).
    pub base_scopes: Vec<Scope>,
    /// The PoA this issuance rests on.
    pub poa: PoADefinition,
    /// Stable reference to the PoA record, carried onto the token.
    pub poa_ref: Option<String>,
    /// Delegation chain justifying this issuance.
    pub delegation_chain: Vec<DelegationLink>,
    /// Caller-supplied anti-replay nonce, unique per logical request.
    pub nonce: String,
    /// Whether this issuance is for a system-class token (only class that
    /// may carry an empty scope set).
    pub is_system_token: bool,
    /// Requested lifetime; falls back to [`TokenConfig::default_ttl`].
    pub ttl: Option<Duration>,
    /// Opaque metadata to carry onto the token.
    pub metadata: Metadata,
}

/// The concurrent token issuer.
pub struct Issuer {
    issuer_config: IssuerConfig,
    token_config: TokenConfig,
    store: Arc<dyn Store>,
    revocation: Arc<dyn RevocationRegistry>,
    chain_validator: Arc<ChainValidator>,
    scope_engine: Arc<ScopeEngine>,
    failsafe: Failsafe,
    audit: Arc<AuditLog>,
    monitor: Arc<SecurityMonitor>,
    keys: Arc<KeyManager>,
    nonces: DashMap<String, DateTime<Utc>>,
    in_flight: DashMap<String, DateTime<Utc>>,
}

impl Issuer {
    /// Assemble an issuer from its collaborators. `config` supplies both
    /// the issuer's own tunables and the token-lifecycle tunables every
    /// check below is parameterized by.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &Config,
        store: Arc<dyn Store>,
        revocation: Arc<dyn RevocationRegistry>,
        chain_validator: Arc<ChainValidator>,
        scope_engine: Arc<ScopeEngine>,
        audit: Arc<AuditLog>,
        monitor: Arc<SecurityMonitor>,
        keys: Arc<KeyManager>,
    ) -> Self {
        Self {
            issuer_config: config.issuer.clone(),
            token_config: config.token.clone(),
            store,
            revocation,
            chain_validator,
            scope_engine,
            failsafe: Failsafe::new("issuer", config),
            audit,
            monitor,
            keys,
            nonces: DashMap::new(),
            in_flight: DashMap::new(),
        }
    }

    /// Issue a token (spec §4.1 `Issue`).
    ///
    /// Precondition order: nonce freshness, rate limit, duplicate-issuance
    /// exclusion, PoA validity, delegation-chain validity, scope
    /// composition. The call's wall-clock duration never falls below
    /// [`IssuerConfig::min_issuance_duration`], win or lose.
    ///
    /// # Errors
    /// Returns the first violated precondition, or a storage error if
    /// persistence fails after every check passes.
    pub async fn issue(&self, ctx: &Ctx, req: IssueRequest) -> Result<Token> {
        let started = tokio::time::Instant::now();
        let inner_ctx = ctx.bounded(self.issuer_config.issuance_deadline);

        let result = inner_ctx.run(self.issue_checked(&req)).await.and_then(|r| r);
        self.equalize_timing(started).await;
        result
    }

    async fn issue_checked(&self, req: &IssueRequest) -> Result<Token> {
        let now = Utc::now();

        self.check_nonce(&req.nonce, now).await?;
        self.failsafe.check(&req.client_id, now)?;
        let _guard = self.enter_in_flight(&req.client_id)?;

        self.check_poa_validity(&req.poa, now).await?;
        self.chain_validator.validate(&req.delegation_chain, now)?;

        if let Err(e) = self.check_scopes(req) {
            if e == Error::ScopeEscalation {
                self.monitor
                    .record(
                        SecurityEvent::PrivilegeEscalation,
                        req.client_id.clone(),
                        None,
                        "scope escalation blocked during issuance",
                    )
                    .await;
            }
            return Err(e);
        }

        let token = self.build_token(req, now)?;

        let ttl = req.ttl.unwrap_or(self.token_config.default_ttl);
        if let Err(e) = self.store.save(token.clone(), ttl).await {
            self.failsafe.record_failure();
            return Err(e);
        }
        self.failsafe.record_success();

        self.write_audit("token.issued", &req.client_id, &token.id, "success").await;
        info!(client_id = %req.client_id, token_id = %token.id, "token issued");
        Ok(token)
    }

    /// Validate a bearer token value, returning its [`Claims`] (spec §4.1 `Validate`).
    ///
    /// # Errors
    /// Returns [`Error::InvalidToken`] on a bad signature, an issuer
    /// mismatch, an audience that misses every configured expected
    /// audience, or a malformed scope string; [`Error::Revoked`] if the
    /// token id is in the revocation registry; [`Error::TokenExpired`] /
    /// [`Error::NotYetValid`] / [`Error::TokenTooOld`] on the respective time
    /// check.
    pub async fn validate(&self, ctx: &Ctx, token_value: &str) -> Result<Claims> {
        let deadline_ctx = ctx.bounded(self.issuer_config.validation_deadline);
        deadline_ctx.run(self.validate_checked(token_value)).await.and_then(|r| r)
    }

    async fn validate_checked(&self, token_value: &str) -> Result<Claims> {
        let claims: Claims = self.keys.verify(token_value).map_err(|_| {
            Error::InvalidToken
        })?;

        if claims.iss != self.issuer_config.expected_issuer {
            return Err(Error::InvalidToken);
        }
        if !self.issuer_config.expected_audience.is_empty()
            && !self.issuer_config.expected_audience.iter().any(|aud| claims.aud.contains(aud))
        {
            return Err(Error::InvalidToken);
        }
        for scope in &claims.scopes {
            Scope::parse(scope.as_str())?;
        }

        if self.revocation.is_revoked(&claims.jti).await {
            return Err(Error::Revoked);
        }

        let now = Utc::now();
        let skew = chrono::Duration::from_std(self.token_config.clock_skew)
            .unwrap_or(chrono::Duration::seconds(30));

        if now.timestamp() > claims.exp + skew.num_seconds() {
            return Err(Error::TokenExpired);
        }
        if now.timestamp() < claims.nbf - skew.num_seconds() {
            return Err(Error::NotYetValid);
        }

        let max_age = chrono::Duration::from_std(self.token_config.max_token_age)
            .unwrap_or(chrono::Duration::hours(24));
        let additional_max_age = chrono::Duration::from_std(self.token_config.additional_max_token_age)
            .unwrap_or(chrono::Duration::hours(8));
        let age = now.timestamp() - claims.iat;
        if age > max_age.num_seconds() || age > additional_max_age.num_seconds() {
            self.monitor
                .record(SecurityEvent::AuthFailures, claims.sub.clone(), None, "token exceeded max age")
                .await;
            return Err(Error::TokenTooOld);
        }

        Ok(claims)
    }

    /// Issue a fresh token for the same subject/scope/chain, extending
    /// validity by `duration`. The old token is left exactly as it was —
    /// refreshing never implicitly revokes it (spec §4.1 `Refresh`).
    ///
    /// # Errors
    /// Propagates [`Issuer::validate`]'s errors for the old token, or a
    /// storage error persisting the new one.
    pub async fn refresh(&self, ctx: &Ctx, old_token_value: &str, duration: Duration) -> Result<Token> {
        let claims = self.validate(ctx, old_token_value).await?;

        let now = Utc::now();
        let id = crate::crypto::random::generate_id();
        let scopes: Vec<Scope> = claims
            .scopes
            .iter()
            .filter_map(|s| Scope::parse(s).ok())
            .collect();
        let claims_for_signing = Claims {
            jti: id.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::hours(1)))
                .timestamp(),
            ..claims.clone()
        };
        let value = self.keys.sign(&claims_for_signing)?;

        let token = Token {
            id,
            value,
            subject: claims.sub.clone(),
            issuer: claims.iss.clone(),
            audience: claims.aud.as_slice().into_iter().map(String::from).collect(),
            issued_at: now,
            not_before: now,
            expires_at: now + chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::hours(1)),
            scopes,
            poa_ref: None,
            delegation_chain: Vec::new(),
            metadata: Metadata::new(),
            revocation: None,
        };

        self.store.save(token.clone(), duration).await?;
        self.write_audit("token.refreshed", &claims.sub, &token.id, "success").await;
        Ok(token)
    }

    /// Revoke a token by its bearer value (spec §4.1 `Revoke`). MUST
    /// succeed even when the token has already expired — the signature
    /// check alone (not the time checks) gates whether `token_value` is
    /// well-formed.
    ///
    /// # Errors
    /// Returns [`Error::InvalidToken`] if the signature does not verify.
    pub async fn revoke(&self, ctx: &Ctx, token_value: &str, reason: &str) -> Result<()> {
        let claims: Claims = self.keys.verify(token_value).map_err(|_| Error::InvalidToken)?;
        let deadline_ctx = ctx.bounded(self.issuer_config.store_deadline);

        deadline_ctx
            .run(async {
                let now = Utc::now();
                self.revocation.revoke(&claims.jti, now, reason, "issuer").await?;
                let _ = self.store.revoke(&claims.jti, reason).await;
                Ok::<(), Error>(())
            })
            .await??;

        self.write_audit("token.revoked", &claims.sub, &claims.jti, "success").await;
        Ok(())
    }

    async fn check_nonce(&self, nonce: &str, now: DateTime<Utc>) -> Result<()> {
        if self.nonces.contains_key(nonce) {
            self.monitor
                .record(SecurityEvent::SuspiciousRequests, nonce.to_string(), None, "nonce replay detected")
                .await;
            return Err(Error::NonceReplay);
        }

        let window = chrono::Duration::from_std(self.issuer_config.nonce_window)
            .unwrap_or(chrono::Duration::hours(1));
        self.nonces.insert(nonce.to_string(), now);
        let gc_before = now - window;
        self.nonces.retain(|_, ts| *ts >= gc_before);
        Ok(())
    }

    /// Exclude concurrent issuance for `client_id`. A marker left behind by
    /// a caller that crashed before dropping its guard is only honored for
    /// [`IssuerConfig::duplicate_issuance_window`] — past that it is
    /// considered stale and a new caller may proceed (spec §4.1: the window
    /// bounds how long an in-flight marker is trusted, not how long
    /// issuance itself may take).
    fn enter_in_flight(&self, client_id: &str) -> Result<InFlightGuard<'_>> {
        let now = Utc::now();
        let stale_before = chrono::Duration::from_std(self.issuer_config.duplicate_issuance_window)
            .unwrap_or(chrono::Duration::seconds(30));

        match self.in_flight.entry(client_id.to_string()) {
            DashEntry::Occupied(occupied) if now - *occupied.get() < stale_before => {
                Err(Error::DuplicateIssuance)
            }
            DashEntry::Occupied(mut occupied) => {
                occupied.insert(now);
                Ok(InFlightGuard { map: &self.in_flight, key: client_id.to_string() })
            }
            DashEntry::Vacant(v) => {
                v.insert(now);
                Ok(InFlightGuard { map: &self.in_flight, key: client_id.to_string() })
            }
        }
    }

    async fn check_poa_validity(&self, poa: &PoADefinition, now: DateTime<Utc>) -> Result<()> {
        if !poa.principal_invariant_holds() {
            return Err(Error::InvalidGrant);
        }
        if !poa.validity.covers(now) {
            return Err(Error::InvalidGrant);
        }
        Ok(())
    }

    fn check_scopes(&self, req: &IssueRequest) -> Result<()> {
        if req.requested_scopes.is_empty() {
            if self.scope_engine.allows_empty_scopes(req.is_system_token) {
                return Ok(());
            }
            return Err(Error::InsufficientScope);
        }

        if req.requested_scopes.len() > self.token_config.max_scopes_per_token {
            return Err(Error::InvalidScope(format!(
                "requested {} scopes, exceeding the {} allowed per token",
                req.requested_scopes.len(),
                self.token_config.max_scopes_per_token
            )));
        }

        self.scope_engine.validate_composition(&req.requested_scopes, &req.base_scopes)
    }

    fn build_token(&self, req: &IssueRequest, now: DateTime<Utc>) -> Result<Token> {
        let id = crate::crypto::random::generate_id();
        let ttl = req.ttl.unwrap_or(self.token_config.default_ttl);
        let expires_at = now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(1));

        let claims = Claims {
            sub: req.subject.clone(),
            iss: self.issuer_config.expected_issuer.clone(),
            aud: crate::model::token::Audience::Many(req.audience.clone()),
            exp: expires_at.timestamp(),
            nbf: now.timestamp(),
            iat: now.timestamp(),
            jti: id.clone(),
            scopes: req.requested_scopes.iter().map(ToString::to_string).collect(),
            user_id: req.metadata.labels.get("user_id").cloned(),
            session_id: req.metadata.labels.get("session_id").cloned(),
            delegations: None,
        };
        let value = self.keys.sign(&claims)?;

        Ok(Token {
            id,
            value,
            subject: req.subject.clone(),
            issuer: self.issuer_config.expected_issuer.clone(),
            audience: req.audience.clone(),
            issued_at: now,
            not_before: now,
            expires_at,
            scopes: req.requested_scopes.clone(),
            poa_ref: req.poa_ref.clone(),
            delegation_chain: req.delegation_chain.clone(),
            metadata: req.metadata.clone(),
            revocation: None,
        })
    }

    async fn write_audit(&self, event_type: &str, subject: &str, resource: &str, result: &str) {
        let draft = AuditEntryDraft {
            event_type: event_type.to_string(),
            subject: subject.to_string(),
            action: event_type.to_string(),
            resource: resource.to_string(),
            result: result.to_string(),
            details: String::new(),
        };
        if let Err(e) = self.audit.append(draft).await {
            warn!(error = %e, "failed to write audit entry");
        }
    }

    async fn equalize_timing(&self, started: tokio::time::Instant) {
        let elapsed = started.elapsed();
        let min = self.issuer_config.min_issuance_duration;
        if elapsed < min {
            tokio::time::sleep(min - elapsed).await;
        }
    }
}

struct InFlightGuard<'a> {
    map: &'a DashMap<String, DateTime<Utc>>,
    key: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}
