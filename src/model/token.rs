//! The issued credential (spec §3 `Token`) and its JSON-mappable claims
//! representation (spec §6 `Claims`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::delegation::DelegationLink;
use super::metadata::Metadata;
use super::scope::Scope;

/// `aud` may be a single string or a list of strings on the wire; the core
/// always treats it as a set internally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// A single audience string.
    One(String),
    /// Multiple audience strings.
    Many(Vec<String>),
}

impl Audience {
    /// View the audience as a slice regardless of wire representation.
    #[must_use]
    pub fn as_slice(&self) -> Vec<&str> {
        match self {
            Self::One(s) => vec![s.as_str()],
            Self::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }

    /// Whether `candidate` is one of the declared audiences.
    #[must_use]
    pub fn contains(&self, candidate: &str) -> bool {
        self.as_slice().contains(&candidate)
    }
}

/// JSON-mappable claims carried by a validated token (spec §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject — the principal identifier this token acts for.
    pub sub: String,
    /// Issuer.
    pub iss: String,
    /// Audience (single string or array on the wire).
    pub aud: Audience,
    /// Expiration, Unix epoch seconds.
    pub exp: i64,
    /// Not-before, Unix epoch seconds.
    pub nbf: i64,
    /// Issued-at, Unix epoch seconds.
    pub iat: i64,
    /// Token identifier (JTI) — safe to log.
    pub jti: String,
    /// Granted scope strings.
    pub scopes: Vec<String>,
    /// Opaque user identifier, when the subject is a human-in-the-loop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Opaque session identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Serialized delegation-chain hops, if this token rests on a delegation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegations: Option<Vec<String>>,
}

/// Recorded once a token has been revoked (spec §3 `RevocationStatus`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationStatus {
    /// When the revocation was recorded.
    pub revoked_at: DateTime<Utc>,
    /// Caller-supplied reason.
    pub reason: String,
    /// Identifier of the actor that requested revocation.
    pub revoked_by: String,
}

/// The issued credential (spec §3 `Token`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Opaque, unique identifier (JTI) — safe to log.
    pub id: String,
    /// The opaque, high-entropy bearer value — NEVER logged in plaintext.
    pub value: String,
    /// Principal this token acts on behalf of.
    pub subject: String,
    /// Issuer identifier.
    pub issuer: String,
    /// Audience set.
    pub audience: Vec<String>,
    /// Issuance time.
    pub issued_at: DateTime<Utc>,
    /// Not-valid-before time.
    pub not_before: DateTime<Utc>,
    /// Expiration time.
    pub expires_at: DateTime<Utc>,
    /// Granted scope.
    pub scopes: Vec<Scope>,
    /// The PoA this token's authority rests on, if any.
    pub poa_ref: Option<String>,
    /// The delegation chain justifying this token's authority, if any.
    pub delegation_chain: Vec<DelegationLink>,
    /// Opaque-to-the-core metadata.
    pub metadata: Metadata,
    /// Revocation status, if revoked.
    pub revocation: Option<RevocationStatus>,
}

impl Token {
    /// `true` once `expires_at` has passed relative to `now`, allowing
    /// `skew` of tolerance on either side (spec §3, §4.1).
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, skew: chrono::Duration) -> bool {
        now > self.expires_at + skew
    }

    /// `true` if `now` is still before `not_before`, even accounting for
    /// `skew` (spec §4.1 clock-jump edge case: never silently accepted).
    #[must_use]
    pub fn is_not_yet_valid(&self, now: DateTime<Utc>, skew: chrono::Duration) -> bool {
        now < self.not_before - skew
    }

    /// Age of the token relative to `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.issued_at
    }

    /// Structural time-triple invariant: `issued_at ≤ not_before ≤ expires_at`.
    #[must_use]
    pub fn time_triple_holds(&self) -> bool {
        self.issued_at <= self.not_before && self.not_before <= self.expires_at
    }

    /// Build the JSON-mappable [`Claims`] view of this token.
    #[must_use]
    pub fn to_claims(&self) -> Claims {
        Claims {
            sub: self.subject.clone(),
            iss: self.issuer.clone(),
            aud: Audience::Many(self.audience.clone()),
            exp: self.expires_at.timestamp(),
            nbf: self.not_before.timestamp(),
            iat: self.issued_at.timestamp(),
            jti: self.id.clone(),
            scopes: self.scopes.iter().map(ToString::to_string).collect(),
            user_id: self.metadata.labels.get("user_id").cloned(),
            session_id: self.metadata.labels.get("session_id").cloned(),
            delegations: if self.delegation_chain.is_empty() {
                None
            } else {
                Some(
                    self.delegation_chain
                        .iter()
                        .map(|l| format!("{}->{}@{}", l.from_id, l.to_id, l.level))
                        .collect(),
                )
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn sample_token(now: DateTime<Utc>) -> Token {
        Token {
            id: "jti-1".into(),
            value: "poa_secret".into(),
            subject: "client-1".into(),
            issuer: "poa-core".into(),
            audience: vec!["resource-api".into()],
            issued_at: now,
            not_before: now,
            expires_at: now + ChronoDuration::hours(1),
            scopes: vec![Scope::parse("read").unwrap()],
            poa_ref: None,
            delegation_chain: Vec::new(),
            metadata: Metadata::new(),
            revocation: None,
        }
    }

    #[test]
    fn time_triple_holds_for_well_formed_token() {
        let now = Utc::now();
        assert!(sample_token(now).time_triple_holds());
    }

    #[test]
    fn is_expired_respects_clock_skew() {
        let now = Utc::now();
        let mut t = sample_token(now);
        t.expires_at = now - ChronoDuration::seconds(10);
        assert!(!t.is_expired(now, ChronoDuration::seconds(30)));
        assert!(t.is_expired(now, ChronoDuration::seconds(5)));
    }

    #[test]
    fn is_not_yet_valid_before_not_before_minus_skew() {
        let now = Utc::now();
        let mut t = sample_token(now);
        t.not_before = now + ChronoDuration::seconds(10);
        assert!(!t.is_not_yet_valid(now, ChronoDuration::seconds(30)));
        assert!(t.is_not_yet_valid(now, ChronoDuration::seconds(5)));
    }

    #[test]
    fn audience_contains_checks_both_wire_shapes() {
        let one = Audience::One("a".into());
        let many = Audience::Many(vec!["a".into(), "b".into()]);
        assert!(one.contains("a"));
        assert!(many.contains("b"));
        assert!(!many.contains("c"));
    }

    #[test]
    fn to_claims_carries_jti_and_scopes() {
        let now = Utc::now();
        let claims = sample_token(now).to_claims();
        assert_eq!(claims.jti, "jti-1");
        assert_eq!(claims.scopes, vec!["read".to_string()]);
    }
}
