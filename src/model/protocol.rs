//! Wire-contract protocol messages (spec §6): the shapes exchanged between
//! an external transport layer (HTTP, gRPC — both out of scope per §1) and
//! this core. Plain `serde`-derived structs — no transport logic lives
//! here, only the data.

use serde::{Deserialize, Serialize};

use super::scope::Scope;

/// A caller-imposed restriction narrowing what a granted token may do,
/// beyond the scope list itself (e.g. a per-transaction amount cap).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restriction {
    /// Restriction kind (free text, interpreted by the embedding
    /// application — the core treats it as opaque data to carry faithfully).
    pub kind: String,
    /// Restriction value (free text).
    pub value: String,
}

/// Inbound request to authorize a client to act for a resource owner
/// (spec §6 `AuthorizationRequest`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Identifier of the requesting client (AI agent).
    pub client_id: String,
    /// Identifier of the entity that owns/operates the client.
    pub client_owner_id: String,
    /// Identifier of the principal whose resources are being authorized.
    pub resource_owner_id: String,
    /// Free-text description of what is being requested, shown to the
    /// principal during consent (opaque to the core).
    pub request_details: String,
    /// Requested scope strings (validated via [`crate::model::scope`]).
    pub scopes: Vec<String>,
    /// Unix epoch seconds the request was made.
    pub timestamp: i64,
}

/// A principal's grant of authority in response to an [`AuthorizationRequest`]
/// (spec §6 `AuthorizationGrant`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationGrant {
    /// Unique identifier for this grant.
    pub grant_id: String,
    /// The client this grant authorizes.
    pub client_id: String,
    /// Granted scope strings.
    pub scope: Vec<String>,
    /// Restrictions narrowing the grant.
    pub restrictions: Vec<Restriction>,
    /// RFC3339 timestamp the grant expires.
    pub valid_until: chrono::DateTime<chrono::Utc>,
}

/// A request to redeem a grant for an actual bearer token (spec §6 `TokenRequest`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequest {
    /// The grant being redeemed.
    pub grant_id: String,
    /// Requested scope (must be a subset of the grant's scope; enforced by
    /// the scope engine, not this message type).
    pub scope: Vec<String>,
    /// Restrictions to carry onto the issued token.
    pub restrictions: Vec<Restriction>,
}

/// The response to a successful [`TokenRequest`] (spec §6 `TokenResponse`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Opaque bearer token value.
    pub token: String,
    /// RFC3339 timestamp the token expires.
    pub valid_until: chrono::DateTime<chrono::Utc>,
    /// Scope granted on the token.
    pub scope: Vec<String>,
    /// Restrictions carried on the token.
    pub restrictions: Vec<Restriction>,
}

impl TokenRequest {
    /// Parse and validate every raw scope string on this request.
    ///
    /// # Errors
    /// Propagates the first [`crate::Error::InvalidScope`] encountered.
    pub fn parsed_scopes(&self) -> crate::Result<Vec<Scope>> {
        super::scope::parse_many(self.scope.iter().cloned())
    }
}
