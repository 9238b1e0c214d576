//! Data model (spec §3): tokens, PoA definitions, delegation links, scopes,
//! protocol messages, and audit entries.
//!
//! Plain `serde`-derived structs and closed enums throughout, no
//! reflective/dynamic metadata bags (spec §9 explicitly calls out replacing
//! those with a typed [`metadata::Metadata`] plus a `custom` string map for
//! genuinely opaque data).

pub mod delegation;
pub mod metadata;
pub mod poa;
pub mod protocol;
pub mod scope;
pub mod token;

pub use delegation::{DelegationLink, DelegationType};
pub use metadata::Metadata;
pub use poa::PoADefinition;
pub use scope::Scope;
pub use token::{Claims, RevocationStatus, Token};
