//! poa-core: the core of a Power-of-Attorney Protocol (PoA-P) authorization
//! system for autonomous AI agents.
//!
//! Scopes issued by this crate are not bare permission strings: they rest on
//! a structured [`model::PoADefinition`] — a legal delegation from a
//! principal (individual or organization) to an authorized client (LLM,
//! digital agent, agentic system, or robot) — and on a
//! [`model::DelegationLink`] chain proving how that authority reached the
//! requesting client. [`issuer::Issuer`] is the single entry point: it
//! issues, validates, refreshes, and revokes tokens while enforcing
//! delegation-chain integrity (`delegation`), scope-composition and
//! escalation rules (`scope`), rate limits and circuit breaking
//! (`failsafe`), and tamper-evident audit logging (`audit`) on every
//! decision.
//!
//! # Non-goals
//!
//! This crate has no HTTP/web surface, no metrics exporter, and no external
//! (YAML/file) configuration loader beyond [`config::Config::load`]'s
//! environment overrides. It ships [`store::InMemoryStore`] (non-durable,
//! for embedding or testing) and [`revocation::PersistentRevocationLog`]
//! (durable, log-structured) as reference [`store::Store`]/
//! [`revocation::RevocationRegistry`] implementations; a deployment is free
//! to wire its own in either seam.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod config;
pub mod context;
pub mod crypto;
pub mod delegation;
pub mod error;
pub mod failsafe;
pub mod issuer;
pub mod model;
pub mod revocation;
pub mod scope;
pub mod security;
pub mod store;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the `tracing` subscriber for an embedding application. Not
/// called by the crate itself — library code only ever emits through the
/// ambient `tracing` subscriber the host process installs, which may or may
/// not be this one.
///
/// # Errors
/// Returns [`Error::Config`] if a subscriber has already been installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::registry().with(filter);

    let result = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };

    result.map_err(|e| Error::Config(e.to_string()))
}
