//! Delegation chain value types (spec §3 `DelegationLink`).
//!
//! These are plain value types copied into a [`crate::model::Token`] —
//! "chain links are value types" per `spec.md` §3 Ownership & lifecycle. The
//! traversal and validation algorithm over a sequence of links lives in
//! [`crate::delegation`], grounded on the same "arena of links indexed by
//! `from_id`/`to_id`" approach the source patterns section calls for instead
//! of an owning-reference graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The three delegation-type categories a link may carry (spec §3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DelegationType {
    /// A human re-delegating to another human (e.g. power of attorney transfer).
    HumanToHuman,
    /// A human principal delegating to an AI agent.
    HumanToAi,
    /// One AI agent delegating to another (sub-agent orchestration).
    AiToAi,
}

impl DelegationType {
    /// The closed set of levels this delegation type is permitted at
    /// (spec §3: human-to-human ∈ {1,2,3}; human-to-ai ∈ {1..5}; ai-to-ai ∈ {2..5}).
    #[must_use]
    pub fn allowed_levels(self) -> std::ops::RangeInclusive<u32> {
        match self {
            Self::HumanToHuman => 1..=3,
            Self::HumanToAi => 1..=5,
            Self::AiToAi => 2..=5,
        }
    }
}

/// A single hop in a delegation chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationLink {
    /// Identifier of the party delegating authority at this hop.
    pub from_id: String,
    /// Identifier of the party receiving authority at this hop.
    pub to_id: String,
    /// The delegation-type category of this hop.
    #[serde(rename = "type")]
    pub kind: DelegationType,
    /// 1-indexed depth of this hop within the chain.
    pub level: u32,
    /// Issuance time of this specific link.
    pub time: DateTime<Utc>,
}

impl DelegationLink {
    /// Construct the first link of a new chain (`level == 1`).
    #[must_use]
    pub fn root(from_id: impl Into<String>, to_id: impl Into<String>, kind: DelegationType, time: DateTime<Utc>) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: to_id.into(),
            kind,
            level: 1,
            time,
        }
    }
}
