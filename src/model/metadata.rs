//! Typed token metadata, replacing the "reflective/dynamic claims" pattern
//! spec §9 flags for re-architecture: a struct of named, typed fields plus a
//! `custom` string-to-string map for data the core genuinely never
//! interprets, instead of an `any`-valued bag.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Opaque-to-the-core metadata carried on a [`crate::model::Token`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Metadata {
    /// Device identifier/description for the requesting client.
    pub device_info: Option<String>,
    /// Application identifier that requested the token.
    pub app_id: Option<String>,
    /// Arbitrary key-value labels (e.g. `{"team": "fin-ops"}`).
    pub labels: BTreeMap<String, String>,
    /// Free-form tags.
    pub tags: BTreeSet<String>,
    /// Truly opaque data the core never interprets.
    pub custom: BTreeMap<String, String>,
}

impl Metadata {
    /// An empty metadata block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metadata_is_empty() {
        let m = Metadata::new();
        assert!(m.labels.is_empty());
        assert!(m.tags.is_empty());
        assert!(m.custom.is_empty());
    }

    #[test]
    fn roundtrips_through_json() {
        let mut m = Metadata::new();
        m.labels.insert("team".into(), "fin-ops".into());
        m.tags.insert("prod".into());
        let json = serde_json::to_string(&m).unwrap();
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }
}
