//! Scope composition and escalation prevention (spec §4.3).
//!
//! The value type lives in [`crate::model::scope`]; this module is the
//! *engine* — hierarchy lookup, forbidden-combination checks, and the
//! one-level-step-up escalation rule — configured from [`crate::config::ScopeConfig`]
//! rather than hardcoded, so a deployment can supply its own vocabulary
//! (spec §9 open question).

use std::collections::{BTreeMap, BTreeSet};

use crate::config::ScopeConfig;
use crate::model::Scope;
use crate::{Error, Result};

/// Compiled scope hierarchy + forbidden-combination tables, built once from
/// configuration and shared (read-only) across requests.
#[derive(Debug, Clone)]
pub struct ScopeEngine {
    hierarchy: BTreeMap<String, u32>,
    forbidden: BTreeMap<String, BTreeSet<String>>,
    allow_empty_for_system: bool,
}

impl ScopeEngine {
    /// Build an engine from configuration.
    #[must_use]
    pub fn new(config: &ScopeConfig) -> Self {
        let forbidden = config
            .forbidden
            .iter()
            .map(|(k, v)| (k.clone(), v.iter().cloned().collect::<BTreeSet<_>>()))
            .collect();
        Self {
            hierarchy: config.hierarchy.clone(),
            forbidden,
            allow_empty_for_system: config.allow_empty_for_system,
        }
    }

    /// Hierarchy level of a scope, if known.
    #[must_use]
    pub fn level_of(&self, scope: &str) -> Option<u32> {
        self.hierarchy.get(scope).copied()
    }

    /// Validate that `requested` may be composed alongside `base` (spec
    /// §4.3 `ValidateComposition`).
    ///
    /// - Every requested scope must have a known hierarchy level.
    /// - No requested scope may co-occur with a base scope in its
    ///   forbidden set.
    /// - No requested scope may exceed `hierarchy[base] + 1` for any base
    ///   scope (multi-level escalation is rejected; one-level step-ups are
    ///   allowed).
    ///
    /// # Errors
    /// Returns [`Error::UnknownScope`], [`Error::ForbiddenCombination`], or
    /// [`Error::ScopeEscalation`] on the first violation found, in that
    /// priority order per requested scope.
    pub fn validate_composition(&self, requested: &[Scope], base: &[Scope]) -> Result<()> {
        for r in requested {
            let r_level = self
                .level_of(r.as_str())
                .ok_or_else(|| Error::UnknownScope(r.as_str().to_string()))?;

            for b in base {
                if let Some(forbidden) = self.forbidden.get(r.as_str())
                    && forbidden.contains(b.as_str())
                {
                    return Err(Error::ForbiddenCombination);
                }

                let b_level = self.level_of(b.as_str()).unwrap_or(0);
                if r_level > b_level + 1 {
                    return Err(Error::ScopeEscalation);
                }
            }
        }
        Ok(())
    }

    /// Whether an empty scope set is acceptable given the caller is
    /// requesting a system-class token (spec §4.3: "Empty set of scopes is
    /// legal only for system tokens, policy-configurable").
    #[must_use]
    pub fn allows_empty_scopes(&self, is_system_token: bool) -> bool {
        is_system_token && self.allow_empty_for_system
    }
}

impl Default for ScopeEngine {
    fn default() -> Self {
        Self::new(&ScopeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::scope::parse_many;

    fn scopes(raw: &[&str]) -> Vec<Scope> {
        parse_many(raw.iter().copied()).unwrap()
    }

    #[test]
    fn unknown_scope_is_rejected() {
        let engine = ScopeEngine::default();
        let result = engine.validate_composition(&scopes(&["teleport"]), &scopes(&["read"]));
        assert_eq!(result, Err(Error::UnknownScope("teleport".into())));
    }

    #[test]
    fn one_level_step_up_is_allowed() {
        let engine = ScopeEngine::default();
        assert!(engine.validate_composition(&scopes(&["write"]), &scopes(&["read"])).is_ok());
    }

    #[test]
    fn multi_level_escalation_is_rejected() {
        let engine = ScopeEngine::default();
        let result = engine.validate_composition(&scopes(&["system"]), &scopes(&["read"]));
        assert_eq!(result, Err(Error::ScopeEscalation));
    }

    #[test]
    fn forbidden_combination_is_rejected_even_if_not_an_escalation() {
        let engine = ScopeEngine::default();
        let result = engine.validate_composition(&scopes(&["read"]), &scopes(&["admin"]));
        assert_eq!(result, Err(Error::ForbiddenCombination));
    }

    #[test]
    fn matching_base_scope_permits_same_level_request() {
        let engine = ScopeEngine::default();
        assert!(engine.validate_composition(&scopes(&["read"]), &scopes(&["read"])).is_ok());
    }
}
