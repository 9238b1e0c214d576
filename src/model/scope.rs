//! The `Scope` value type (spec §3): a non-empty string, at most 100
//! characters, drawn from a character set that excludes `< > " '`. Hierarchy
//! levels, forbidden combinations, and escalation checks live in the
//! top-level [`crate::scope`] engine — this module only owns the value's
//! shape.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const FORBIDDEN_CHARS: [char; 4] = ['<', '>', '"', '\''];

/// A validated scope string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Scope(String);

impl Scope {
    /// Parse and validate a scope string (spec §4.3 `isValidScope`).
    ///
    /// # Errors
    /// Returns [`Error::InvalidScope`] if `raw` is empty, longer than 100
    /// characters, or contains a forbidden character.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(Error::InvalidScope("scope must not be empty".into()));
        }
        if raw.len() > 100 {
            return Err(Error::InvalidScope("scope exceeds 100 characters".into()));
        }
        if raw.chars().any(|c| FORBIDDEN_CHARS.contains(&c)) {
            return Err(Error::InvalidScope(format!(
                "scope '{raw}' contains a forbidden character"
            )));
        }
        Ok(Self(raw))
    }

    /// Borrow the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Scope {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<Scope> for String {
    fn from(value: Scope) -> Self {
        value.0
    }
}

/// Validate a batch of raw scope strings, short-circuiting on the first
/// invalid entry.
///
/// # Errors
/// Propagates the first [`Error::InvalidScope`] encountered.
pub fn parse_many<I, S>(raw: I) -> Result<Vec<Scope>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    raw.into_iter().map(Scope::parse).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_scopes_parse() {
        assert!(Scope::parse("read").is_ok());
        assert!(Scope::parse("a".repeat(100)).is_ok());
    }

    #[test]
    fn empty_scope_is_rejected() {
        assert_eq!(
            Scope::parse(""),
            Err(Error::InvalidScope("scope must not be empty".into()))
        );
    }

    #[test]
    fn overlong_scope_is_rejected() {
        let s = "a".repeat(101);
        assert!(Scope::parse(s).is_err());
    }

    #[test]
    fn forbidden_characters_are_rejected() {
        for bad in ["<script>", "a\"b", "o'brien", "x<y"] {
            assert!(Scope::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn parse_many_short_circuits_on_first_invalid() {
        let result = parse_many(vec!["read", "", "write"]);
        assert!(result.is_err());
    }
}
