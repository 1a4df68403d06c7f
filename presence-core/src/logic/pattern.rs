//! Pattern Matcher
//!
//! Identity filter expressions given with `--mac`. A pattern matches on the
//! start of the address; `%` stands for any run of characters, like in SQL.

use regex::{Regex, RegexBuilder};

use super::identity::Identity;
use crate::error::{PresenceError, Result};

/// Wildcard token accepted in patterns
pub const WILDCARD: char = '%';

/// One compiled filter expression
#[derive(Debug, Clone)]
pub struct Matcher {
    pattern: String,
    regex: Regex,
}

impl Matcher {
    pub fn compile(pattern: &str) -> Result<Self> {
        let body = pattern
            .split(WILDCARD)
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");

        let regex = RegexBuilder::new(&format!("^{}", body))
            .case_insensitive(true)
            .build()
            .map_err(|e| PresenceError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, identity: &Identity) -> bool {
        self.regex.is_match(&identity.to_string())
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// OR-combination of matchers
#[derive(Debug, Clone, Default)]
pub struct MatcherSet {
    matchers: Vec<Matcher>,
}

impl MatcherSet {
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let matchers = patterns
            .iter()
            .map(|p| Matcher::compile(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { matchers })
    }

    /// No pattern configured: every identity is a candidate
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn matches(&self, identity: &Identity) -> bool {
        self.matchers.iter().any(|m| m.matches(identity))
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.matchers.iter().map(Matcher::pattern)
    }
}
