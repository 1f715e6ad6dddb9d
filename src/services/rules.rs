//! Export rules and exclusions.
//!
//! Rules come from export profiles as `"<regex>:<format>"` strings, e.g.
//! `"Game/Content/UI/.*\.uasset:json"`. Every pattern is anchored to the whole
//! logical path and matched case-insensitively, so a short pattern never
//! matches a deeper path by accident.
//!
//! Evaluation: any matching exclusion vetoes the path; otherwise the first
//! matching rule in list order supplies the target format.

use regex::{Regex, RegexBuilder};
use thiserror::Error;

/// Errors raised while compiling rules. These are configuration errors and
/// abort the profile they belong to.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Export rule '{0}' is missing a ':<format>' suffix")]
    MissingFormat(String),

    #[error("Export rule '{0}' has an empty target format")]
    EmptyFormat(String),

    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

fn anchored(pattern: &str) -> Result<Regex, RuleError> {
    RegexBuilder::new(&format!("^(?:{})$", pattern))
        .case_insensitive(true)
        .build()
        .map_err(|source| RuleError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// A pattern plus the format matching files are exported as.
#[derive(Debug, Clone)]
pub struct ExportRule {
    pattern: String,
    regex: Regex,
    target_format: String,
}

impl ExportRule {
    pub fn new(pattern: &str, target_format: &str) -> Result<Self, RuleError> {
        let target_format = target_format.trim().to_lowercase();
        if target_format.is_empty() {
            return Err(RuleError::EmptyFormat(pattern.to_string()));
        }

        Ok(Self {
            pattern: pattern.to_string(),
            regex: anchored(pattern)?,
            target_format,
        })
    }

    /// Parse `"<regex>:<format>"`, splitting at the last `:`.
    pub fn parse(rule: &str) -> Result<Self, RuleError> {
        let (pattern, format) = rule
            .rsplit_once(':')
            .ok_or_else(|| RuleError::MissingFormat(rule.to_string()))?;

        if format.trim().is_empty() {
            return Err(RuleError::EmptyFormat(rule.to_string()));
        }

        Self::new(pattern, format)
    }

    pub fn is_match(&self, logical_path: &str) -> bool {
        self.regex.is_match(logical_path)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn target_format(&self) -> &str {
        &self.target_format
    }
}

/// A pattern that vetoes export of any path it matches.
#[derive(Debug, Clone)]
pub struct ExclusionRule {
    pattern: String,
    regex: Regex,
}

impl ExclusionRule {
    pub fn new(pattern: &str) -> Result<Self, RuleError> {
        Ok(Self {
            pattern: pattern.to_string(),
            regex: anchored(pattern)?,
        })
    }

    pub fn is_match(&self, logical_path: &str) -> bool {
        self.regex.is_match(logical_path)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// Ordered export rules plus exclusions, compiled once per profile.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<ExportRule>,
    exclusions: Vec<ExclusionRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<ExportRule>, exclusions: Vec<ExclusionRule>) -> Self {
        Self { rules, exclusions }
    }

    /// Compile rule and exclusion strings as they appear in an export profile.
    ///
    /// Fails on the first malformed entry.
    pub fn from_config<R, E>(export: &[R], exclude: &[E]) -> Result<Self, RuleError>
    where
        R: AsRef<str>,
        E: AsRef<str>,
    {
        let rules = export
            .iter()
            .map(|r| ExportRule::parse(r.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let exclusions = exclude
            .iter()
            .map(|e| ExclusionRule::new(e.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rules, exclusions })
    }

    pub fn is_excluded(&self, logical_path: &str) -> bool {
        self.exclusions.iter().any(|e| e.is_match(logical_path))
    }

    /// Target format for a path, or `None` if the path is excluded or no rule matches.
    pub fn matches(&self, logical_path: &str) -> Option<&str> {
        if self.is_excluded(logical_path) {
            return None;
        }

        self.rules
            .iter()
            .find(|r| r.is_match(logical_path))
            .map(|r| r.target_format())
    }

    pub fn rules(&self) -> &[ExportRule] {
        &self.rules
    }

    pub fn exclusions(&self) -> &[ExclusionRule] {
        &self.exclusions
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
