// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Include/exclude constraints over a single string value
//!
//! Supports:
//! - Exact values: "default"
//! - Regular expressions, anchored to the whole value: "kube-.*"
//! - The wildcard marker "*", which matches anything

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;

/// Wildcard marker that allows any value
const WILDCARD: &str = "*";

/// A single compiled pattern, keeping its source text for display
#[derive(Debug, Clone)]
struct Pattern {
    source: String,
    regex: Option<Regex>,
}

impl Pattern {
    fn compile(source: &str) -> Result<Self, ConfigError> {
        let trimmed = source.trim();
        let regex = if trimmed == WILDCARD {
            None
        } else {
            let regex = Regex::new(&format!("^(?:{})$", trimmed)).map_err(|e| {
                ConfigError::InvalidPattern {
                    pattern: source.to_string(),
                    source: e,
                }
            })?;
            Some(regex)
        };
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    fn matches(&self, value: &str) -> bool {
        match &self.regex {
            Some(re) => re.is_match(value),
            None => true,
        }
    }
}

/// Allow/deny specification over one string attribute of an event
#[derive(Debug, Clone, Default)]
pub struct Constraint {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl Constraint {
    /// Compile a constraint from raw include/exclude patterns
    ///
    /// Blank patterns are ignored.
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self, ConfigError> {
        Ok(Self {
            include: compile_all(include)?,
            exclude: compile_all(exclude)?,
        })
    }

    /// Constraint that only allows the given patterns
    pub fn include<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        Self::new(patterns, &[])
    }

    /// Whether any include or exclude pattern is set
    pub fn is_configured(&self) -> bool {
        !self.include.is_empty() || !self.exclude.is_empty()
    }

    /// Check a value against the constraint
    ///
    /// Excludes win over includes. With no includes, every value that is not
    /// excluded is allowed.
    pub fn is_allowed(&self, value: &str) -> bool {
        if !self.is_configured() {
            return true;
        }
        if self.exclude.iter().any(|p| p.matches(value)) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        self.include.iter().any(|p| p.matches(value))
    }
}

fn compile_all<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Pattern>, ConfigError> {
    let mut compiled = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        let pattern: &str = pattern.as_ref();
        if pattern.trim().is_empty() {
            continue;
        }
        compiled.push(Pattern::compile(pattern)?);
    }
    Ok(compiled)
}

/// On-disk form of a constraint
#[derive(Debug, Default, Serialize, Deserialize)]
struct RawConstraint {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    include: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    exclude: Vec<String>,
}

impl<'de> Deserialize<'de> for Constraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawConstraint::deserialize(deserializer)?;
        Constraint::new(raw.include.as_slice(), raw.exclude.as_slice())
            .map_err(serde::de::Error::custom)
    }
}

impl Serialize for Constraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let sources = |patterns: &[Pattern]| -> Vec<String> {
            patterns.iter().map(|p| p.source.clone()).collect()
        };
        RawConstraint {
            include: sources(&self.include),
            exclude: sources(&self.exclude),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_allows_everything() {
        let c = Constraint::default();
        assert!(!c.is_configured());
        assert!(c.is_allowed(""));
        assert!(c.is_allowed("anything"));
    }

    #[test]
    fn test_blank_patterns_are_ignored() {
        let c = Constraint::new(&["", "  "], &[" "]).unwrap();
        assert!(!c.is_configured());
        assert!(c.is_allowed("x"));
    }

    #[test]
    fn test_exact_include() {
        let c = Constraint::include(&["default"]).unwrap();
        assert!(c.is_configured());
        assert!(c.is_allowed("default"));
        assert!(!c.is_allowed("default-2"));
        assert!(!c.is_allowed("kube-system"));
    }

    #[test]
    fn test_regex_include_is_anchored() {
        let c = Constraint::include(&["web-.*"]).unwrap();
        assert!(c.is_allowed("web-1"));
        assert!(!c.is_allowed("my-web-1"));
    }

    #[test]
    fn test_wildcard_marker() {
        let c = Constraint::include(&["*"]).unwrap();
        assert!(c.is_configured());
        assert!(c.is_allowed(""));
        assert!(c.is_allowed("kube-system"));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let c = Constraint::new(&[".*"], &["kube-.*"]).unwrap();
        assert!(c.is_allowed("default"));
        assert!(!c.is_allowed("kube-system"));
    }

    #[test]
    fn test_exclude_only() {
        let c = Constraint::new::<&str>(&[], &["kube-system"]).unwrap();
        assert!(c.is_allowed("default"));
        assert!(!c.is_allowed("kube-system"));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = Constraint::include(&["web-("]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
        assert!(err.to_string().contains("web-("));
    }

    #[test]
    fn test_deserialize() {
        let c: Constraint =
            serde_yaml::from_str("include: [\"prod-.*\"]\nexclude: [prod-tmp]").unwrap();
        assert!(c.is_allowed("prod-1"));
        assert!(!c.is_allowed("prod-tmp"));
        assert!(!c.is_allowed("dev"));
    }

    #[test]
    fn test_deserialize_rejects_bad_regex() {
        let result: Result<Constraint, _> = serde_yaml::from_str("include: [\"[\"]");
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_keeps_sources() {
        let c = Constraint::new(&["a", "b.*"], &["c"]).unwrap();
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["include"], serde_json::json!(["a", "b.*"]));
        assert_eq!(json["exclude"], serde_json::json!(["c"]));
    }
}
