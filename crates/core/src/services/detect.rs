//! Pattern detection over raw firmware bytes.
//!
//! `PatternDetector` is the seam the pipeline scans through. `RuleScanner` is
//! the built-in implementation: a set of named byte regexes compiled once and
//! injected into the orchestrator.

use std::path::{Path, PathBuf};

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default upper bound on how many bytes a single scan will look at.
pub const DEFAULT_MAX_SCAN_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Rule '{name}' has an invalid pattern: {source}")]
    InvalidRule {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("Failed to read rules from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rules: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Input of {len} bytes exceeds scan limit of {limit} bytes")]
    InputTooLarge { len: usize, limit: usize },
}

/// One pattern hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    pub rule: String,
    pub offset: usize,
    pub matched: Vec<u8>,
}

/// Scans raw bytes for known patterns.
pub trait PatternDetector: Send + Sync {
    fn scan(&self, bytes: &[u8]) -> Result<Vec<PatternMatch>, DetectError>;
}

/// A rule as written in a rule file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    /// Byte regex (`regex::bytes` syntax); `(?-u)` is implied.
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Top-level shape of a rule file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleFile {
    pub rules: Vec<RuleSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_scan_bytes: Option<usize>,
}

impl RuleFile {
    /// Rules shipped with the crate.
    pub fn builtin() -> Self {
        Self {
            rules: vec![
                RuleSpec {
                    name: "AGESA".into(),
                    pattern: r"AGESA![0-9A-Za-z]{0,4}\x00[\x20-\x7E]{4,64}".into(),
                    description: Some("AGESA version banner".into()),
                },
                RuleSpec {
                    name: "Certificates".into(),
                    pattern: r"(?s)\x30\x82..\x30\x82..\xA0\x03\x02\x01\x02".into(),
                    description: Some("DER-encoded X.509 certificate header".into()),
                },
            ],
            max_scan_bytes: None,
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    spec: RuleSpec,
    regex: Regex,
}

/// Detector compiled from a [`RuleFile`].
#[derive(Debug, Clone)]
pub struct RuleScanner {
    rules: Vec<CompiledRule>,
    max_scan_bytes: usize,
}

impl RuleScanner {
    /// Compile every rule; fails on the first invalid pattern.
    pub fn compile(file: RuleFile) -> Result<Self, DetectError> {
        let mut rules = Vec::with_capacity(file.rules.len());
        for spec in file.rules {
            let regex = Regex::new(&format!("(?-u){}", spec.pattern))
                .map_err(|source| DetectError::InvalidRule { name: spec.name.clone(), source })?;
            rules.push(CompiledRule { spec, regex });
        }
        Ok(Self { rules, max_scan_bytes: file.max_scan_bytes.unwrap_or(DEFAULT_MAX_SCAN_BYTES) })
    }

    pub fn builtin() -> Result<Self, DetectError> {
        Self::compile(RuleFile::builtin())
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, DetectError> {
        Self::compile(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, DetectError> {
        let body = std::fs::read_to_string(path)
            .map_err(|source| DetectError::Io { path: path.to_path_buf(), source })?;
        Self::from_yaml_str(&body)
    }

    pub fn rules(&self) -> impl Iterator<Item = &RuleSpec> {
        self.rules.iter().map(|r| &r.spec)
    }
}

impl PatternDetector for RuleScanner {
    fn scan(&self, bytes: &[u8]) -> Result<Vec<PatternMatch>, DetectError> {
        if bytes.len() > self.max_scan_bytes {
            return Err(DetectError::InputTooLarge { len: bytes.len(), limit: self.max_scan_bytes });
        }
        let mut matches = Vec::new();
        for rule in &self.rules {
            for m in rule.regex.find_iter(bytes) {
                debug!(rule = %rule.spec.name, offset = m.start(), "pattern matched");
                matches.push(PatternMatch {
                    rule: rule.spec.name.clone(),
                    offset: m.start(),
                    matched: m.as_bytes().to_vec(),
                });
            }
        }
        matches.sort_by_key(|m| m.offset);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_rules_compile() {
        let scanner = RuleScanner::builtin().expect("compile");
        let names: Vec<_> = scanner.rules().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["AGESA", "Certificates"]);
    }

    #[test]
    fn invalid_pattern_names_the_rule() {
        let err = RuleScanner::from_yaml_str("rules:\n  - name: Broken\n    pattern: '('\n")
            .unwrap_err();
        assert!(err.to_string().contains("Broken"), "unexpected error: {err}");
    }
}
