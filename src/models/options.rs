//! Per-test execution directives
//!
//! Options are set by the running test itself and read once when the test
//! completes to decide pass/fail.

use regex::Regex;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Directives a test can set on itself while running
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TestOptions {
    /// Skip the "no assertions performed" check
    #[serde(default)]
    pub exempt_from_asserting: bool,

    /// Declares the test is expected to fail, and how
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fails: Option<FailureSpec>,

    /// Exact number of assertion calls the test must make
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion_count: Option<u64>,

    /// Keep only the most recent N log entries per assertion kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ring_buffer_limit_assertion_logs: Option<usize>,

    /// Accepted but not enforced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Accepted but not used for ordering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

impl TestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an expected failure. `false` clears the declaration.
    pub fn fails_with_flag(&mut self, expected: bool) -> &mut Self {
        self.fails = expected.then_some(FailureSpec::Any);
        self
    }

    pub fn fails_with(&mut self, spec: impl Into<FailureSpec>) -> &mut Self {
        self.fails = Some(spec.into());
        self
    }

    pub fn assertion_count(&mut self, count: u64) -> &mut Self {
        self.assertion_count = Some(count);
        self
    }

    pub fn exempt_from_asserting(&mut self) -> &mut Self {
        self.exempt_from_asserting = true;
        self
    }

    pub fn ring_buffer_limit(&mut self, capacity: usize) -> &mut Self {
        self.ring_buffer_limit_assertion_logs = Some(capacity);
        self
    }
}

/// Which thrown errors count as the declared expected failure
#[derive(Clone, Debug)]
pub enum FailureSpec {
    /// Any error is acceptable
    Any,
    /// Error message must contain this text
    Substring(String),
    /// Error message must match this pattern
    Pattern(Regex),
    /// Any member matching is enough
    OneOf(Vec<FailureSpec>),
}

impl FailureSpec {
    /// Build a pattern spec, rejecting invalid regular expressions
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(FailureSpec::Pattern(Regex::new(pattern)?))
    }

    /// Whether an error with this message satisfies the declaration
    pub fn is_compatible(&self, message: &str) -> bool {
        match self {
            FailureSpec::Any => true,
            FailureSpec::Substring(needle) => message.contains(needle.as_str()),
            FailureSpec::Pattern(re) => re.is_match(message),
            FailureSpec::OneOf(specs) => specs.iter().any(|s| s.is_compatible(message)),
        }
    }
}

impl PartialEq for FailureSpec {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FailureSpec::Any, FailureSpec::Any) => true,
            (FailureSpec::Substring(a), FailureSpec::Substring(b)) => a == b,
            (FailureSpec::Pattern(a), FailureSpec::Pattern(b)) => a.as_str() == b.as_str(),
            (FailureSpec::OneOf(a), FailureSpec::OneOf(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for FailureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureSpec::Any => write!(f, "any error"),
            FailureSpec::Substring(s) => write!(f, "{s:?}"),
            FailureSpec::Pattern(re) => write!(f, "/{}/", re.as_str()),
            FailureSpec::OneOf(specs) => {
                write!(f, "one of [")?;
                for (i, spec) in specs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{spec}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for FailureSpec {
    fn from(s: &str) -> Self {
        FailureSpec::Substring(s.to_string())
    }
}

impl From<String> for FailureSpec {
    fn from(s: String) -> Self {
        FailureSpec::Substring(s)
    }
}

impl From<Regex> for FailureSpec {
    fn from(re: Regex) -> Self {
        FailureSpec::Pattern(re)
    }
}

impl From<Vec<FailureSpec>> for FailureSpec {
    fn from(specs: Vec<FailureSpec>) -> Self {
        FailureSpec::OneOf(specs)
    }
}

// Wire form: `true` | "substring" | {"pattern": "..."} | [ ... ]
impl Serialize for FailureSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FailureSpec::Any => serializer.serialize_bool(true),
            FailureSpec::Substring(s) => serializer.serialize_str(s),
            FailureSpec::Pattern(re) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("pattern", re.as_str())?;
                map.end()
            }
            FailureSpec::OneOf(specs) => specs.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for FailureSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Flag(bool),
            Text(String),
            Pattern { pattern: String },
            List(Vec<FailureSpec>),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Flag(true) => Ok(FailureSpec::Any),
            Wire::Flag(false) => Err(de::Error::custom(
                "`false` is not an expected-failure declaration",
            )),
            Wire::Text(s) => Ok(FailureSpec::Substring(s)),
            Wire::Pattern { pattern } => Regex::new(&pattern)
                .map(FailureSpec::Pattern)
                .map_err(de::Error::custom),
            Wire::List(specs) => Ok(FailureSpec::OneOf(specs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_matches_everything() {
        assert!(FailureSpec::Any.is_compatible("anything at all"));
        assert!(FailureSpec::Any.is_compatible(""));
    }

    #[test]
    fn test_substring_match() {
        let spec = FailureSpec::from("xyz");
        assert!(spec.is_compatible("error: xyz happened"));
        assert!(!spec.is_compatible("error: xy z"));
    }

    #[test]
    fn test_anchored_pattern_rejects_prefix() {
        let spec = FailureSpec::pattern("^xyz$").unwrap();
        assert!(!spec.is_compatible("abcxyz"));
        assert!(spec.is_compatible("xyz"));
    }

    #[test]
    fn test_one_of_recurses() {
        let spec = FailureSpec::OneOf(vec![
            FailureSpec::from("timeout"),
            FailureSpec::OneOf(vec![FailureSpec::pattern(r"code \d+").unwrap()]),
        ]);
        assert!(spec.is_compatible("exit code 17"));
        assert!(spec.is_compatible("timeout reached"));
        assert!(!spec.is_compatible("boom"));
        assert!(!FailureSpec::OneOf(Vec::new()).is_compatible("boom"));
    }

    #[test]
    fn test_flag_false_clears_declaration() {
        let mut options = TestOptions::new();
        options.fails_with("boom");
        options.fails_with_flag(false);
        assert!(options.fails.is_none());
        options.fails_with_flag(true);
        assert_eq!(options.fails, Some(FailureSpec::Any));
    }

    #[test]
    fn test_wire_form() {
        let spec = FailureSpec::OneOf(vec![
            FailureSpec::Any,
            FailureSpec::from("boom"),
            FailureSpec::pattern("^x").unwrap(),
        ]);
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(json, r#"[true,"boom",{"pattern":"^x"}]"#);

        let parsed: FailureSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, spec);
        assert!(serde_json::from_str::<FailureSpec>("false").is_err());
    }
}
