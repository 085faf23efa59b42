//! Test result models
//!
//! Defines the record produced once per executed test, its failure shape
//! and the status summary types.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::assertions::AssertionMetrics;
use super::options::TestOptions;
use crate::process::ResourceUsage;

/// Why a test failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A wrapped assertion did not hold
    Assertion,
    /// The body returned an error
    Thrown,
    /// The body panicked
    Panic,
    /// The body finished without asserting anything
    NoAssertions,
    /// The number of assertion calls differed from the declared count
    AssertionCount,
    /// A failure was declared but the body completed normally
    ExpectedFailureMissing,
    /// The body failed, but not in the declared way
    IncompatibleFailure,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Assertion => "assertion",
            FailureKind::Thrown => "error",
            FailureKind::Panic => "panic",
            FailureKind::NoAssertions => "no assertions",
            FailureKind::AssertionCount => "assertion count",
            FailureKind::ExpectedFailureMissing => "expected failure missing",
            FailureKind::IncompatibleFailure => "incompatible failure",
        };
        write!(f, "{s}")
    }
}

/// Recorded failure of a test
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Causes below the top-level message, outermost first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl TestFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            causes: Vec::new(),
        }
    }

    pub fn from_error(kind: FailureKind, error: &anyhow::Error) -> Self {
        Self {
            kind,
            message: error.to_string(),
            causes: error.chain().skip(1).map(|c| c.to_string()).collect(),
        }
    }
}

impl fmt::Display for TestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        for cause in &self.causes {
            write!(f, "\n  caused by: {cause}")?;
        }
        Ok(())
    }
}

/// CPU time consumed during a test, in milliseconds
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuTime {
    pub user: f64,
    pub system: f64,
}

impl CpuTime {
    pub fn overall(&self) -> f64 {
        self.user + self.system
    }

    pub fn since(&self, baseline: &CpuTime) -> CpuTime {
        CpuTime {
            user: (self.user - baseline.user).max(0.0),
            system: (self.system - baseline.system).max(0.0),
        }
    }
}

/// Test execution status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
}

impl TestStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Pass => "✓",
            TestStatus::Fail => "✗",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestStatus::Pass)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Pass => write!(f, "PASS"),
            TestStatus::Fail => write!(f, "FAIL"),
        }
    }
}

/// Result of a single test execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
    pub file: String,
    pub duration_ms: f64,
    pub cpu: CpuTime,
    pub logs: Vec<String>,
    pub assertion_metrics: AssertionMetrics,
    pub resource_metrics: Vec<ResourceUsage>,
    pub embeds: Vec<String>,
    pub failure: Option<TestFailure>,
    #[serde(flatten)]
    pub options: TestOptions,
}

impl TestResult {
    /// `suite:name`, or the bare name for suite-less tests
    pub fn qualified_name(&self) -> String {
        qualify(self.suite.as_deref(), &self.name)
    }

    pub fn status(&self) -> TestStatus {
        if self.failure.is_some() {
            TestStatus::Fail
        } else {
            TestStatus::Pass
        }
    }

    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{:.0}ms]",
            self.status().symbol(),
            self.qualified_name(),
            self.duration_ms
        )?;
        if let Some(failure) = &self.failure {
            write!(f, " - {}", failure.message)?;
        }
        Ok(())
    }
}

/// Join an optional suite and a test name into a specifier
pub fn qualify(suite: Option<&str>, name: &str) -> String {
    match suite {
        Some(suite) => format!("{suite}:{name}"),
        None => name.to_string(),
    }
}

/// Summary of a set of test results
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub total_duration_ms: f64,
}

impl RunSummary {
    pub fn new(results: &[TestResult]) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed()).count();
        let total_duration_ms = results.iter().map(|r| r.duration_ms).sum();

        Self {
            total,
            passed,
            failed: total - passed,
            total_duration_ms,
        }
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.passed as f64 / self.total as f64) * 100.0
        }
    }

    pub fn is_all_passed(&self) -> bool {
        self.passed == self.total
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Pass Rate: {:.1}% | Test time: {:.0}ms",
            self.total,
            self.passed,
            self.failed,
            self.pass_rate(),
            self.total_duration_ms
        )
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::result;
    use super::*;

    #[test]
    fn test_qualified_name() {
        assert_eq!(result(Some("math"), "adds", None).qualified_name(), "math:adds");
        assert_eq!(result(None, "adds", None).qualified_name(), "adds");
    }

    #[test]
    fn test_status() {
        let passed = result(None, "a", None);
        let failed = result(
            None,
            "b",
            Some(TestFailure::new(FailureKind::Thrown, "boom")),
        );
        assert!(passed.status().is_success());
        assert_eq!(failed.status(), TestStatus::Fail);
    }

    #[test]
    fn test_failure_from_error_chain() {
        let err = anyhow::anyhow!("disk full").context("writing snapshot");
        let failure = TestFailure::from_error(FailureKind::Thrown, &err);
        assert_eq!(failure.message, "writing snapshot");
        assert_eq!(failure.causes, vec!["disk full".to_string()]);
    }

    #[test]
    fn test_summary() {
        let results = vec![
            result(None, "a", None),
            result(None, "b", Some(TestFailure::new(FailureKind::Assertion, "x"))),
            result(None, "c", None),
        ];
        let summary = RunSummary::new(&results);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert!(!summary.is_all_passed());
    }

    #[test]
    fn test_result_json_flattens_options() {
        let mut r = result(Some("s"), "t", None);
        r.options.assertion_count = Some(2);
        let value = serde_json::to_value(&r).unwrap();
        assert_eq!(value["assertion_count"], 2);
        assert!(value["failure"].is_null());

        let back: TestResult = serde_json::from_value(value).unwrap();
        assert_eq!(back.options.assertion_count, Some(2));
    }
}
