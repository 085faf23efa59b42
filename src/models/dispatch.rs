//! Worker protocol payload

use serde::{Deserialize, Serialize};

use super::test_result::TestResult;

/// What one worker process reports on its standard output
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DispatchResult {
    pub test_results: Vec<TestResult>,
    pub test_execution_duration_ms: f64,
    pub file_discovery_duration_ms: f64,
    /// Number of tests the worker's selection matched
    pub tests_selected: usize,
    pub pid: u32,
}

impl DispatchResult {
    /// Encode as the single protocol line (no trailing newline)
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode from captured worker stdout.
    ///
    /// The payload is the last non-empty line; anything a misbehaving test
    /// printed before it is ignored.
    pub fn from_stdout(stdout: &str) -> Option<serde_json::Result<Self>> {
        stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line.trim()))
    }
}
