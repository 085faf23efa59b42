//! Scheduling units
//!
//! A launch job is one test with its runtime estimate; a worker group is the
//! set of jobs assigned to one worker process.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::test_result::qualify;

/// One test to launch, with its estimated runtime
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LaunchJob {
    pub test_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
    pub file: String,
    pub test_time_estimate_ms: f64,
}

impl LaunchJob {
    pub fn new(
        test_name: impl Into<String>,
        suite: Option<String>,
        file: impl Into<String>,
        test_time_estimate_ms: f64,
    ) -> Self {
        Self {
            test_name: test_name.into(),
            suite,
            file: file.into(),
            test_time_estimate_ms,
        }
    }

    /// `suite:name` specifier selecting exactly this test
    pub fn specifier(&self) -> String {
        qualify(self.suite.as_deref(), &self.test_name)
    }
}

impl fmt::Display for LaunchJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (~{:.0}ms)",
            self.specifier(),
            self.test_time_estimate_ms
        )
    }
}

/// Jobs assigned to one worker
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerGroup {
    /// Index of the worker this group belongs to
    pub worker: usize,
    pub total_expected_runtime_ms: f64,
    pub jobs: Vec<LaunchJob>,
}

impl WorkerGroup {
    pub fn new(worker: usize) -> Self {
        Self {
            worker,
            total_expected_runtime_ms: 0.0,
            jobs: Vec::new(),
        }
    }

    pub fn assign(&mut self, job: LaunchJob) {
        self.total_expected_runtime_ms += job.test_time_estimate_ms;
        self.jobs.push(job);
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Distinct source files owning this group's jobs, in first-seen order
    pub fn files(&self) -> Vec<String> {
        let mut files: Vec<String> = Vec::new();
        for job in &self.jobs {
            if !files.contains(&job.file) {
                files.push(job.file.clone());
            }
        }
        files
    }

    pub fn specifiers(&self) -> Vec<String> {
        self.jobs.iter().map(LaunchJob::specifier).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specifier() {
        let job = LaunchJob::new("adds", Some("math".into()), "src/a.rs", 10.0);
        assert_eq!(job.specifier(), "math:adds");
        let bare = LaunchJob::new("adds", None, "src/a.rs", 10.0);
        assert_eq!(bare.specifier(), "adds");
    }

    #[test]
    fn test_group_accumulates() {
        let mut group = WorkerGroup::new(0);
        group.assign(LaunchJob::new("a", None, "src/a.rs", 10.0));
        group.assign(LaunchJob::new("b", None, "src/b.rs", 5.0));
        group.assign(LaunchJob::new("c", None, "src/a.rs", 1.0));

        assert_eq!(group.total_expected_runtime_ms, 16.0);
        assert_eq!(group.files(), vec!["src/a.rs", "src/b.rs"]);
        assert_eq!(group.specifiers(), vec!["a", "b", "c"]);
    }
}
