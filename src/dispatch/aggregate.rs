//! Flattening worker outcomes into one result set

use serde::Serialize;

use super::worker::WorkerOutcome;
use crate::models::{RunSummary, TestResult};
use crate::process::ResourceUsage;

/// Diagnostics for one dispatched worker, successful or not
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WorkerMetrics {
    pub worker: usize,
    pub duration_ms: f64,
    pub expected_runtime_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceUsage>,
    /// Specifiers scheduled on this worker
    pub jobs: Vec<String>,
    pub tests_reported: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerMetrics {
    /// Scheduled specifiers this worker did not report a result for
    pub fn missing(&self, results: &[TestResult]) -> Vec<String> {
        self.jobs
            .iter()
            .filter(|spec| !results.iter().any(|r| r.qualified_name() == **spec))
            .cloned()
            .collect()
    }
}

/// All results of a run plus per-worker diagnostics
#[derive(Clone, Debug, Default, Serialize)]
pub struct Aggregated {
    pub results: Vec<TestResult>,
    pub metrics: Vec<WorkerMetrics>,
}

/// Flatten worker outcomes. Results keep each worker's execution order;
/// failed workers add metrics but no results.
pub fn aggregate(outcomes: &[WorkerOutcome]) -> Aggregated {
    let mut results = Vec::new();
    let mut metrics = Vec::with_capacity(outcomes.len());

    for outcome in outcomes {
        let (tests_reported, pid, error) = match &outcome.result {
            Ok(payload) => {
                results.extend(payload.test_results.iter().cloned());
                (payload.test_results.len(), Some(payload.pid), None)
            }
            Err(e) => (0, None, Some(e.to_string())),
        };

        metrics.push(WorkerMetrics {
            worker: outcome.group.worker,
            duration_ms: outcome.duration_ms,
            expected_runtime_ms: outcome.group.total_expected_runtime_ms,
            resources: outcome.resources,
            jobs: outcome.group.specifiers(),
            tests_reported,
            pid,
            error,
        });
    }

    Aggregated { results, metrics }
}

impl Aggregated {
    /// Results of an in-process run, which has no workers
    pub fn in_process(results: Vec<TestResult>) -> Self {
        Self {
            results,
            metrics: Vec::new(),
        }
    }

    /// 1 when any result failed or any worker produced no results, else 0
    pub fn exit_code(&self) -> i32 {
        if self.results.iter().any(|r| !r.passed()) || self.failed_workers().next().is_some() {
            1
        } else {
            0
        }
    }

    pub fn first_failure(&self) -> Option<&TestResult> {
        self.results.iter().find(|r| !r.passed())
    }

    pub fn failed_workers(&self) -> impl Iterator<Item = &WorkerMetrics> {
        self.metrics.iter().filter(|m| m.error.is_some())
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::new(&self.results)
    }
}
