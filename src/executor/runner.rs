//! In-process test runner
//!
//! Executes a selection of registered tests inside the current process, either
//! strictly one after another or, opt-in, with asynchronous tests overlapped.
//! Worker processes use [`TestRunner::run_worker`] to produce their protocol
//! payload.

use futures::future::join_all;
use std::time::Instant;
use tracing::{info, warn};

use super::state_machine::{execute, ExecutorConfig};
use crate::models::{DispatchResult, RunSummary, TestResult};
use crate::registry::{RegisteredTest, Registry, Selection};

/// How tests within one process are launched
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LaunchMode {
    /// One test at a time in registry order
    #[default]
    Sequential,
    /// Synchronous tests first, then every asynchronous test started at once
    /// and joined together. Per-test durations overlap and are not
    /// meaningful in this mode.
    AsyncParallel,
}

/// Runs registered tests in this process
pub struct TestRunner<'a> {
    registry: &'a Registry,
    config: ExecutorConfig,
    mode: LaunchMode,
}

impl<'a> TestRunner<'a> {
    pub fn new(registry: &'a Registry, config: ExecutorConfig) -> Self {
        Self {
            registry,
            config,
            mode: LaunchMode::Sequential,
        }
    }

    pub fn with_mode(mut self, mode: LaunchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Run a single test
    pub async fn run_test(&self, test: &RegisteredTest) -> TestResult {
        execute(test, &self.config).await
    }

    /// Run every test matching the selection
    pub async fn run(&self, selection: &Selection) -> Vec<TestResult> {
        let tests = self.registry.discover(selection);
        info!("Running {} tests in-process ({:?})", tests.len(), self.mode);

        let start = Instant::now();
        let results = match self.mode {
            LaunchMode::Sequential => self.run_sequential(&tests).await,
            LaunchMode::AsyncParallel => self.run_async_parallel(&tests).await,
        };

        let summary = RunSummary::new(&results);
        info!(
            "In-process run completed in {}ms - Pass: {}/{} ({:.1}%)",
            start.elapsed().as_millis(),
            summary.passed,
            summary.total,
            summary.pass_rate()
        );

        results
    }

    pub async fn run_sequential(&self, tests: &[&RegisteredTest]) -> Vec<TestResult> {
        let mut results = Vec::with_capacity(tests.len());
        for test in tests {
            results.push(self.run_test(test).await);
        }
        results
    }

    pub async fn run_async_parallel(&self, tests: &[&RegisteredTest]) -> Vec<TestResult> {
        warn!("Async-parallel launch: per-test timings overlap and are unreliable");

        let (async_tests, sync_tests): (Vec<&RegisteredTest>, Vec<&RegisteredTest>) =
            tests.iter().copied().partition(|t| t.body.is_async());

        let mut results = self.run_sequential(&sync_tests).await;
        let launched = async_tests.iter().map(|test| self.run_test(test));
        results.extend(join_all(launched).await);
        results
    }

    /// Leaf mode of a dispatched worker: run only the selection and report
    pub async fn run_worker(&self, selection: &Selection) -> DispatchResult {
        let discovery = Instant::now();
        let tests = self.registry.discover(selection);
        let file_discovery_duration_ms = discovery.elapsed().as_secs_f64() * 1000.0;

        if tests.len() < selection.specifiers.len() {
            warn!(
                "Worker matched {} tests for {} specifiers",
                tests.len(),
                selection.specifiers.len()
            );
        }

        let execution = Instant::now();
        let test_results = match self.mode {
            LaunchMode::Sequential => self.run_sequential(&tests).await,
            LaunchMode::AsyncParallel => self.run_async_parallel(&tests).await,
        };
        let test_execution_duration_ms = execution.elapsed().as_secs_f64() * 1000.0;

        DispatchResult {
            tests_selected: tests.len(),
            test_results,
            test_execution_duration_ms,
            file_discovery_duration_ms,
            pid: std::process::id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessSpawner;
    use crate::registry::TestDef;
    use std::time::Duration;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                TestDef::asynchronous("slow", |t| async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    t.assert().ok(true, "slow")?;
                    Ok(())
                })
                .suite("timing")
                .file("src/suites/timing.rs"),
            )
            .unwrap();
        registry
            .register(
                TestDef::sync("quick", |t| {
                    t.assert().eq(1, 1)?;
                    Ok(())
                })
                .suite("timing")
                .file("src/suites/timing.rs"),
            )
            .unwrap();
        registry
            .register(
                TestDef::asynchronous("also_slow", |t| async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    t.assert().ok(true, "also slow")?;
                    Ok(())
                })
                .suite("timing")
                .file("src/suites/timing.rs"),
            )
            .unwrap();
        registry
    }

    fn runner(registry: &Registry) -> TestRunner<'_> {
        TestRunner::new(registry, ExecutorConfig::new(ProcessSpawner::unsampled()))
    }

    fn names(results: &[TestResult]) -> Vec<String> {
        results.iter().map(|r| r.qualified_name()).collect()
    }

    #[tokio::test]
    async fn test_sequential_preserves_registry_order() {
        let registry = registry();
        let results = runner(&registry).run(&Selection::all()).await;
        assert_eq!(
            names(&results),
            vec!["timing:slow", "timing:quick", "timing:also_slow"]
        );
        assert!(results.iter().all(|r| r.passed()));
    }

    #[tokio::test]
    async fn test_async_parallel_runs_sync_first() {
        let registry = registry();
        let start = Instant::now();
        let results = runner(&registry)
            .with_mode(LaunchMode::AsyncParallel)
            .run(&Selection::all())
            .await;

        assert_eq!(
            names(&results),
            vec!["timing:quick", "timing:slow", "timing:also_slow"]
        );
        // both sleeps overlap
        assert!(start.elapsed() < Duration::from_millis(95));
    }

    #[tokio::test]
    async fn test_worker_payload() {
        let registry = registry();
        let selection = Selection::exact(vec!["timing:quick".into()])
            .with_files(vec!["src/suites/timing.rs".into()]);
        let payload = runner(&registry).run_worker(&selection).await;

        assert_eq!(payload.tests_selected, 1);
        assert_eq!(names(&payload.test_results), vec!["timing:quick"]);
        assert_eq!(payload.pid, std::process::id());
        assert!(payload.to_line().is_ok());
    }
}
