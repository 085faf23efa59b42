//! Handle passed to a running test
//!
//! Everything a test body can touch goes through [`TestContext`]: its log,
//! its options, wrapped assertions, traced subprocesses, HTML embeds and
//! cleanup handlers.

use futures::future::BoxFuture;
use regex::Regex;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::info;

use crate::models::{AssertionLog, AssertionMetrics, TestOptions};
use crate::process::{
    LineLogger, ProcessError, ProcessSpawner, ResourceUsage, SpawnOptions, SpawnOutcome,
};

/// A wrapped assertion that did not hold
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("assert.{assertion} failed: {message}")]
pub struct AssertionError {
    pub assertion: String,
    pub message: String,
}

pub(crate) type CleanupHandler = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Mutable per-test state
#[derive(Debug, Default)]
pub(crate) struct TestState {
    pub options: TestOptions,
    pub assertion_metrics: AssertionMetrics,
    pub logs: Vec<String>,
    pub resource_metrics: Vec<ResourceUsage>,
    pub embeds: Vec<String>,
}

#[derive(Default)]
pub(crate) struct CleanupHandlers {
    pub on_failure: Vec<CleanupHandler>,
    pub always: Vec<CleanupHandler>,
}

struct ContextInner {
    name: String,
    echo_logs: bool,
    spawner: ProcessSpawner,
    state: Mutex<TestState>,
    cleanup: Mutex<CleanupHandlers>,
}

/// Copy of a test's metrics taken mid-run
#[derive(Clone, Debug, Default)]
pub struct MetricsSnapshot {
    pub logs: Vec<String>,
    pub assertion_metrics: AssertionMetrics,
    pub resource_metrics: Vec<ResourceUsage>,
    pub embeds: Vec<String>,
}

/// Shared handle to the running test
#[derive(Clone)]
pub struct TestContext {
    inner: Arc<ContextInner>,
}

impl TestContext {
    pub(crate) fn new(name: impl Into<String>, echo_logs: bool, spawner: ProcessSpawner) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                name: name.into(),
                echo_logs,
                spawner,
                state: Mutex::new(TestState::default()),
                cleanup: Mutex::new(CleanupHandlers::default()),
            }),
        }
    }

    /// Qualified name of the running test
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    // A panicking test body must not make its own results unreadable
    pub(crate) fn state(&self) -> MutexGuard<'_, TestState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cleanup(&self) -> MutexGuard<'_, CleanupHandlers> {
        self.inner.cleanup.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a timestamped line to the test log
    pub fn log(&self, message: impl Display) {
        let line = format!("[{}] {}", chrono::Utc::now().format("%H:%M:%S%.3f"), message);
        if self.inner.echo_logs {
            info!(target: "testfleet::test_log", "{}: {}", self.inner.name, message);
        }
        self.state().logs.push(line);
    }

    /// Adjust the test's options.
    ///
    /// Setting `ring_buffer_limit_assertion_logs` converts every assertion log
    /// collected so far into a ring of that capacity.
    pub fn set_options(&self, update: impl FnOnce(&mut TestOptions)) {
        let mut state = self.state();
        let previous = state.options.ring_buffer_limit_assertion_logs;
        update(&mut state.options);

        if let Some(capacity) = state.options.ring_buffer_limit_assertion_logs {
            if previous != Some(capacity) {
                state.assertion_metrics.limit_logs(capacity);
            }
        }
    }

    pub fn options(&self) -> TestOptions {
        self.state().options.clone()
    }

    /// Assertions that are counted and logged
    pub fn assert(&self) -> Assertions<'_> {
        Assertions { ctx: self }
    }

    /// Deep copy of the metrics collected so far
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        let state = self.state();
        MetricsSnapshot {
            logs: state.logs.clone(),
            assertion_metrics: state.assertion_metrics.clone(),
            resource_metrics: state.resource_metrics.clone(),
            embeds: state.embeds.clone(),
        }
    }

    /// Attach an HTML fragment to the test result
    pub fn embed_html(&self, html: impl Into<String>) {
        self.state().embeds.push(html.into());
    }

    /// Spawn a process, logging its output to this test and recording its
    /// resource usage.
    pub async fn spawn(
        &self,
        program: &str,
        args: &[String],
        mut options: SpawnOptions,
    ) -> Result<SpawnOutcome, ProcessError> {
        if options.logger.is_none() {
            let ctx = self.clone();
            let prefix = program.to_string();
            let logger: LineLogger = Arc::new(move |line| ctx.log(format!("[{prefix}] {line}")));
            options.logger = Some(logger);
        }

        let outcome = self.inner.spawner.spawn(program, args, options).await?;
        if let Some(resources) = outcome.resources {
            self.state().resource_metrics.push(resources);
        }
        Ok(outcome)
    }

    /// Run after the test fails by returning an error or panicking
    pub fn on_failure<F, Fut>(&self, handler: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cleanup()
            .on_failure
            .push(Box::new(move || Box::pin(handler())));
    }

    /// Run after the test, whatever the outcome
    pub fn always<F, Fut>(&self, handler: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cleanup().always.push(Box::new(move || Box::pin(handler())));
    }

    pub(crate) fn take_cleanup(&self) -> CleanupHandlers {
        std::mem::take(&mut *self.cleanup())
    }

    pub(crate) fn take_state(&self) -> TestState {
        std::mem::take(&mut *self.state())
    }

    fn record(
        &self,
        assertion: &str,
        args: Vec<String>,
        outcome: Result<(), String>,
    ) -> Result<(), AssertionError> {
        let mut state = self.state();
        let ring_limit = state.options.ring_buffer_limit_assertion_logs;
        let failure = outcome.as_ref().err().cloned();
        state
            .assertion_metrics
            .record(assertion, AssertionLog { args, failure }, ring_limit);

        outcome.map_err(|message| AssertionError {
            assertion: assertion.to_string(),
            message,
        })
    }
}

/// Counted assertion namespace, see [`TestContext::assert`]
pub struct Assertions<'a> {
    ctx: &'a TestContext,
}

impl Assertions<'_> {
    pub fn ok(&self, value: bool, message: impl Into<String>) -> Result<(), AssertionError> {
        let message = message.into();
        let outcome = if value {
            Ok(())
        } else {
            Err(format!("expected true: {message}"))
        };
        self.ctx.record("ok", vec![value.to_string(), message], outcome)
    }

    pub fn eq<A, B>(&self, actual: A, expected: B) -> Result<(), AssertionError>
    where
        A: PartialEq<B> + Debug,
        B: Debug,
    {
        let args = vec![format!("{actual:?}"), format!("{expected:?}")];
        let outcome = if actual == expected {
            Ok(())
        } else {
            Err(format!("{actual:?} != {expected:?}"))
        };
        self.ctx.record("eq", args, outcome)
    }

    pub fn ne<A, B>(&self, actual: A, unexpected: B) -> Result<(), AssertionError>
    where
        A: PartialEq<B> + Debug,
        B: Debug,
    {
        let args = vec![format!("{actual:?}"), format!("{unexpected:?}")];
        let outcome = if actual != unexpected {
            Ok(())
        } else {
            Err(format!("{actual:?} == {unexpected:?}"))
        };
        self.ctx.record("ne", args, outcome)
    }

    pub fn contains(&self, haystack: &str, needle: &str) -> Result<(), AssertionError> {
        let outcome = if haystack.contains(needle) {
            Ok(())
        } else {
            Err(format!("{haystack:?} does not contain {needle:?}"))
        };
        self.ctx
            .record("contains", vec![haystack.to_string(), needle.to_string()], outcome)
    }

    pub fn matches(&self, text: &str, pattern: &Regex) -> Result<(), AssertionError> {
        let outcome = if pattern.is_match(text) {
            Ok(())
        } else {
            Err(format!("{text:?} does not match /{}/", pattern.as_str()))
        };
        self.ctx.record(
            "matches",
            vec![text.to_string(), pattern.as_str().to_string()],
            outcome,
        )
    }

    /// Holds when the closure returns an error
    pub fn throws<T, E, F>(&self, f: F) -> Result<(), AssertionError>
    where
        F: FnOnce() -> Result<T, E>,
        E: Display,
    {
        let (args, outcome) = match f() {
            Err(e) => (vec![e.to_string()], Ok(())),
            Ok(_) => (Vec::new(), Err("expected an error, got Ok".to_string())),
        };
        self.ctx.record("throws", args, outcome)
    }

    /// Always fails
    pub fn fail(&self, message: impl Into<String>) -> Result<(), AssertionError> {
        let message = message.into();
        self.ctx.record("fail", vec![message.clone()], Err(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TestContext {
        TestContext::new("suite:test", false, ProcessSpawner::unsampled())
    }

    #[test]
    fn test_assertions_are_counted() {
        let ctx = ctx();
        ctx.assert().ok(true, "fine").unwrap();
        ctx.assert().eq(1 + 1, 2).unwrap();
        ctx.assert().eq("a", "a").unwrap();
        assert!(ctx.assert().ne(3, 3).is_err());

        let snapshot = ctx.metrics_snapshot();
        assert_eq!(snapshot.assertion_metrics.count("eq"), 2);
        assert_eq!(snapshot.assertion_metrics.count("ok"), 1);
        assert_eq!(snapshot.assertion_metrics.total(), 4);
        assert!(snapshot.assertion_metrics.assertion_failure);
    }

    #[test]
    fn test_failed_assertion_error() {
        let ctx = ctx();
        let err = ctx.assert().eq(1, 2).unwrap_err();
        assert_eq!(err.assertion, "eq");
        assert_eq!(err.to_string(), "assert.eq failed: 1 != 2");
    }

    #[test]
    fn test_contains_matches_throws() {
        let ctx = ctx();
        ctx.assert().contains("hello world", "lo w").unwrap();
        ctx.assert()
            .matches("v1.2.3", &Regex::new(r"^v\d+\.\d+\.\d+$").unwrap())
            .unwrap();
        ctx.assert()
            .throws(|| "x".parse::<u32>())
            .unwrap();
        assert!(ctx.assert().throws(|| "7".parse::<u32>()).is_err());
        assert!(ctx.assert().fail("nope").is_err());
        assert_eq!(ctx.metrics_snapshot().assertion_metrics.total(), 5);
    }

    #[test]
    fn test_ring_limit_mid_test() {
        let ctx = ctx();
        for i in 0..4 {
            ctx.assert().eq(i, i).unwrap();
        }
        ctx.set_options(|o| {
            o.ring_buffer_limit(3);
        });
        for i in 4..9 {
            ctx.assert().eq(i, i).unwrap();
        }

        let metrics = ctx.metrics_snapshot().assertion_metrics;
        assert_eq!(metrics.count("eq"), 9);
        let buffer = &metrics.logs["eq"];
        assert_eq!(buffer.len(), 3);
        let recent: Vec<&str> = buffer
            .ordered()
            .into_iter()
            .map(|l| l.args[0].as_str())
            .collect();
        assert_eq!(recent, vec!["6", "7", "8"]);
    }

    #[test]
    fn test_log_and_embed() {
        let ctx = ctx();
        ctx.log("starting");
        ctx.embed_html("<b>chart</b>");
        let snapshot = ctx.metrics_snapshot();
        assert_eq!(snapshot.logs.len(), 1);
        assert!(snapshot.logs[0].ends_with("] starting"));
        assert_eq!(snapshot.embeds, vec!["<b>chart</b>".to_string()]);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let ctx = ctx();
        ctx.log("one");
        let snapshot = ctx.metrics_snapshot();
        ctx.log("two");
        assert_eq!(snapshot.logs.len(), 1);
        assert_eq!(ctx.metrics_snapshot().logs.len(), 2);
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_traced_spawn_logs_output() {
        let ctx = ctx();
        let outcome = ctx
            .spawn(
                "sh",
                &["-c".to_string(), "echo traced".to_string()],
                SpawnOptions::new().bypass_resource_metrics(),
            )
            .await
            .unwrap();
        assert!(outcome.success());

        let snapshot = ctx.metrics_snapshot();
        assert!(snapshot.logs.iter().any(|l| l.ends_with("[sh] traced")));
        assert!(snapshot.resource_metrics.is_empty());
    }
}
