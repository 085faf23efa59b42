//! Single test execution
//!
//! Runs one test body and settles it into a [`TestResult`]. A run moves from
//! pending to running and ends either completed or failed; there is no retry.
//! Implicit checks (assertions made, assertion count, declared failure) can
//! turn a body that returned normally into a failure.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info};

use super::context::{AssertionError, CleanupHandler, TestContext};
use crate::models::{
    AssertionMetrics, CpuTime, FailureKind, FailureSpec, TestFailure, TestOptions, TestResult,
};
use crate::process::{self_cpu_time, ProcessSpawner};
use crate::registry::{RegisteredTest, TestBody};

/// Failures synthesized by the executor itself
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TestError {
    #[error("No assertions were performed. Mark the test exempt_from_asserting or set assertion_count to 0 if that is intended")]
    NoAssertions,

    #[error("Expected {expected} assertion calls but {actual} were made")]
    AssertionCount { expected: u64, actual: u64 },

    #[error("Test was declared to fail with {expected} but completed without error")]
    ExpectedFailureMissing { expected: String },

    #[error("Test failed with {actual:?}, which does not match the declared failure {expected}")]
    IncompatibleFailure { expected: String, actual: String },
}

impl TestError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TestError::NoAssertions => FailureKind::NoAssertions,
            TestError::AssertionCount { .. } => FailureKind::AssertionCount,
            TestError::ExpectedFailureMissing { .. } => FailureKind::ExpectedFailureMissing,
            TestError::IncompatibleFailure { .. } => FailureKind::IncompatibleFailure,
        }
    }

    fn into_failure(self) -> TestFailure {
        TestFailure::new(self.kind(), self.to_string())
    }
}

/// Lifecycle of one test run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Settings shared by every test a runner executes
#[derive(Clone)]
pub struct ExecutorConfig {
    /// Echo test log lines to the diagnostic stream
    pub echo_test_logs: bool,
    pub spawner: ProcessSpawner,
}

impl ExecutorConfig {
    pub fn new(spawner: ProcessSpawner) -> Self {
        Self {
            echo_test_logs: false,
            spawner,
        }
    }

    pub fn echo_test_logs(mut self, echo: bool) -> Self {
        self.echo_test_logs = echo;
        self
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::new(ProcessSpawner::detect())
    }
}

/// How a test body ended abnormally
#[derive(Debug)]
enum Thrown {
    Error(anyhow::Error),
    Panic(String),
}

impl Thrown {
    fn message(&self) -> String {
        match self {
            Thrown::Error(e) => e.to_string(),
            Thrown::Panic(msg) => msg.clone(),
        }
    }

    fn into_failure(self) -> TestFailure {
        match self {
            Thrown::Error(e) => {
                let kind = if e.downcast_ref::<AssertionError>().is_some() {
                    FailureKind::Assertion
                } else {
                    FailureKind::Thrown
                };
                TestFailure::from_error(kind, &e)
            }
            Thrown::Panic(msg) => TestFailure::new(FailureKind::Panic, msg),
        }
    }
}

/// Run one test and produce its result
pub async fn execute(test: &RegisteredTest, config: &ExecutorConfig) -> TestResult {
    let qualified = test.qualified_name();
    let mut state = ExecutionState::Pending;
    debug!("{} {:?}", qualified, state);

    let ctx = TestContext::new(&qualified, config.echo_test_logs, config.spawner.clone());
    let start = Instant::now();
    let cpu_start = self_cpu_time();

    state = ExecutionState::Running;
    debug!("{} {:?}", qualified, state);
    let outcome = run_body(&test.body, &ctx).await;

    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    let cpu = self_cpu_time().since(&cpu_start);

    let cleanup = ctx.take_cleanup();
    let failure = match outcome {
        Ok(()) => {
            let (options, metrics, has_embeds) = {
                let guard = ctx.state();
                (
                    guard.options.clone(),
                    guard.assertion_metrics.clone(),
                    !guard.embeds.is_empty(),
                )
            };
            let failure = check_completed(&options, &metrics, has_embeds).map(TestError::into_failure);
            run_handlers(cleanup.always).await;
            failure
        }
        Err(thrown) => {
            let options = ctx.options();
            let failure = settle_thrown(options.fails.as_ref(), thrown);
            run_handlers(cleanup.on_failure).await;
            run_handlers(cleanup.always).await;
            failure
        }
    };

    state = if failure.is_some() {
        ExecutionState::Failed
    } else {
        ExecutionState::Completed
    };
    match &failure {
        None => info!("PASS {} ({:.0}ms)", qualified, duration_ms),
        Some(f) => error!("FAIL {} ({:.0}ms): {}", qualified, duration_ms, f),
    }
    debug!("{} {:?}", qualified, state);

    let parts = ctx.take_state();
    TestResult {
        name: test.name.clone(),
        suite: test.suite.clone(),
        file: test.file.clone(),
        duration_ms,
        cpu,
        logs: parts.logs,
        assertion_metrics: parts.assertion_metrics,
        resource_metrics: parts.resource_metrics,
        embeds: parts.embeds,
        failure,
        options: parts.options,
    }
}

/// Implicit checks applied to a body that returned normally.
///
/// The first violated check decides the failure.
pub fn check_completed(
    options: &TestOptions,
    metrics: &AssertionMetrics,
    has_embeds: bool,
) -> Option<TestError> {
    let total = metrics.total();

    if !options.exempt_from_asserting
        && !has_embeds
        && options.assertion_count != Some(0)
        && total == 0
    {
        return Some(TestError::NoAssertions);
    }

    if let Some(expected) = options.assertion_count {
        if expected != total {
            return Some(TestError::AssertionCount {
                expected,
                actual: total,
            });
        }
    }

    if let Some(spec) = &options.fails {
        return Some(TestError::ExpectedFailureMissing {
            expected: spec.to_string(),
        });
    }

    None
}

/// Decide the failure for a body that returned an error or panicked
fn settle_thrown(declared: Option<&FailureSpec>, thrown: Thrown) -> Option<TestFailure> {
    match declared {
        None => Some(thrown.into_failure()),
        Some(spec) => {
            let message = thrown.message();
            if spec.is_compatible(&message) {
                debug!("Declared failure {} matched: {}", spec, message);
                None
            } else {
                Some(
                    TestError::IncompatibleFailure {
                        expected: spec.to_string(),
                        actual: message,
                    }
                    .into_failure(),
                )
            }
        }
    }
}

async fn run_body(body: &TestBody, ctx: &TestContext) -> Result<(), Thrown> {
    let result = match body {
        TestBody::Sync(f) => std::panic::catch_unwind(AssertUnwindSafe(|| f(ctx))),
        TestBody::Async(f) => {
            let ctx = ctx.clone();
            AssertUnwindSafe(async move { f(ctx).await })
                .catch_unwind()
                .await
        }
    };

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Thrown::Error(e)),
        Err(payload) => Err(Thrown::Panic(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked with a non-string payload".to_string()
    }
}

async fn run_handlers(handlers: Vec<CleanupHandler>) {
    for handler in handlers {
        handler().await;
    }
}
