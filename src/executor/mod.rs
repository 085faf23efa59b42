//! Test execution engine
//!
//! Provides the per-test state machine, the context handed to test bodies,
//! and the in-process runner used both directly and by worker processes.

mod context;
mod runner;
mod state_machine;

pub use context::{AssertionError, Assertions, MetricsSnapshot, TestContext};
pub use runner::{LaunchMode, TestRunner};
pub use state_machine::{check_completed, execute, ExecutionState, ExecutorConfig, TestError};
