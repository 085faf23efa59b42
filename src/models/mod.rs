//! Data models shared by the registry, executor, scheduler and dispatcher
//!
//! This module contains the plain data structures that cross component and
//! process boundaries.

mod assertions;
mod dispatch;
mod job;
mod options;
mod test_result;

pub use assertions::{AssertionLog, AssertionMetrics, LogBuffer};
pub use dispatch::DispatchResult;
pub use job::{LaunchJob, WorkerGroup};
pub use options::{FailureSpec, TestOptions};
pub use test_result::{
    qualify, CpuTime, FailureKind, RunSummary, TestFailure, TestResult, TestStatus,
};

#[cfg(test)]
pub(crate) use test_result::fixtures;
