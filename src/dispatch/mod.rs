//! Worker dispatch and result aggregation
//!
//! Each non-empty worker group becomes one child process that re-enters this
//! binary in automated mode. Workers settle independently; a crashed worker
//! leaves a gap in the results instead of failing the run.

mod aggregate;
mod worker;

pub use aggregate::{aggregate, Aggregated, WorkerMetrics};
pub use worker::{DispatchError, Dispatcher, WorkerCommand, WorkerInvocation, WorkerOutcome};
