//! testfleet - history-driven parallel test runner
//!
//! Tests are registered explicitly in a [`registry::Registry`]. A top-level
//! run estimates every selected test's duration from past runs, packs the
//! tests into one group per worker with a longest-first greedy schedule, and
//! re-invokes the executable once per group in automated mode. Each worker
//! runs its tests through the execution state machine and reports a single
//! JSON line, which the parent aggregates into the final report.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod executor;
pub mod history;
pub mod models;
pub mod output;
pub mod process;
pub mod registry;
pub mod scheduler;
pub mod suites;
pub mod utils;
