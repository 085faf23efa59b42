//! Worker scheduling
//!
//! Estimates each test's runtime from history and packs tests into a fixed
//! number of worker groups so the slowest worker finishes as early as the
//! greedy longest-first heuristic allows.

mod estimator;
mod heap;
mod lpt;

pub use estimator::{estimate, estimate_for, estimate_or, DEFAULT_ESTIMATE_MS};
pub use heap::MinHeap;
pub use lpt::{makespan, plan_jobs, schedule};
