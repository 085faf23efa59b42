//! Historical runtime records
//!
//! Persists per-test durations across launches so the scheduler can estimate
//! how long each test will take.

mod store;

pub use store::{run_id_for, HistoryStore, RunRecord, DEFAULT_RETENTION_DAYS, MAX_RETENTION_DAYS};
