//! Runtime estimation from history

use crate::history::{HistoryStore, RunRecord};

/// Estimate for a test that has never run
pub const DEFAULT_ESTIMATE_MS: f64 = 100.0;

/// Weights for the most recent runs, oldest to newest. Only this many runs
/// contribute to an estimate.
const RECENCY_WEIGHTS: [f64; 8] = [1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0, 34.0];

/// Back-weighted average of a test's past durations.
///
/// `history` is ordered oldest to newest. The newest run always gets the
/// heaviest weight, whatever the number of runs.
pub fn estimate(history: &[RunRecord]) -> f64 {
    estimate_or(history, DEFAULT_ESTIMATE_MS)
}

pub fn estimate_or(history: &[RunRecord], default_ms: f64) -> f64 {
    if history.is_empty() {
        return default_ms;
    }

    let window = history.len().min(RECENCY_WEIGHTS.len());
    let runs = &history[history.len() - window..];
    let weights = &RECENCY_WEIGHTS[RECENCY_WEIGHTS.len() - window..];

    let (weighted, total_weight) = runs
        .iter()
        .zip(weights)
        .fold((0.0, 0.0), |(sum, total), (run, w)| {
            (sum + run.duration_ms * w, total + w)
        });
    weighted / total_weight
}

/// Estimate for a test by its qualified name
pub fn estimate_for(store: &HistoryStore, test: &str, default_ms: f64) -> f64 {
    estimate_or(&store.runs_for(test), default_ms)
}
