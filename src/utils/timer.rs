//! Timer utilities
//!
//! Phase timing for a top-level run.

use serde::Serialize;
use std::time::{Duration, Instant};

/// Duration of one named phase
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Lap {
    pub label: String,
    pub ms: f64,
}

/// Stopwatch with lap timing
#[derive(Debug)]
pub struct Stopwatch {
    start: Instant,
    laps: Vec<(String, Duration)>,
}

impl Stopwatch {
    /// Create a new stopwatch
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            laps: Vec::new(),
        }
    }

    /// Record a lap
    pub fn lap(&mut self, label: impl Into<String>) {
        let label = label.into();
        let elapsed = self.start.elapsed();
        tracing::debug!("{} done at {}ms", label, elapsed.as_millis());
        self.laps.push((label, elapsed));
    }

    /// Get total elapsed time
    pub fn total(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get lap times (duration of each lap, not cumulative)
    pub fn lap_times(&self) -> Vec<Lap> {
        let mut result = Vec::with_capacity(self.laps.len());
        let mut prev = Duration::ZERO;

        for (label, cumulative) in &self.laps {
            let lap = *cumulative - prev;
            result.push(Lap {
                label: label.clone(),
                ms: lap.as_secs_f64() * 1000.0,
            });
            prev = *cumulative;
        }

        result
    }

    /// Format laps as string
    pub fn format(&self) -> String {
        let mut output = String::new();
        for lap in self.lap_times() {
            output.push_str(&format!("{}: {:.0}ms\n", lap.label, lap.ms));
        }
        output.push_str(&format!("Total: {}ms", self.total().as_millis()));
        output
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}
