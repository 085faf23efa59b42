//! Historical runtime storage
//!
//! A single JSON document maps `suite:name` to run-id to the run's timing.
//! Run ids are RFC 3339 UTC timestamps, so lexical order is creation order.
//! Entries older than the retention window are dropped every time the
//! document is loaded.
//!
//! The file is not locked. Two top-level runs finishing at the same time can
//! overwrite each other's updates.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::models::TestResult;

/// Default retention window in days
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Longest accepted retention window in days
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// Timing of one test in one launch
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub duration_ms: f64,
    pub cpu_time_overall: f64,
}

type Document = BTreeMap<String, BTreeMap<String, RunRecord>>;

/// Run id for a launch started at `at`
pub fn run_id_for(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_run_id(run_id: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(run_id)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Historical runtimes, loaded from and saved to one JSON file
#[derive(Clone, Debug)]
pub struct HistoryStore {
    path: PathBuf,
    entries: Document,
}

impl HistoryStore {
    /// Empty store that will save to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Document::new(),
        }
    }

    /// Default location under the user's data directory
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("testfleet")
            .join("history.json")
    }

    /// Load the store, pruning runs older than `retention` relative to `now`.
    ///
    /// A missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>, retention: Duration, now: DateTime<Utc>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            debug!("No history at {}, starting empty", path.display());
            return Ok(Self::new(path));
        }

        let file = File::open(&path)
            .with_context(|| format!("Failed to open history file: {}", path.display()))?;
        let entries: Document = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse history file: {}", path.display()))?;

        // A window reaching before the earliest representable time keeps everything
        let cutoff = now
            .checked_sub_signed(retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut store = Self { path, entries };
        let pruned = store.prune(cutoff);
        debug!(
            "Loaded history for {} tests from {} ({} stale runs pruned)",
            store.entries.len(),
            store.path.display(),
            pruned
        );
        Ok(store)
    }

    /// Load keeping `retention_days` of runs, relative to the current time
    pub fn open(path: impl Into<PathBuf>, retention_days: i64) -> Result<Self> {
        if !(1..=MAX_RETENTION_DAYS).contains(&retention_days) {
            bail!(
                "Retention must be between 1 and {} days, got {}",
                MAX_RETENTION_DAYS,
                retention_days
            );
        }
        let retention = Duration::try_days(retention_days)
            .with_context(|| format!("Retention of {retention_days} days is out of range"))?;
        Self::load(path, retention, Utc::now())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
        }

        let file = File::create(&self.path)
            .with_context(|| format!("Failed to create history file: {}", self.path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.entries)
            .context("Failed to write history")?;

        info!("Saved runtime history to {}", self.path.display());
        Ok(())
    }

    /// Drop runs created before `cutoff`; returns how many were dropped.
    ///
    /// Run ids that are not timestamps cannot be aged and are dropped too.
    pub fn prune(&mut self, cutoff: DateTime<Utc>) -> usize {
        let mut pruned = 0;
        for runs in self.entries.values_mut() {
            let before = runs.len();
            runs.retain(|run_id, _| parse_run_id(run_id).is_some_and(|t| t >= cutoff));
            pruned += before - runs.len();
        }
        self.entries.retain(|_, runs| !runs.is_empty());
        pruned
    }

    pub fn record(&mut self, test: impl Into<String>, run_id: &str, record: RunRecord) {
        self.entries
            .entry(test.into())
            .or_default()
            .insert(run_id.to_string(), record);
    }

    /// Record every result of one launch
    pub fn record_results(&mut self, results: &[TestResult], run_id: &str) {
        for result in results {
            self.record(
                result.qualified_name(),
                run_id,
                RunRecord {
                    duration_ms: result.duration_ms,
                    cpu_time_overall: result.cpu.overall(),
                },
            );
        }
    }

    /// Runs for one test, oldest first
    pub fn runs_for(&self, test: &str) -> Vec<RunRecord> {
        self.entries
            .get(test)
            .map(|runs| runs.values().copied().collect())
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of tests with history
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Test names with their run counts
    pub fn tests(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(name, runs)| (name.as_str(), runs.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::result;
    use tempfile::TempDir;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn record(ms: f64) -> RunRecord {
        RunRecord {
            duration_ms: ms,
            cpu_time_overall: ms / 2.0,
        }
    }

    #[test]
    fn test_run_ids_sort_by_time() {
        let earlier = run_id_for(at("2026-01-02T03:04:05.006Z"));
        let later = run_id_for(at("2026-01-10T00:00:00Z"));
        assert_eq!(earlier, "2026-01-02T03:04:05.006Z");
        assert!(earlier < later);
    }

    #[test]
    fn test_runs_ordered_oldest_first() {
        let mut store = HistoryStore::new("unused.json");
        store.record("s:t", "2026-01-03T00:00:00.000Z", record(30.0));
        store.record("s:t", "2026-01-01T00:00:00.000Z", record(10.0));
        store.record("s:t", "2026-01-02T00:00:00.000Z", record(20.0));

        let durations: Vec<f64> = store.runs_for("s:t").iter().map(|r| r.duration_ms).collect();
        assert_eq!(durations, vec![10.0, 20.0, 30.0]);
        assert!(store.runs_for("missing").is_empty());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::open(dir.path().join("nope.json"), 7).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_load_prunes_old_runs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("history.json");

        let mut store = HistoryStore::new(&path);
        store.record("a", "2026-01-01T00:00:00.000Z", record(1.0));
        store.record("a", "2026-01-09T00:00:00.000Z", record(2.0));
        store.record("b", "2026-01-02T00:00:00.000Z", record(3.0));
        store.record("c", "not-a-timestamp", record(4.0));
        store.save().unwrap();

        let loaded =
            HistoryStore::load(&path, Duration::days(7), at("2026-01-10T00:00:00Z")).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.runs_for("a"), vec![record(2.0)]);
        assert!(loaded.runs_for("b").is_empty());
    }

    #[test]
    fn test_out_of_range_retention_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        assert!(HistoryStore::open(&path, 1_000_000_000_000).is_err());
        assert!(HistoryStore::open(&path, MAX_RETENTION_DAYS + 1).is_err());
        assert!(HistoryStore::open(&path, 0).is_err());
        assert!(HistoryStore::open(&path, MAX_RETENTION_DAYS).is_ok());
    }

    #[test]
    fn test_window_before_earliest_time_keeps_everything() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let mut store = HistoryStore::new(&path);
        store.record("a", "1970-01-01T00:00:00.000Z", record(1.0));
        store.save().unwrap();

        let loaded = HistoryStore::load(
            &path,
            Duration::days(100_000_000_000),
            at("2026-01-10T00:00:00Z"),
        )
        .unwrap();
        assert_eq!(loaded.runs_for("a"), vec![record(1.0)]);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(HistoryStore::open(&path, 7).is_err());
    }

    #[test]
    fn test_record_results() {
        let mut store = HistoryStore::new("unused.json");
        let mut r = result(Some("math"), "adds", None);
        r.duration_ms = 42.0;
        r.cpu.user = 3.0;
        r.cpu.system = 1.0;
        store.record_results(&[r], "2026-01-01T00:00:00.000Z");

        assert_eq!(
            store.runs_for("math:adds"),
            vec![RunRecord {
                duration_ms: 42.0,
                cpu_time_overall: 4.0
            }]
        );
        assert_eq!(store.tests().collect::<Vec<_>>(), vec![("math:adds", 1)]);
    }
}
