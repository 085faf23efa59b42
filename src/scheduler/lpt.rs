//! Longest-processing-time-first assignment of jobs to workers

use tracing::debug;

use super::estimator::estimate_for;
use super::heap::MinHeap;
use crate::history::HistoryStore;
use crate::models::{LaunchJob, WorkerGroup};
use crate::registry::{Registry, Selection};

/// Assign every job to one of `worker_count` groups.
///
/// Jobs are taken longest estimate first (stable for equal estimates) and each
/// goes to the group with the smallest running total. Exactly `worker_count`
/// groups are returned in worker order; some may be empty. A worker count of
/// zero is treated as one.
pub fn schedule(mut jobs: Vec<LaunchJob>, worker_count: usize) -> Vec<WorkerGroup> {
    let worker_count = worker_count.max(1);

    let mut heap = MinHeap::with_capacity(worker_count, |g: &WorkerGroup| {
        g.total_expected_runtime_ms
    });
    for worker in 0..worker_count {
        heap.insert(WorkerGroup::new(worker));
    }

    jobs.sort_by(|a, b| b.test_time_estimate_ms.total_cmp(&a.test_time_estimate_ms));

    for job in jobs {
        let mut group = heap
            .extract_min()
            .expect("worker heap holds worker_count groups between assignments");
        group.assign(job);
        heap.insert(group);
    }

    let mut groups = heap.into_vec();
    groups.sort_by_key(|g| g.worker);

    for group in &groups {
        debug!(
            "Worker {}: {} jobs, ~{:.0}ms",
            group.worker,
            group.jobs.len(),
            group.total_expected_runtime_ms
        );
    }
    groups
}

/// Largest expected total across groups
pub fn makespan(groups: &[WorkerGroup]) -> f64 {
    groups
        .iter()
        .map(|g| g.total_expected_runtime_ms)
        .fold(0.0, f64::max)
}

/// One launch job per selected test, estimated from history
pub fn plan_jobs(
    registry: &Registry,
    selection: &Selection,
    history: &HistoryStore,
    default_estimate_ms: f64,
) -> Vec<LaunchJob> {
    registry
        .discover(selection)
        .into_iter()
        .map(|test| {
            let estimate = estimate_for(history, &test.qualified_name(), default_estimate_ms);
            LaunchJob::new(test.name.clone(), test.suite.clone(), test.file.clone(), estimate)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::RunRecord;
    use crate::registry::TestDef;

    fn jobs(estimates: &[f64]) -> Vec<LaunchJob> {
        estimates
            .iter()
            .enumerate()
            .map(|(i, &ms)| LaunchJob::new(format!("t{i}"), None, "src/t.rs", ms))
            .collect()
    }

    fn totals(groups: &[WorkerGroup]) -> Vec<f64> {
        groups.iter().map(|g| g.total_expected_runtime_ms).collect()
    }

    #[test]
    fn test_textbook_example() {
        let groups = schedule(jobs(&[500.0, 400.0, 300.0, 200.0, 100.0]), 2);
        assert_eq!(totals(&groups), vec![700.0, 800.0]);
        assert_eq!(groups[0].specifiers(), vec!["t0", "t3"]);
        assert_eq!(groups[1].specifiers(), vec!["t1", "t2", "t4"]);
        assert_eq!(makespan(&groups), 800.0);
    }

    #[test]
    fn test_more_workers_than_jobs() {
        let groups = schedule(jobs(&[10.0, 20.0]), 4);
        assert_eq!(groups.len(), 4);
        assert_eq!(groups.iter().filter(|g| g.is_empty()).count(), 2);
        assert_eq!(groups.iter().map(|g| g.worker).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_zero_workers_clamped() {
        let groups = schedule(jobs(&[1.0, 2.0, 3.0]), 0);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].jobs.len(), 3);
    }

    #[test]
    fn test_empty_jobs() {
        let groups = schedule(Vec::new(), 3);
        assert_eq!(groups.len(), 3);
        assert!(groups.iter().all(WorkerGroup::is_empty));
        assert_eq!(makespan(&groups), 0.0);
    }

    #[test]
    fn test_equal_estimates_keep_relative_order() {
        let groups = schedule(jobs(&[10.0, 10.0, 10.0, 10.0]), 2);
        assert_eq!(groups[0].specifiers(), vec!["t0", "t2"]);
        assert_eq!(groups[1].specifiers(), vec!["t1", "t3"]);

        let single = schedule(jobs(&[5.0, 5.0, 9.0, 5.0]), 1);
        assert_eq!(single[0].specifiers(), vec!["t2", "t0", "t1", "t3"]);
    }

    fn pseudo_random(seed: &mut u64) -> u64 {
        *seed ^= *seed << 13;
        *seed ^= *seed >> 7;
        *seed ^= *seed << 17;
        *seed
    }

    fn optimal_makespan(estimates: &[f64], workers: usize) -> f64 {
        let mut best = f64::INFINITY;
        let assignments = workers.pow(estimates.len() as u32);
        for mut code in 0..assignments {
            let mut loads = vec![0.0; workers];
            for &e in estimates {
                loads[code % workers] += e;
                code /= workers;
            }
            best = best.min(loads.into_iter().fold(0.0, f64::max));
        }
        best
    }

    #[test]
    fn test_conservation_and_lpt_bound() {
        let mut seed = 0x9E37_79B9_7F4A_7C15u64;
        for _ in 0..200 {
            let n = 1 + (pseudo_random(&mut seed) % 7) as usize;
            let workers = 1 + (pseudo_random(&mut seed) % 3) as usize;
            let estimates: Vec<f64> = (0..n)
                .map(|_| (1 + pseudo_random(&mut seed) % 500) as f64)
                .collect();

            let groups = schedule(jobs(&estimates), workers);
            assert_eq!(groups.len(), workers);

            let mut seen: Vec<String> = groups.iter().flat_map(|g| g.specifiers()).collect();
            seen.sort();
            let mut expected: Vec<String> = (0..n).map(|i| format!("t{i}")).collect();
            expected.sort();
            assert_eq!(seen, expected);

            let total: f64 = totals(&groups).iter().sum();
            assert!((total - estimates.iter().sum::<f64>()).abs() < 1e-6);

            let bound = (2.0 - 1.0 / workers as f64) * optimal_makespan(&estimates, workers);
            assert!(makespan(&groups) <= bound + 1e-6);
        }
    }

    #[test]
    fn test_plan_jobs_uses_history() {
        let mut registry = Registry::new();
        registry
            .register(TestDef::sync("known", |_| Ok(())).suite("s").file("src/s.rs"))
            .unwrap();
        registry
            .register(TestDef::sync("new", |_| Ok(())).suite("s").file("src/s.rs"))
            .unwrap();

        let mut history = HistoryStore::new("unused.json");
        history.record(
            "s:known",
            "2026-01-01T00:00:00.000Z",
            RunRecord {
                duration_ms: 900.0,
                cpu_time_overall: 10.0,
            },
        );

        let planned = plan_jobs(&registry, &Selection::all(), &history, 100.0);
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].test_time_estimate_ms, 900.0);
        assert_eq!(planned[1].test_time_estimate_ms, 100.0);
        assert_eq!(planned[1].specifier(), "s:new");
    }
}
