//! Spawning worker processes for scheduled groups

use futures::future::join_all;
use std::io;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::models::{DispatchResult, WorkerGroup};
use crate::process::{LineLogger, ProcessError, ProcessSpawner, ResourceUsage, SpawnOptions};

/// Why a worker produced no results
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("worker process failed: {0}")]
    Process(#[from] ProcessError),

    #[error("worker wrote nothing to stdout")]
    EmptyPayload,

    #[error("malformed worker payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

/// Program used to start workers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: String,
    /// Arguments placed before the `run` subcommand
    pub prefix_args: Vec<String>,
    /// Extra flags placed after `run`
    pub run_flags: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
            run_flags: Vec::new(),
        }
    }

    /// Re-invoke the running executable
    pub fn current_exe() -> io::Result<Self> {
        let exe = std::env::current_exe()?;
        Ok(Self::new(exe.to_string_lossy()))
    }

    pub fn with_prefix_args(mut self, args: Vec<String>) -> Self {
        self.prefix_args = args;
        self
    }

    pub fn with_run_flag(mut self, flag: impl Into<String>) -> Self {
        self.run_flags.push(flag.into());
        self
    }
}

/// Command line for one worker group
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerInvocation {
    pub worker: usize,
    pub program: String,
    pub args: Vec<String>,
}

impl WorkerInvocation {
    /// `program [prefix] run --automated --exact [flags] --file F... -- suite:name...`
    pub fn for_group(group: &WorkerGroup, command: &WorkerCommand) -> Self {
        let mut args = command.prefix_args.clone();
        args.extend(["run", "--automated", "--exact"].map(String::from));
        args.extend(command.run_flags.iter().cloned());
        for file in group.files() {
            args.push("--file".to_string());
            args.push(file);
        }
        args.push("--".to_string());
        args.extend(group.specifiers());

        Self {
            worker: group.worker,
            program: command.program.clone(),
            args,
        }
    }
}

/// Settled outcome of one worker
#[derive(Debug)]
pub struct WorkerOutcome {
    pub group: WorkerGroup,
    pub duration_ms: f64,
    pub resources: Option<ResourceUsage>,
    pub result: Result<DispatchResult, DispatchError>,
}

/// Forwards a worker's stderr lines into this process's log
fn worker_logger(worker: usize) -> LineLogger {
    Arc::new(move |line| info!(target: "testfleet::worker", "[worker {}] {}", worker, line))
}

/// Launches worker processes and collects their payloads
pub struct Dispatcher {
    spawner: ProcessSpawner,
    command: WorkerCommand,
}

impl Dispatcher {
    pub fn new(spawner: ProcessSpawner, command: WorkerCommand) -> Self {
        Self { spawner, command }
    }

    /// Run every non-empty group concurrently and wait for all of them
    pub async fn dispatch(&self, groups: &[WorkerGroup]) -> Vec<WorkerOutcome> {
        let active: Vec<&WorkerGroup> = groups.iter().filter(|g| !g.is_empty()).collect();
        info!(
            "Dispatching {} worker(s) via {} (resource sampler: {})",
            active.len(),
            self.command.program,
            self.spawner.sampler_name()
        );

        let start = Instant::now();
        let outcomes = join_all(active.into_iter().map(|group| self.run_group(group))).await;

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        info!(
            "All workers settled in {}ms ({} failed)",
            start.elapsed().as_millis(),
            failed
        );
        outcomes
    }

    async fn run_group(&self, group: &WorkerGroup) -> WorkerOutcome {
        let invocation = WorkerInvocation::for_group(group, &self.command);
        debug!(
            "Worker {}: {} job(s), expected {:.0}ms",
            group.worker,
            group.jobs.len(),
            group.total_expected_runtime_ms
        );

        let worker = group.worker;
        let options = SpawnOptions::new()
            .buffer_stdout()
            .logger(worker_logger(worker));

        let start = Instant::now();
        let spawned = self
            .spawner
            .spawn(&invocation.program, &invocation.args, options)
            .await;
        let wall_ms = start.elapsed().as_secs_f64() * 1000.0;

        let (duration_ms, resources, result) = match spawned {
            Ok(outcome) => {
                let payload = match outcome.stdout.as_deref().and_then(DispatchResult::from_stdout)
                {
                    Some(Ok(payload)) => Ok(payload),
                    Some(Err(e)) => Err(DispatchError::MalformedPayload(e)),
                    None => Err(DispatchError::EmptyPayload),
                };
                (outcome.duration_ms, outcome.resources, payload)
            }
            Err(e) => (wall_ms, None, Err(DispatchError::Process(e))),
        };

        match &result {
            Ok(payload) => debug!(
                "Worker {} (pid {}) reported {} result(s) in {:.0}ms",
                worker,
                payload.pid,
                payload.test_results.len(),
                duration_ms
            ),
            Err(e) => error!("Worker {} failed: {}", worker, e),
        }

        WorkerOutcome {
            group: group.clone(),
            duration_ms,
            resources,
            result,
        }
    }
}
