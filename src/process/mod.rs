//! Child process invocation
//!
//! Spawns a command, pipes its output to a line logger (or captures stdout),
//! optionally samples its resource usage, and reports the outcome as a
//! single struct whose optional fields are present only when requested.

mod resources;

pub use resources::{
    detect_sampler, parse_time_report, self_cpu_time, NullSampler, ResourceSampler,
    ResourceUsage, SampledCommand, TimeWrapperSampler,
};

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::debug;

/// Number of trailing stderr lines kept for error reports
const STDERR_TAIL_LINES: usize = 20;

/// Receives child output one line at a time
pub type LineLogger = Arc<dyn Fn(&str) + Send + Sync>;

/// Process invocation errors
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {}{}", describe_exit(.code, .signal), tail_suffix(.stderr_tail))]
    Exit {
        program: String,
        code: Option<i32>,
        signal: Option<i32>,
        stderr_tail: Vec<String>,
    },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

fn describe_exit(code: &Option<i32>, signal: &Option<i32>) -> String {
    match (*code, *signal) {
        (Some(code), _) => format!("code {code}"),
        (None, Some(signal)) => format!("signal {signal}"),
        (None, None) => "unknown status".to_string(),
    }
}

fn tail_suffix(tail: &[String]) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!("\n{}", tail.join("\n"))
    }
}

/// How to run a child process
#[derive(Default)]
pub struct SpawnOptions {
    /// Capture stdout into the outcome instead of forwarding it to the logger
    pub buffer_stdout: bool,
    /// Skip resource sampling and its launch overhead
    pub bypass_resource_metrics: bool,
    /// Report non-zero exits as outcomes rather than errors
    pub do_not_reject_on_fail: bool,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Firing this kills the child. Killable spawns are not resource-sampled,
    /// since killing a wrapper would orphan the real command.
    pub kill_switch: Option<oneshot::Receiver<()>>,
    pub logger: Option<LineLogger>,
}

impl SpawnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer_stdout(mut self) -> Self {
        self.buffer_stdout = true;
        self
    }

    pub fn bypass_resource_metrics(mut self) -> Self {
        self.bypass_resource_metrics = true;
        self
    }

    pub fn do_not_reject_on_fail(mut self) -> Self {
        self.do_not_reject_on_fail = true;
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Returns the sender that kills the child when fired
    pub fn killable(&mut self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.kill_switch = Some(rx);
        tx
    }

    pub fn logger(mut self, logger: LineLogger) -> Self {
        self.logger = Some(logger);
        self
    }
}

/// Outcome of a finished child process
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpawnOutcome {
    pub duration_ms: f64,
    pub code: Option<i32>,
    pub signal: Option<i32>,
    pub pid: Option<u32>,
    /// Present unless sampling was bypassed or unavailable
    pub resources: Option<ResourceUsage>,
    /// Present only with `buffer_stdout`
    pub stdout: Option<String>,
}

impl SpawnOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Spawns processes through a resource sampler
#[derive(Clone)]
pub struct ProcessSpawner {
    sampler: Arc<dyn ResourceSampler>,
}

impl ProcessSpawner {
    pub fn new(sampler: Arc<dyn ResourceSampler>) -> Self {
        Self { sampler }
    }

    /// Use the best sampler available on this host
    pub fn detect() -> Self {
        Self::new(detect_sampler())
    }

    /// Never sample resources
    pub fn unsampled() -> Self {
        Self::new(Arc::new(NullSampler))
    }

    pub fn sampler_name(&self) -> &'static str {
        self.sampler.name()
    }

    /// Run a command to completion
    pub async fn spawn(
        &self,
        program: &str,
        args: &[String],
        mut options: SpawnOptions,
    ) -> Result<SpawnOutcome, ProcessError> {
        let sample = !options.bypass_resource_metrics && options.kill_switch.is_none();
        let prepared = if sample {
            self.sampler
                .wrap(program, args)
                .map_err(|source| ProcessError::Io {
                    program: program.to_string(),
                    source,
                })?
        } else {
            SampledCommand::passthrough(program, args)
        };

        debug!("Spawning {} {:?}", prepared.program, prepared.args);

        let mut command = Command::new(&prepared.program);
        command
            .args(&prepared.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &options.cwd {
            command.current_dir(dir);
        }
        for (key, value) in &options.env {
            command.env(key, value);
        }

        let start = Instant::now();
        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: program.to_string(),
            source,
        })?;
        let pid = child.id();

        let stdout_task = tokio::spawn(pump_stdout(
            child.stdout.take(),
            options.buffer_stdout,
            options.logger.clone(),
        ));
        let stderr_task = tokio::spawn(pump_stderr(child.stderr.take(), options.logger.clone()));

        let waited = match options.kill_switch.take() {
            Some(kill) => {
                tokio::select! {
                    status = child.wait() => status,
                    Ok(()) = kill => {
                        debug!("Kill requested for {} (pid {:?})", program, pid);
                        match child.start_kill() {
                            Ok(()) => child.wait().await,
                            Err(e) => Err(e),
                        }
                    }
                }
            }
            None => child.wait().await,
        };
        let status = waited.map_err(|source| ProcessError::Io {
            program: program.to_string(),
            source,
        })?;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        let stdout = join_pump(stdout_task, program).await?;
        let stderr_tail = join_pump(stderr_task, program).await?;

        let resources = self.sampler_collect(prepared, sample);
        let code = status.code();
        let signal = exit_signal(&status);

        if !status.success() && !options.do_not_reject_on_fail {
            return Err(ProcessError::Exit {
                program: program.to_string(),
                code,
                signal,
                stderr_tail,
            });
        }

        Ok(SpawnOutcome {
            duration_ms,
            code,
            signal,
            pid,
            resources,
            stdout,
        })
    }

    fn sampler_collect(&self, prepared: SampledCommand, sampled: bool) -> Option<ResourceUsage> {
        if sampled {
            self.sampler.collect(prepared)
        } else {
            None
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

async fn join_pump<T>(
    task: tokio::task::JoinHandle<std::io::Result<T>>,
    program: &str,
) -> Result<T, ProcessError> {
    let io_error = |source| ProcessError::Io {
        program: program.to_string(),
        source,
    };
    match task.await {
        Ok(result) => result.map_err(io_error),
        Err(join_error) => Err(io_error(std::io::Error::other(join_error))),
    }
}

async fn pump_stdout<R: AsyncRead + Unpin>(
    reader: Option<R>,
    capture: bool,
    logger: Option<LineLogger>,
) -> std::io::Result<Option<String>> {
    let mut captured = capture.then(String::new);
    let Some(reader) = reader else {
        return Ok(captured);
    };

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        match captured.as_mut() {
            Some(buffer) => {
                buffer.push_str(&line);
                buffer.push('\n');
            }
            None => emit(&logger, &line),
        }
    }
    Ok(captured)
}

async fn pump_stderr<R: AsyncRead + Unpin>(
    reader: Option<R>,
    logger: Option<LineLogger>,
) -> std::io::Result<Vec<String>> {
    let mut tail = Vec::new();
    let Some(reader) = reader else {
        return Ok(tail);
    };

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        emit(&logger, &line);
        if tail.len() == STDERR_TAIL_LINES {
            tail.remove(0);
        }
        tail.push(line);
    }
    Ok(tail)
}

fn emit(logger: &Option<LineLogger>, line: &str) {
    match logger {
        Some(log) => log(line),
        None => debug!(target: "testfleet::child", "{}", line),
    }
}
