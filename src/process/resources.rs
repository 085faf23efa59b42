//! Resource sampling for spawned processes
//!
//! A sampler rewrites a command so its resource usage can be read back after
//! it exits. The default implementation wraps the command in GNU `time` and
//! parses the report it writes to a temporary file.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::models::CpuTime;

/// `time` format producing one JSON object
const TIME_FORMAT: &str = r#"{"maxrss":%M,"user":%U,"sys":%S,"wall":%e}"#;

const TIME_BINARY: &str = "/usr/bin/time";

/// Resource usage of one finished process
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Peak resident set size in kilobytes
    pub maxrss: u64,
    /// User CPU seconds
    pub user: f64,
    /// System CPU seconds
    pub sys: f64,
    /// Wall-clock seconds
    pub wall: f64,
}

/// Command line to execute, plus whatever the sampler needs to read back
#[derive(Debug)]
pub struct SampledCommand {
    pub program: String,
    pub args: Vec<String>,
    report: Option<NamedTempFile>,
}

impl SampledCommand {
    pub fn passthrough(program: &str, args: &[String]) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
            report: None,
        }
    }
}

/// Measures resource usage of spawned commands
pub trait ResourceSampler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Rewrite the command so it can be measured
    fn wrap(&self, program: &str, args: &[String]) -> io::Result<SampledCommand>;

    /// Read back the usage after the process exited. Consumes the probe.
    fn collect(&self, command: SampledCommand) -> Option<ResourceUsage>;
}

/// Pick the best sampler available on this host
pub fn detect_sampler() -> Arc<dyn ResourceSampler> {
    match TimeWrapperSampler::detect() {
        Some(sampler) => Arc::new(sampler),
        None => {
            debug!("No GNU time found at {}, resource sampling disabled", TIME_BINARY);
            Arc::new(NullSampler)
        }
    }
}

/// Never measures anything
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSampler;

impl ResourceSampler for NullSampler {
    fn name(&self) -> &'static str {
        "none"
    }

    fn wrap(&self, program: &str, args: &[String]) -> io::Result<SampledCommand> {
        Ok(SampledCommand::passthrough(program, args))
    }

    fn collect(&self, _command: SampledCommand) -> Option<ResourceUsage> {
        None
    }
}

/// Wraps commands in GNU `time -f <json> -o <tempfile>`
#[derive(Clone, Debug)]
pub struct TimeWrapperSampler {
    time_binary: PathBuf,
}

impl TimeWrapperSampler {
    pub fn new(time_binary: impl Into<PathBuf>) -> Self {
        Self {
            time_binary: time_binary.into(),
        }
    }

    /// Only GNU time understands `-f`/`-o`, which in practice means Linux
    pub fn detect() -> Option<Self> {
        if cfg!(target_os = "linux") && Path::new(TIME_BINARY).exists() {
            Some(Self::new(TIME_BINARY))
        } else {
            None
        }
    }
}

impl ResourceSampler for TimeWrapperSampler {
    fn name(&self) -> &'static str {
        "gnu-time"
    }

    fn wrap(&self, program: &str, args: &[String]) -> io::Result<SampledCommand> {
        let report = NamedTempFile::new()?;

        let mut wrapped = vec![
            "-f".to_string(),
            TIME_FORMAT.to_string(),
            "-o".to_string(),
            report.path().to_string_lossy().to_string(),
            program.to_string(),
        ];
        wrapped.extend(args.iter().cloned());

        Ok(SampledCommand {
            program: self.time_binary.to_string_lossy().to_string(),
            args: wrapped,
            report: Some(report),
        })
    }

    fn collect(&self, command: SampledCommand) -> Option<ResourceUsage> {
        // Dropping the NamedTempFile removes it
        let report = command.report?;
        let content = std::fs::read_to_string(report.path()).ok()?;
        parse_time_report(&content)
    }
}

/// Parse the report GNU time wrote.
///
/// On non-zero exit time prefixes a "Command exited with non-zero status"
/// line, so only the last non-empty line is considered.
pub fn parse_time_report(content: &str) -> Option<ResourceUsage> {
    let line = content.lines().rev().find(|l| !l.trim().is_empty())?;
    match serde_json::from_str(line.trim()) {
        Ok(usage) => Some(usage),
        Err(e) => {
            debug!("Unparseable time report {:?}: {}", line, e);
            None
        }
    }
}

/// CPU time consumed by this process so far
#[cfg(unix)]
pub fn self_cpu_time() -> CpuTime {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: getrusage only writes into the struct we pass it.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return CpuTime::default();
    }
    // SAFETY: rc == 0 means the kernel filled the struct.
    let usage = unsafe { usage.assume_init() };

    CpuTime {
        user: timeval_ms(usage.ru_utime),
        system: timeval_ms(usage.ru_stime),
    }
}

#[cfg(not(unix))]
pub fn self_cpu_time() -> CpuTime {
    CpuTime::default()
}

#[cfg(unix)]
fn timeval_ms(tv: libc::timeval) -> f64 {
    tv.tv_sec as f64 * 1000.0 + tv.tv_usec as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_report() {
        let usage = parse_time_report(
            "{\"maxrss\":2048,\"user\":0.01,\"sys\":0.02,\"wall\":0.50}\n",
        )
        .unwrap();
        assert_eq!(usage.maxrss, 2048);
        assert_eq!(usage.wall, 0.5);
    }

    #[test]
    fn test_parse_report_after_exit_notice() {
        let content = "Command exited with non-zero status 1\n\
                       {\"maxrss\":10,\"user\":0.00,\"sys\":0.00,\"wall\":0.01}\n";
        assert_eq!(parse_time_report(content).unwrap().maxrss, 10);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_time_report("").is_none());
        assert!(parse_time_report("not json").is_none());
    }

    #[test]
    fn test_time_wrapper_rewrites_command() {
        let sampler = TimeWrapperSampler::new("/usr/bin/time");
        let wrapped = sampler
            .wrap("echo", &["hi".to_string()])
            .unwrap();
        assert_eq!(wrapped.program, "/usr/bin/time");
        assert_eq!(wrapped.args[0], "-f");
        assert_eq!(wrapped.args[1], TIME_FORMAT);
        assert_eq!(wrapped.args[2], "-o");
        assert_eq!(&wrapped.args[4..], &["echo".to_string(), "hi".to_string()]);
    }

    #[test]
    fn test_time_wrapper_reads_and_removes_report() {
        let sampler = TimeWrapperSampler::new("/usr/bin/time");
        let wrapped = sampler.wrap("true", &[]).unwrap();
        let path = PathBuf::from(&wrapped.args[3]);
        std::fs::write(&path, "{\"maxrss\":7,\"user\":0,\"sys\":0,\"wall\":0}").unwrap();

        let usage = sampler.collect(wrapped).unwrap();
        assert_eq!(usage.maxrss, 7);
        assert!(!path.exists());
    }

    #[test]
    fn test_null_sampler() {
        let wrapped = NullSampler.wrap("ls", &["-l".to_string()]).unwrap();
        assert_eq!(wrapped.program, "ls");
        assert!(NullSampler.collect(wrapped).is_none());
    }

    #[test]
    fn test_self_cpu_time_is_monotonic() {
        let before = self_cpu_time();
        let mut x = 0u64;
        for i in 0..200_000u64 {
            x = x.wrapping_add(i * i);
        }
        assert!(x > 0);
        let after = self_cpu_time();
        assert!(after.overall() >= before.overall());
    }
}
