//! Logging utilities
//!
//! All diagnostics go to stderr. Stdout carries only the worker protocol line
//! or the final report.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a full `EnvFilter` directive
pub const LOG_ENV: &str = "TESTFLEET_LOG";

/// Log level configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// Level for the CLI verbosity flags. Workers stay quieter so their
    /// stderr does not drown the parent's output.
    pub fn for_run(verbose: bool, automated: bool) -> Self {
        match (verbose, automated) {
            (true, _) => LogLevel::Debug,
            (false, true) => LogLevel::Warn,
            (false, false) => LogLevel::Info,
        }
    }
}

/// Target of echoed test log lines; kept at info so `--echo-logs` works in
/// quiet workers too.
const TEST_LOG_TARGET: &str = "testfleet::test_log";

/// Filter directive, preferring `TESTFLEET_LOG` when set
fn filter_for(level: LogLevel, from_env: Option<String>) -> EnvFilter {
    from_env
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| {
            EnvFilter::new(format!(
                "testfleet={},{TEST_LOG_TARGET}=info",
                level.to_tracing_level()
            ))
        })
}

/// Initialize the logger with specified level
pub fn init_logger(level: LogLevel) {
    let filter = filter_for(level, std::env::var(LOG_ENV).ok());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
