//! Environment variable configuration
//!
//! Provides `TESTFLEET_*` overrides on top of the file configuration.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

use super::AppConfig;

/// Environment variable prefix
const ENV_PREFIX: &str = "TESTFLEET";

/// Overrides read from environment variables
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvConfig {
    /// TESTFLEET_CONCURRENCY
    pub concurrency: Option<String>,
    /// TESTFLEET_HISTORY
    pub history_path: Option<String>,
    /// TESTFLEET_RETENTION_DAYS
    pub retention_days: Option<String>,
    /// TESTFLEET_DEFAULT_ESTIMATE_MS
    pub default_estimate_ms: Option<String>,
    /// TESTFLEET_ECHO_LOGS
    pub echo_test_logs: Option<bool>,
    /// TESTFLEET_RESOURCES
    pub resource_sampling: Option<bool>,
    /// TESTFLEET_ASYNC_PARALLEL
    pub async_parallel: Option<bool>,
    /// TESTFLEET_WORKER
    pub worker_program: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            concurrency: get_env("CONCURRENCY"),
            history_path: get_env("HISTORY"),
            retention_days: get_env("RETENTION_DAYS"),
            default_estimate_ms: get_env("DEFAULT_ESTIMATE_MS"),
            echo_test_logs: get_env_bool("ECHO_LOGS"),
            resource_sampling: get_env_bool("RESOURCES"),
            async_parallel: get_env_bool("ASYNC_PARALLEL"),
            worker_program: get_env("WORKER"),
        }
    }

    pub fn has_any(&self) -> bool {
        *self != Self::default()
    }

    /// Overlay the set variables onto `config`. Unparseable numbers are errors.
    pub fn apply_to(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(v) = &self.concurrency {
            config.concurrency = Some(parse_var("CONCURRENCY", v)?);
        }
        if let Some(v) = &self.history_path {
            config.history_path = Some(PathBuf::from(v));
        }
        if let Some(v) = &self.retention_days {
            config.retention_days = parse_var("RETENTION_DAYS", v)?;
        }
        if let Some(v) = &self.default_estimate_ms {
            config.default_estimate_ms = parse_var("DEFAULT_ESTIMATE_MS", v)?;
        }
        if let Some(v) = self.echo_test_logs {
            config.echo_test_logs = v;
        }
        if let Some(v) = self.resource_sampling {
            config.resource_sampling = v;
        }
        if let Some(v) = self.async_parallel {
            config.async_parallel = v;
        }
        if let Some(v) = &self.worker_program {
            config.worker_program = Some(v.clone());
        }
        Ok(())
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| parse_bool(&v))
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "enabled"
    )
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid {ENV_PREFIX}_{name}: {value:?}"))
}

/// Print all TESTFLEET environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_CONCURRENCY          Number of worker processes");
    println!("  {ENV_PREFIX}_HISTORY              Path to the runtime history file");
    println!("  {ENV_PREFIX}_RETENTION_DAYS       Days of history kept");
    println!("  {ENV_PREFIX}_DEFAULT_ESTIMATE_MS  Estimate for tests without history");
    println!("  {ENV_PREFIX}_ECHO_LOGS            Echo test logs to stderr (true/false)");
    println!("  {ENV_PREFIX}_RESOURCES            Sample worker resource usage (true/false)");
    println!("  {ENV_PREFIX}_ASYNC_PARALLEL       Overlap async tests (true/false)");
    println!("  {ENV_PREFIX}_WORKER               Program started for each worker");
    println!("  {ENV_PREFIX}_LOG                  Log filter (e.g. debug, testfleet=trace)");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    #[test]
    fn test_env_config_default() {
        let config = EnvConfig::default();
        assert!(!config.has_any());
        let mut app = AppConfig::default();
        config.apply_to(&mut app).unwrap();
        assert_eq!(app, AppConfig::default());
    }

    #[test]
    fn test_apply_overrides() {
        let overrides = EnvConfig {
            concurrency: Some("6".into()),
            history_path: Some("/var/tmp/history.json".into()),
            default_estimate_ms: Some(" 250.5 ".into()),
            echo_test_logs: Some(true),
            resource_sampling: Some(false),
            ..Default::default()
        };
        assert!(overrides.has_any());

        let mut app = AppConfig::default();
        overrides.apply_to(&mut app).unwrap();
        assert_eq!(app.concurrency, Some(6));
        assert_eq!(app.history_path, Some(PathBuf::from("/var/tmp/history.json")));
        assert_eq!(app.default_estimate_ms, 250.5);
        assert!(app.echo_test_logs);
        assert!(!app.resource_sampling);
        assert!(!app.async_parallel);
    }

    #[test]
    fn test_bad_number_is_error() {
        let overrides = EnvConfig {
            retention_days: Some("a week".into()),
            ..Default::default()
        };
        assert_err!(overrides.apply_to(&mut AppConfig::default()));
    }

    #[test]
    fn test_env_bool_parsing() {
        assert!(parse_bool("1"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("on"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("nope"));
    }
}
