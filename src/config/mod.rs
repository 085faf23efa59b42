//! Configuration module
//!
//! Settings are layered: built-in defaults, then the first config file found
//! in the standard locations, then `TESTFLEET_*` environment variables. CLI
//! flags are applied last by the caller.

mod env;
mod file;

pub use env::{print_env_help, EnvConfig};
pub use file::{default_config_path, find_config, is_yaml_file, CONFIG_LOCATIONS};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::history::{HistoryStore, DEFAULT_RETENTION_DAYS, MAX_RETENTION_DAYS};
use crate::scheduler::DEFAULT_ESTIMATE_MS;

/// Application configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Number of worker processes; `None` uses the logical core count
    pub concurrency: Option<usize>,

    /// Runtime history file; `None` uses the user data directory
    pub history_path: Option<PathBuf>,

    /// Days of history kept for estimation
    pub retention_days: i64,

    /// Estimate for tests without history, in milliseconds
    pub default_estimate_ms: f64,

    /// Echo test log lines to stderr while tests run
    pub echo_test_logs: bool,

    /// Measure worker resource usage with GNU time when available
    pub resource_sampling: bool,

    /// Overlap asynchronous tests inside each worker
    pub async_parallel: bool,

    /// Program started for each worker instead of this executable
    pub worker_program: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            concurrency: None,
            history_path: None,
            retention_days: DEFAULT_RETENTION_DAYS,
            default_estimate_ms: DEFAULT_ESTIMATE_MS,
            echo_test_logs: false,
            resource_sampling: true,
            async_parallel: false,
            worker_program: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Defaults, overlaid with the first config file found and the environment.
    ///
    /// An explicit `path` must exist; otherwise the standard locations are
    /// searched and a missing file means defaults.
    pub fn resolve(path: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let source = match path {
            Some(path) => Some(path.to_path_buf()),
            None => find_config(),
        };

        let mut config = match &source {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                Self::load(path)?
            }
            None => Self::default(),
        };

        EnvConfig::load().apply_to(&mut config)?;
        config.validate()?;
        Ok((config, source))
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == Some(0) {
            bail!("concurrency must be at least 1");
        }
        if !(1..=MAX_RETENTION_DAYS).contains(&self.retention_days) {
            bail!(
                "retention_days must be between 1 and {}, got {}",
                MAX_RETENTION_DAYS,
                self.retention_days
            );
        }
        if !self.default_estimate_ms.is_finite() || self.default_estimate_ms < 0.0 {
            bail!(
                "default_estimate_ms must be a non-negative number, got {}",
                self.default_estimate_ms
            );
        }
        Ok(())
    }

    /// Worker count, falling back to the number of logical cores
    pub fn worker_count(&self) -> usize {
        self.concurrency.unwrap_or_else(num_cpus::get).max(1)
    }

    pub fn history_file(&self) -> PathBuf {
        self.history_path
            .clone()
            .unwrap_or_else(HistoryStore::default_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.default_estimate_ms, 100.0);
        assert!(config.resource_sampling);
        assert!(config.worker_count() >= 1);
        assert_ok!(config.validate());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("testfleet.yaml");
        std::fs::write(&path, "concurrency: 3\necho_test_logs: true\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.concurrency, Some(3));
        assert_eq!(config.worker_count(), 3);
        assert!(config.echo_test_logs);
        assert_eq!(config.retention_days, DEFAULT_RETENTION_DAYS);
    }

    #[test]
    fn test_save_load_roundtrip_json_and_yaml() {
        let dir = tempdir().unwrap();
        let config = AppConfig {
            concurrency: Some(2),
            history_path: Some(PathBuf::from("/tmp/h.json")),
            worker_program: Some("/usr/local/bin/testfleet".into()),
            ..Default::default()
        };

        for name in ["nested/config.yaml", "config.json"] {
            let path = dir.path().join(name);
            config.save(&path).unwrap();
            assert_eq!(AppConfig::load(&path).unwrap(), config);
        }
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "concurrency: 0\n").unwrap();
        assert_err!(AppConfig::load(&path));

        let config = AppConfig {
            retention_days: 0,
            ..Default::default()
        };
        assert_err!(config.validate());
    }

    #[test]
    fn test_retention_upper_bound() {
        let too_long = AppConfig {
            retention_days: 1_000_000_000_000,
            ..Default::default()
        };
        assert_err!(too_long.validate());

        let longest = AppConfig {
            retention_days: MAX_RETENTION_DAYS,
            ..Default::default()
        };
        assert_ok!(longest.validate());
    }

    #[test]
    fn test_explicit_missing_path_is_error() {
        let dir = tempdir().unwrap();
        assert_err!(AppConfig::resolve(Some(&dir.path().join("missing.yaml"))));
    }
}
