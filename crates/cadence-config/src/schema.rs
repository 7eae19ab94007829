//! Configuration schema definitions.

use std::path::PathBuf;

use cadence_core::{EngineConfig, JobRequest};
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Jobs scheduled when the engine starts.
    #[serde(default)]
    pub jobs: Vec<JobRequest>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_level")]
    pub level: String,

    /// Directory for rolling log files. `~` is expanded.
    #[serde(default)]
    pub directory: Option<String>,

    /// Write the file log as JSON lines.
    #[serde(default)]
    pub json: bool,

    /// Daily files kept before the oldest is removed.
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            directory: None,
            json: false,
            max_log_files: default_max_log_files(),
        }
    }
}

impl LoggingConfig {
    /// Configured directory with `~` expanded, or `~/.cadence/logs`.
    pub fn log_directory(&self) -> PathBuf {
        match &self.directory {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).as_ref()),
            None => cadence_home().join("logs"),
        }
    }
}

/// Base directory for Cadence files.
pub fn cadence_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cadence")
}

/// Config file used when none is given on the command line.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("cadence"))
        .unwrap_or_else(cadence_home)
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_defaults() {
        let logging = LoggingConfig::default();
        assert_eq!(logging.level, "info");
        assert_eq!(logging.max_log_files, 30);
        assert!(logging.log_directory().ends_with(".cadence/logs"));
    }

    #[test]
    fn test_log_directory_expands_tilde() {
        let logging = LoggingConfig {
            directory: Some("~/var/cadence".to_string()),
            ..LoggingConfig::default()
        };
        let dir = logging.log_directory();
        assert!(!dir.to_string_lossy().starts_with('~'));
        assert!(dir.ends_with("var/cadence"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        match dirs::config_dir() {
            Some(dir) => assert_eq!(path, dir.join("cadence").join("config.toml")),
            None => assert_eq!(path, cadence_home().join("config.toml")),
        }
    }
}
