//! Configuration loader.

use std::fs;
use std::path::Path;

use regex::Regex;

use crate::error::ConfigError;
use crate::schema::Config;

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load from `path` if it exists, otherwise return the defaults.
    pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Config::default()),
            other => other,
        }
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let config: Config = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let mut missing = None;
        let expanded = re.replace_all(content, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_else(|_| {
                missing.get_or_insert_with(|| caps[1].to_string());
                String::new()
            })
        });

        match missing {
            Some(var) => Err(ConfigError::EnvVarNotSet(var)),
            None => Ok(expanded.into_owned()),
        }
    }

    /// Expand shell-style paths (e.g., `~/.cadence`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_empty_config() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.engine.poll_interval_ms, 1000);
        assert!(config.jobs.is_empty());
    }

    #[test]
    fn test_load_full_config() {
        let content = r#"
            [engine]
            poll_interval_ms = 250
            max_concurrent_jobs = 4
            overwrite_existing_jobs = true

            [logging]
            level = "debug"
            json = true

            [[jobs]]
            name = "heartbeat"
            group = "system"
            job = "log"
            cron_expression = "0 * * * * ?"

            [jobs.data]
            message = "still alive"

            [[jobs]]
            name = "nap"
            repeat_interval_secs = 30
            repeat_count = 2
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.engine.poll_interval_ms, 250);
        assert_eq!(config.engine.max_concurrent_jobs, 4);
        assert!(config.engine.overwrite_existing_jobs);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);

        assert_eq!(config.jobs.len(), 2);
        let heartbeat = &config.jobs[0];
        assert_eq!(heartbeat.job_ref, "log");
        assert_eq!(
            heartbeat.data.get("message").and_then(|v| v.as_str()),
            Some("still alive")
        );
        let nap = &config.jobs[1];
        assert_eq!(nap.group, "DEFAULT");
        assert_eq!(nap.job_ref, "sleep");
        assert_eq!(nap.repeat_count, Some(2));
    }

    #[test]
    fn test_load_start_at() {
        let content = r#"
            [[jobs]]
            name = "once"
            start_at = "2030-01-01T00:00:00Z"
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(
            config.jobs[0].start_at.map(|t| t.to_rfc3339()),
            Some("2030-01-01T00:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[engine]").unwrap();
        writeln!(file, "shutdown_timeout_secs = 5").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.engine.shutdown_timeout_secs, 5);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let path = Path::new("/nonexistent/cadence/config.toml");
        assert!(matches!(
            ConfigLoader::load(path),
            Err(ConfigError::NotFound(_))
        ));
        let config = ConfigLoader::load_or_default(path).unwrap();
        assert_eq!(config.engine.max_concurrent_jobs, 10);
    }

    #[test]
    fn test_load_invalid_toml() {
        assert!(matches!(
            ConfigLoader::load_str("[engine\npoll_interval_ms = 1"),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: test-only variable name, not read anywhere else
        unsafe {
            std::env::set_var("CADENCE_TEST_LOG_DIR", "/tmp/cadence-logs");
        }
        let config = ConfigLoader::load_str(
            r#"
            [logging]
            directory = "${CADENCE_TEST_LOG_DIR}"
            "#,
        )
        .unwrap();
        assert_eq!(config.logging.directory.as_deref(), Some("/tmp/cadence-logs"));
        unsafe {
            std::env::remove_var("CADENCE_TEST_LOG_DIR");
        }
    }

    #[test]
    fn test_expand_env_vars_not_set() {
        let result = ConfigLoader::expand_env_vars("value = \"${CADENCE_UNSET_VAR_98765}\"");
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(ref v)) if v == "CADENCE_UNSET_VAR_98765"));
    }

    #[test]
    fn test_expand_env_vars_no_vars() {
        let content = "value = \"no variables here\"";
        assert_eq!(ConfigLoader::expand_env_vars(content).unwrap(), content);
    }

    #[test]
    fn test_expand_path() {
        let expanded = ConfigLoader::expand_path("~/test");
        assert!(!expanded.starts_with('~'));
        assert!(expanded.ends_with("/test"));
        assert_eq!(ConfigLoader::expand_path("/usr/local"), "/usr/local");
    }
}
