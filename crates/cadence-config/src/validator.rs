//! Configuration validation.

use std::collections::HashSet;

use chrono::Utc;

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_engine(config, &mut result);
        Self::validate_logging(config, &mut result);
        Self::validate_jobs(config, &mut result);

        Ok(result)
    }

    /// Validate, and also check every job reference against `known_jobs`.
    pub fn validate_with_jobs(
        config: &Config,
        known_jobs: &[String],
    ) -> Result<ValidationResult, ConfigError> {
        let mut result = Self::validate(config)?;
        for (i, job) in config.jobs.iter().enumerate() {
            if !known_jobs.contains(&job.job_ref) {
                result.add_error(ValidationError::new(
                    format!("jobs[{}].job", i),
                    format!(
                        "Unknown job '{}', available: {}",
                        job.job_ref,
                        known_jobs.join(", ")
                    ),
                ));
            }
        }
        Ok(result)
    }

    fn validate_engine(config: &Config, result: &mut ValidationResult) {
        let engine = &config.engine;

        if engine.poll_interval_ms == 0 {
            result.add_error(ValidationError::new(
                "engine.poll_interval_ms",
                "poll_interval_ms must be greater than 0",
            ));
        }

        if engine.max_concurrent_jobs == 0 {
            result.add_warning(ValidationWarning::new(
                "engine.max_concurrent_jobs",
                "max_concurrent_jobs is 0, job concurrency is unlimited",
            ));
        }

        if engine.misfire_threshold_ms < engine.poll_interval_ms {
            result.add_warning(ValidationWarning::new(
                "engine.misfire_threshold_ms",
                "misfire_threshold_ms is below poll_interval_ms, ordinary polling delay may count as a misfire",
            ));
        }

        if engine.wait_for_jobs_on_shutdown && engine.shutdown_timeout_secs == 0 {
            result.add_warning(ValidationWarning::new(
                "engine.shutdown_timeout_secs",
                "shutdown_timeout_secs is 0, running jobs are interrupted immediately on shutdown",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        let level = config.logging.level.to_ascii_lowercase();
        // Full filter directives like "cadence_core=debug" are passed through.
        if !level.contains('=') && !LOG_LEVELS.contains(&level.as_str()) {
            result.add_error(ValidationError::new(
                "logging.level",
                format!(
                    "Unknown log level '{}', valid values: {:?}",
                    config.logging.level, LOG_LEVELS
                ),
            ));
        }

        if config.logging.max_log_files == 0 {
            result.add_warning(ValidationWarning::new(
                "logging.max_log_files",
                "max_log_files is 0, old log files are never removed",
            ));
        }
    }

    fn validate_jobs(config: &Config, result: &mut ValidationResult) {
        let now = Utc::now();
        let mut seen = HashSet::new();

        for (i, job) in config.jobs.iter().enumerate() {
            let path = format!("jobs[{}]", i);
            let key = job.key();

            if let Err(e) = key.validate() {
                result.add_error(ValidationError::new(format!("{}.name", path), e.to_string()));
            }

            if job.job_ref.trim().is_empty() {
                result.add_error(ValidationError::new(
                    format!("{}.job", path),
                    "Job reference cannot be empty",
                ));
            }

            if !seen.insert(key.clone()) {
                if config.engine.overwrite_existing_jobs {
                    result.add_warning(ValidationWarning::new(
                        path.clone(),
                        format!("Job '{}' is defined more than once, the last definition wins", key),
                    ));
                } else {
                    result.add_error(ValidationError::new(
                        path.clone(),
                        format!("Job '{}' is defined more than once", key),
                    ));
                }
            }

            match job.trigger(now).and_then(|trigger| trigger.validate(now).map(|_| trigger)) {
                Ok(trigger) => {
                    if trigger.start_at().is_some_and(|start| start < now) && job.start_at.is_some() {
                        result.add_warning(ValidationWarning::new(
                            format!("{}.start_at", path),
                            "start_at is in the past, the job fires immediately on startup",
                        ));
                    }
                }
                Err(e) => {
                    result.add_error(ValidationError::new(format!("{}.trigger", path), e.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
