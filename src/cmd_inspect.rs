//! `cadence validate` and `cadence next`.

use std::path::Path;

use anyhow::bail;
use cadence_config::{ConfigLoader, ConfigValidator};
use cadence_core::{parse_cron, register_builtin_jobs, JobRegistry, Trigger};
use chrono::{DateTime, Utc};

pub(crate) fn validate(path: &Path) -> anyhow::Result<()> {
    let config = ConfigLoader::load(path)?;

    let registry = JobRegistry::new();
    register_builtin_jobs(&registry);
    let result = ConfigValidator::validate_with_jobs(&config, &registry.names())?;

    println!("{}: {} job(s)", path.display(), config.jobs.len());
    for err in &result.errors {
        println!("  error   {}: {}", err.path, err.message);
    }
    for warning in &result.warnings {
        println!("  warning {}: {}", warning.path, warning.message);
    }

    if !result.is_valid() {
        bail!("{} error(s) found", result.errors.len());
    }
    println!("Configuration is valid.");
    Ok(())
}

pub(crate) fn next(expression: &str, count: usize) -> anyhow::Result<()> {
    for time in upcoming(expression, Utc::now(), count)? {
        println!("{}", time.to_rfc3339());
    }
    Ok(())
}

fn upcoming(expression: &str, from: DateTime<Utc>, count: usize) -> anyhow::Result<Vec<DateTime<Utc>>> {
    parse_cron(expression)?;
    let times = Trigger::cron(expression).upcoming(from, count);
    if times.is_empty() && count > 0 {
        bail!("'{}' has no upcoming fire times", expression);
    }
    Ok(times)
}
