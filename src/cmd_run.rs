//! `cadence run`: schedule the configured jobs and fire them until a
//! shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use cadence_config::{Config, ConfigValidator};
use cadence_core::{register_builtin_jobs, JobRegistry, SchedulingEngine};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

pub(crate) async fn run(config: Config, status_interval: u64) -> anyhow::Result<()> {
    info!("Starting Cadence v{}", env!("CARGO_PKG_VERSION"));

    let registry = Arc::new(JobRegistry::new());
    register_builtin_jobs(&registry);

    let validation = ConfigValidator::validate_with_jobs(&config, &registry.names())?;
    for warning in &validation.warnings {
        warn!(path = %warning.path, "{}", warning.message);
    }
    if !validation.is_valid() {
        for err in &validation.errors {
            error!(path = %err.path, "{}", err.message);
        }
        bail!("configuration has {} error(s)", validation.errors.len());
    }

    let engine = SchedulingEngine::new(config.engine.clone(), registry);
    for request in &config.jobs {
        engine
            .submit(request)
            .with_context(|| format!("failed to schedule job '{}'", request.key()))?;
    }
    engine.start()?;
    info!(jobs = config.jobs.len(), "Scheduler running, press Ctrl-C to stop");

    let status_every = (status_interval > 0).then(|| Duration::from_secs(status_interval));
    let status_reports = async {
        let Some(period) = status_every else {
            return std::future::pending::<()>().await;
        };
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            log_status(&engine);
        }
    };

    tokio::select! {
        signal = shutdown_signal() => {
            signal?;
        }
        _ = status_reports => {}
    }

    engine.shutdown().await?;
    log_status(&engine);
    Ok(())
}

fn log_status(engine: &SchedulingEngine) {
    let jobs = engine.list();
    info!(jobs = jobs.len(), running = engine.running_count(), "Job status");
    for job in jobs {
        info!(
            job = %job.key,
            status = %job.status,
            times_fired = job.times_fired,
            previous_fire_at = ?job.previous_fire_at.map(|t| t.to_rfc3339()),
            next_fire_at = ?job.next_fire_at.map(|t| t.to_rfc3339()),
            last_error = ?job.last_error,
            "Job"
        );
    }
}

/// Resolves on SIGINT or SIGTERM (Ctrl-C only off Unix).
#[cfg(unix)]
async fn shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl-C")?;
            info!("Received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Received Ctrl-C, shutting down");
    Ok(())
}
