//! CLI definitions for Cadence.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Cadence CLI.
#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "In-process job scheduler with one-shot, repeating and cron triggers")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (default: <config dir>/cadence/config.toml)
    #[arg(short, long, global = true, env = "CADENCE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the scheduler in the foreground (default)
    Run {
        /// Seconds between job status reports in the log (0 = off)
        #[arg(long, default_value_t = 60)]
        status_interval: u64,
    },

    /// Validate the configuration file
    Validate,

    /// Show the upcoming fire times of a cron expression
    Next {
        /// Cron expression: six fields seconds-first (e.g. "0 0/15 * * * ?") or five-field Unix form
        expression: String,

        /// Number of fire times to show
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
    },
}
