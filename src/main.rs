//! Cadence - in-process job scheduler.

mod cli;
mod cmd_inspect;
mod cmd_run;
mod logging;

use cadence_config::{default_config_path, ConfigLoader};
use clap::Parser;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run { status_interval: 60 });

    match command {
        Commands::Run { status_interval } => {
            // An explicit path must exist; the default one is optional.
            let config = match &cli.config {
                Some(path) => ConfigLoader::load(path)?,
                None => ConfigLoader::load_or_default(&default_config_path())?,
            };
            logging::init_tracing(&config.logging)?;
            cmd_run::run(config, status_interval).await
        }
        Commands::Validate => {
            logging::init_console();
            let path = cli.config.unwrap_or_else(default_config_path);
            cmd_inspect::validate(&path)
        }
        Commands::Next { expression, count } => {
            logging::init_console();
            cmd_inspect::next(&expression, count)
        }
    }
}
