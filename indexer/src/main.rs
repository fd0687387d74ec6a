use clap::Parser;
use dotenvy::dotenv;
use tracing::{info, Level};

mod chain;
mod config;
mod decoder;
mod error;
mod fetcher;
mod indexer;
mod scheduler;
mod tokens;

#[cfg(test)]
mod testing;

use crate::config::{load_config, CLIArguments};
use crate::error::IndexerError;
use crate::indexer::Indexer;

#[tokio::main]
async fn main() -> Result<(), IndexerError> {
    dotenv().ok();

    let cli_args = CLIArguments::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli_args.debug {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .init();

    let mut config = load_config(cli_args.config_path.as_deref().unwrap_or_default());
    config.apply_cli(&cli_args);
    config.apply_env();
    let target = config.target()?;

    let indexer = Indexer::connect(&config).await?;
    indexer.run(target).await?;

    info!("run complete");
    Ok(())
}
