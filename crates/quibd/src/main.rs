//! Quib Daemon - virtual companion backend
//!
//! Serves the creature API: accounts, chat, tasks, evolution and token
//! rewards.

use anyhow::Result;
use clap::Parser;
use quib_common::Store;
use quibd::config::{Config, CONFIG_PATH};
use quibd::server::{self, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quibd", version, about = "Quib virtual companion daemon")]
struct Cli {
    /// Path to the config file
    #[arg(short, long, default_value = CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!("Quib Daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::load(&cli.config)?;
    config.validate()?;

    let store = Arc::new(Store::open(std::path::Path::new(&config.database.path))?);
    info!("Database ready at {}", config.database.path);

    let state = AppState::new(config, store)?;
    server::run(state).await
}
