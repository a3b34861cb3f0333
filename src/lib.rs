pub mod cli;
pub mod core;
pub mod providers;

pub use cli::alloc::AllocOptions;

use anyhow::Result;
use tracing::{debug, info};

/// Commands that run against a loaded configuration.
#[derive(Debug, Clone)]
pub enum AppCommand {
    /// Fetch data once, print the allocation and optionally export it
    Alloc(AllocOptions),
    /// Resolve the exchange rate and print every attempt
    Fx { json: bool },
    /// Interactive budget entry with cached refreshes
    Dashboard,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("topalloc starting...");

    let config = match config_path {
        Some(path) => crate::core::config::AppConfig::load_from_path(path)?,
        None => crate::core::config::AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    match command {
        AppCommand::Alloc(options) => cli::alloc::run(&config, &options).await,
        AppCommand::Fx { json } => cli::fx::run(&config, json).await,
        AppCommand::Dashboard => cli::dashboard::run(&config).await,
    }
}
