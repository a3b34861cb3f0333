use anyhow::Result;
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use topalloc::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// More log output: -v info, -vv debug, -vvv trace
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Split a budget across the configured tickers by market cap
    Alloc {
        /// Budget in the base currency (defaults to default_budget from the config)
        #[arg(short, long)]
        budget: Option<f64>,

        /// Use this base→quote rate instead of the resolved one
        #[arg(short, long)]
        rate: Option<f64>,

        /// Write the allocation as CSV to this path
        #[arg(short, long)]
        export: Option<PathBuf>,

        /// Show every exchange rate source that was tried
        #[arg(short, long)]
        diagnostics: bool,
    },
    /// Resolve the exchange rate and show every source that was tried
    Fx {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive mode: enter budgets, refresh on demand
    Dashboard,
}

impl From<Commands> for topalloc::AppCommand {
    fn from(cmd: Commands) -> topalloc::AppCommand {
        match cmd {
            Commands::Alloc {
                budget,
                rate,
                export,
                diagnostics,
            } => topalloc::AppCommand::Alloc(topalloc::AllocOptions {
                budget,
                rate_override: rate,
                export,
                diagnostics,
            }),
            Commands::Fx { json } => topalloc::AppCommand::Fx { json },
            Commands::Dashboard => topalloc::AppCommand::Dashboard,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => topalloc::cli::setup::setup(),
        Some(cmd) => topalloc::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
