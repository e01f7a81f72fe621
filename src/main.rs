//! Trendguard - trend-following equities with volatility-triggered hedges
//!
//! Command-line host for replaying the strategy over historical daily bars.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{BacktestArgs, CheckConfigArgs};
use trendguard_observability::{init_logging, settings_from_env};

#[derive(Debug, Parser)]
#[command(name = "trendguard", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay the strategy over a historical data set
    Backtest(BacktestArgs),
    /// Parse and validate a run configuration
    CheckConfig(CheckConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (log_format, log_level) = settings_from_env();
    init_logging(log_format, log_level)?;

    match cli.command {
        Command::Backtest(args) => args.run().await,
        Command::CheckConfig(args) => args.run(),
    }
}
