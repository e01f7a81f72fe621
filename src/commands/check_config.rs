//! Config validation CLI command

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use trendguard_backtest::RunConfig;

use super::DEFAULT_CONFIG_PATH;

#[derive(Debug, Args)]
pub struct CheckConfigArgs {
    /// Run configuration to validate
    #[arg(long, short, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

impl CheckConfigArgs {
    pub fn run(&self) -> Result<()> {
        let config = RunConfig::load_from_path(&self.config)
            .with_context(|| format!("Invalid config: {}", self.config.display()))?;

        let strategy = &config.strategy;
        println!("{}: ok", self.config.display());
        println!(
            "  universe:   top {} of {} by dollar volume, EMA {}/{}",
            strategy.universe.max_selected,
            strategy.universe.breadth,
            strategy.universe.fast_period,
            strategy.universe.slow_period
        );
        println!(
            "  volatility: {} rank over {} days, trigger above {}",
            strategy.volatility.reference_symbol,
            strategy.volatility.lookback_days,
            strategy.volatility.trigger_level
        );
        println!(
            "  hedge:      {:?} on {} at {} DTE +/- {}",
            strategy.hedge.style,
            strategy.hedge.underlying,
            strategy.hedge.target_dte,
            strategy.hedge.dte_tolerance
        );
        println!("  risk:       liquidate below -{}", strategy.risk.max_drawdown_pct);
        Ok(())
    }
}
