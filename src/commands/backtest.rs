//! Backtest CLI command

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing::{info, warn};
use trendguard_backtest::{BacktestEngine, BacktestResults, DataSet, RunConfig};
use trendguard_strategies::TrendHedgeStrategy;

use super::DEFAULT_CONFIG_PATH;

#[derive(Debug, Args)]
pub struct BacktestArgs {
    /// Run configuration (`[backtest]` and `[strategy]` tables)
    #[arg(long, short, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// JSON data set; overrides `backtest.data_path`
    #[arg(long, short)]
    pub data: Option<PathBuf>,

    /// First simulated date (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last simulated date (YYYY-MM-DD)
    #[arg(long)]
    pub to: Option<NaiveDate>,

    /// Initial capital in USD
    #[arg(long)]
    pub capital: Option<Decimal>,

    /// Output format
    #[arg(long, short, default_value = "text")]
    pub format: OutputFormat,

    /// Write the report to this file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

impl BacktestArgs {
    pub async fn run(&self) -> Result<()> {
        let mut config = RunConfig::load_from_path(&self.config)
            .with_context(|| format!("Failed to load config: {}", self.config.display()))?;
        self.apply_overrides(&mut config);
        config
            .backtest
            .validate()
            .context("Invalid backtest settings")?;

        let data_path = config
            .backtest
            .data_path
            .clone()
            .context("No data set given; pass --data or set backtest.data_path")?;
        let data = DataSet::from_json_file(&data_path)
            .with_context(|| format!("Failed to load data set: {}", data_path.display()))?;

        if let Some((data_start, data_end)) = data.date_range() {
            info!(
                data_start = %data_start,
                data_end = %data_end,
                "Available data range"
            );
            let before = config.backtest.start_date.map(|s| s < data_start).unwrap_or(false);
            let after = config.backtest.end_date.map(|e| e > data_end).unwrap_or(false);
            if before || after {
                warn!(
                    from = ?config.backtest.start_date,
                    to = ?config.backtest.end_date,
                    "Requested range partially outside available data"
                );
            }
        }

        let warm_up_days = config.strategy.warm_up_days as usize;
        let mut strategy = TrendHedgeStrategy::new(config.strategy);
        let engine = BacktestEngine::new(config.backtest, data);
        let results = engine
            .run(&mut strategy, warm_up_days)
            .context("Backtest failed")?;

        let report = match self.format {
            OutputFormat::Json => results.to_json()?,
            OutputFormat::Csv => results.trades_to_csv(),
            OutputFormat::Text => render_text(&results),
        };

        match &self.output {
            Some(path) => {
                tokio::fs::write(path, report)
                    .await
                    .with_context(|| format!("Failed to write report: {}", path.display()))?;
                info!(path = %path.display(), "Report written");
            }
            None => println!("{}", report),
        }
        Ok(())
    }

    fn apply_overrides(&self, config: &mut RunConfig) {
        if let Some(data) = &self.data {
            config.backtest.data_path = Some(data.clone());
        }
        if self.from.is_some() {
            config.backtest.start_date = self.from;
        }
        if self.to.is_some() {
            config.backtest.end_date = self.to;
        }
        if let Some(capital) = self.capital {
            config.backtest.initial_capital = capital;
        }
    }
}

fn render_text(results: &BacktestResults) -> String {
    let m = &results.metrics;
    let mut out = String::new();
    let rule = "─".repeat(56);

    out.push_str(&format!("\nBACKTEST RESULTS: {}\n{}\n", results.strategy_id, rule));
    out.push_str(&format!(
        "Period:           {} to {}\n",
        results.start_time.format("%Y-%m-%d"),
        results.end_time.format("%Y-%m-%d")
    ));
    out.push_str(&format!("Initial Capital:  ${:.2}\n", results.initial_capital));
    out.push_str(&format!("Final Capital:    ${:.2}\n", results.final_capital));
    out.push_str(&format!("Total P&L:        ${:.2}\n", m.total_pnl));
    out.push_str(&format!("Return:           {:.2}%\n", m.return_pct));
    out.push_str(&format!("Max Drawdown:     {:.2}% (${:.2})\n", m.max_drawdown_pct, m.max_drawdown_usd));
    out.push_str(&format!("Sharpe Ratio:     {:.2}\n{}\n", m.sharpe_ratio, rule));
    out.push_str(&format!("Fills:            {}\n", m.trade_count));
    out.push_str(&format!("Win Rate:         {:.2}%\n", m.win_rate));
    out.push_str(&format!("Profit Factor:    {:.2}\n", m.profit_factor));
    out.push_str(&format!("Total Fees:       ${:.2}\n", m.total_fees));
    out.push_str(&format!("Subscriptions:    {}\n{}\n", results.subscription_count, rule));

    if !results.symbol_breakdown.is_empty() {
        out.push_str("Symbol Breakdown:\n");
        for (symbol, perf) in &results.symbol_breakdown {
            out.push_str(&format!(
                "  {:<22} {:>4} fills  realized ${:.2}  fees ${:.2}\n",
                symbol, perf.trade_count, perf.realized_pnl, perf.fees
            ));
        }
    }
    out
}
