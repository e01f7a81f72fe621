//! CLI subcommands

pub mod backtest;
pub mod check_config;

pub use backtest::BacktestArgs;
pub use check_config::CheckConfigArgs;

/// Run configuration used when `--config` is omitted
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
