//! Backtest configuration

use crate::error::{BacktestError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use trendguard_core::{ConfigError, StrategyConfig};

/// Configuration for a backtest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// First simulated date; defaults to the start of the data set
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// Last simulated date; defaults to the end of the data set
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Initial capital in USD
    #[serde(default = "default_initial_capital")]
    pub initial_capital: Decimal,
    /// Flat fee charged per filled order
    #[serde(default = "default_fee_per_order")]
    pub fee_per_order: Decimal,
    /// Units of underlying per option contract
    #[serde(default = "default_option_multiplier")]
    pub option_multiplier: Decimal,
    /// JSON data set of daily bars
    #[serde(default)]
    pub data_path: Option<PathBuf>,
    /// Log a status line every this many simulated days (0 disables)
    #[serde(default = "default_status_every_days")]
    pub status_every_days: usize,
    /// Flatten every open position after the last day
    #[serde(default = "default_close_at_end")]
    pub close_at_end: bool,
    #[serde(default)]
    pub chain: ChainConfig,
}

fn default_initial_capital() -> Decimal {
    Decimal::new(250_000, 0)
}

fn default_fee_per_order() -> Decimal {
    Decimal::ONE
}

fn default_option_multiplier() -> Decimal {
    Decimal::ONE_HUNDRED
}

fn default_status_every_days() -> usize {
    5
}

fn default_close_at_end() -> bool {
    true
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            initial_capital: default_initial_capital(),
            fee_per_order: default_fee_per_order(),
            option_multiplier: default_option_multiplier(),
            data_path: None,
            status_every_days: default_status_every_days(),
            close_at_end: default_close_at_end(),
            chain: ChainConfig::default(),
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(BacktestError::InvalidTimeRange(format!(
                    "start {} is after end {}",
                    start, end
                )));
            }
        }
        if self.initial_capital <= Decimal::ZERO {
            return Err(invalid("backtest.initial_capital", "must be positive"));
        }
        if self.fee_per_order.is_sign_negative() {
            return Err(invalid("backtest.fee_per_order", "must not be negative"));
        }
        if self.option_multiplier <= Decimal::ZERO {
            return Err(invalid("backtest.option_multiplier", "must be positive"));
        }
        self.chain.validate()
    }
}

/// Synthetic option chain parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Distance between listed strikes
    #[serde(default = "default_strike_step")]
    pub strike_step: Decimal,
    /// Strikes listed on each side of the at-the-money strike
    #[serde(default = "default_strikes_each_side")]
    pub strikes_each_side: u32,
    /// Weekly Friday expiries listed ahead of the current date
    #[serde(default = "default_expiry_weeks")]
    pub expiry_weeks: u32,
    /// Time value per year as a fraction of spot
    #[serde(default = "default_time_value_pct")]
    pub time_value_pct: Decimal,
}

fn default_strike_step() -> Decimal {
    Decimal::ONE
}

fn default_strikes_each_side() -> u32 {
    30
}

fn default_expiry_weeks() -> u32 {
    8
}

fn default_time_value_pct() -> Decimal {
    Decimal::new(8, 2)
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            strike_step: default_strike_step(),
            strikes_each_side: default_strikes_each_side(),
            expiry_weeks: default_expiry_weeks(),
            time_value_pct: default_time_value_pct(),
        }
    }
}

impl ChainConfig {
    fn validate(&self) -> Result<()> {
        if self.strike_step <= Decimal::ZERO {
            return Err(invalid("chain.strike_step", "must be positive"));
        }
        if self.expiry_weeks == 0 {
            return Err(invalid("chain.expiry_weeks", "must be positive"));
        }
        if self.time_value_pct.is_sign_negative() {
            return Err(invalid("chain.time_value_pct", "must not be negative"));
        }
        Ok(())
    }
}

/// Combined file layout: a `[backtest]` table next to the strategy sections
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
}

impl RunConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RunConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.strategy.validate()?;
        config.backtest.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

fn invalid(field: &str, message: &str) -> BacktestError {
    BacktestError::ConfigError(ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = BacktestConfig::default();
        assert_eq!(config.initial_capital, dec!(250000));
        assert_eq!(config.option_multiplier, dec!(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_run_config_from_toml() {
        let config = RunConfig::from_toml_str(
            r#"
            [backtest]
            start_date = "2023-01-03"
            end_date = "2023-06-30"
            initial_capital = 100000
            data_path = "data/sample.json"

            [backtest.chain]
            strike_step = 5

            [strategy]
            warm_up_days = 10

            [strategy.hedge]
            underlying = "QQQ"
            "#,
        )
        .unwrap();

        assert_eq!(config.backtest.start_date, NaiveDate::from_ymd_opt(2023, 1, 3));
        assert_eq!(config.backtest.initial_capital, dec!(100000));
        assert_eq!(config.backtest.chain.strike_step, dec!(5));
        assert_eq!(config.backtest.chain.expiry_weeks, 8);
        assert_eq!(config.strategy.warm_up_days, 10);
        assert_eq!(config.strategy.hedge.underlying, "QQQ");
    }

    #[test]
    fn test_shipped_default_config() {
        let config = RunConfig::from_toml_str(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(config.backtest.initial_capital, dec!(250000));
        assert_eq!(config.backtest.data_path, None);
        assert_eq!(config.strategy.hedge.shares_per_contract, dec!(90));
        assert_eq!(config.strategy.volatility.trigger_level, dec!(0.5));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = RunConfig::from_toml_str(
            r#"
            [backtest]
            start_date = "2023-06-30"
            end_date = "2023-01-03"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, BacktestError::InvalidTimeRange(_)));
    }

    #[test]
    fn test_strategy_errors_surface() {
        let err = RunConfig::from_toml_str("[strategy.risk]\nmax_drawdown_pct = 2").unwrap_err();
        assert!(matches!(
            err,
            BacktestError::ConfigError(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[backtest]\nfee_per_order = 0.5").unwrap();

        let config = RunConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.backtest.fee_per_order, dec!(0.5));

        assert!(matches!(
            RunConfig::load_from_path("/nonexistent/run.toml"),
            Err(BacktestError::ConfigError(ConfigError::FileNotFound(_)))
        ));
    }
}
