//! Strategy configuration
//!
//! Every section deserializes from TOML with per-field defaults, so a partial
//! file (or none at all) yields the stock parameter set.

use crate::error::ConfigError;
use crate::types::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Top-level strategy configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default)]
    pub universe: UniverseConfig,
    #[serde(default)]
    pub volatility: VolatilityConfig,
    #[serde(default)]
    pub hedge: HedgeConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    /// Days of data replayed before the algorithm may trade
    #[serde(default = "default_warm_up_days")]
    pub warm_up_days: u32,
}

fn default_warm_up_days() -> u32 {
    150
}

/// Trend universe selection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseConfig {
    /// Instruments at or below this price are skipped
    #[serde(default = "default_min_price")]
    pub min_price: Decimal,
    /// Number of most liquid instruments tracked with indicators
    #[serde(default = "default_breadth")]
    pub breadth: usize,
    /// Maximum number of selected instruments
    #[serde(default = "default_max_selected")]
    pub max_selected: usize,
    #[serde(default = "default_fast_period")]
    pub fast_period: usize,
    #[serde(default = "default_slow_period")]
    pub slow_period: usize,
    /// Daily bars requested to backfill a new indicator pair
    #[serde(default = "default_history_lookback")]
    pub history_lookback: usize,
    /// Portfolio weight given to each newly selected instrument
    #[serde(default = "default_allocation_per_instrument")]
    pub allocation_per_instrument: Decimal,
}

fn default_min_price() -> Decimal {
    Decimal::new(10, 0)
}

fn default_breadth() -> usize {
    100
}

fn default_max_selected() -> usize {
    10
}

fn default_fast_period() -> usize {
    50
}

fn default_slow_period() -> usize {
    200
}

fn default_history_lookback() -> usize {
    200
}

fn default_allocation_per_instrument() -> Decimal {
    Decimal::new(10, 2)
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            min_price: default_min_price(),
            breadth: default_breadth(),
            max_selected: default_max_selected(),
            fast_period: default_fast_period(),
            slow_period: default_slow_period(),
            history_lookback: default_history_lookback(),
            allocation_per_instrument: default_allocation_per_instrument(),
        }
    }
}

/// Volatility regime parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityConfig {
    /// Reference series, e.g. the VIX index
    #[serde(default = "default_reference_symbol")]
    pub reference_symbol: Symbol,
    /// Trailing window length in daily bars
    #[serde(default = "default_lookback_days")]
    pub lookback_days: usize,
    /// Hedges are requested while the rank is strictly above this level
    #[serde(default = "default_trigger_level")]
    pub trigger_level: Decimal,
}

fn default_reference_symbol() -> Symbol {
    "VIX".to_string()
}

fn default_lookback_days() -> usize {
    150
}

fn default_trigger_level() -> Decimal {
    Decimal::new(5, 1)
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            reference_symbol: default_reference_symbol(),
            lookback_days: default_lookback_days(),
            trigger_level: default_trigger_level(),
        }
    }
}

/// How the derivative leg is traded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HedgeStyle {
    /// Buy out-of-the-money puts closest to the target expiry
    ProtectivePut,
    /// Sell near-the-money calls with the latest expiry in the window
    CoveredCall,
}

/// Hedge lifecycle parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeConfig {
    /// Core underlying held permanently and hedged
    #[serde(default = "default_underlying")]
    pub underlying: Symbol,
    /// Portfolio weight of the core underlying
    #[serde(default = "default_underlying_allocation")]
    pub underlying_allocation: Decimal,
    #[serde(default = "default_style")]
    pub style: HedgeStyle,
    /// Target days to expiry
    #[serde(default = "default_target_dte")]
    pub target_dte: i64,
    /// Accepted deviation from `target_dte`, inclusive
    #[serde(default = "default_dte_tolerance")]
    pub dte_tolerance: i64,
    /// Minimum out-of-the-money distance as a fraction of spot
    #[serde(default = "default_otm_offset")]
    pub otm_offset: Decimal,
    /// Close the contract once this many days or fewer remain
    #[serde(default = "default_days_before_expiry")]
    pub days_before_expiry: i64,
    /// Shares of the underlying covered by one contract
    #[serde(default = "default_shares_per_contract")]
    pub shares_per_contract: Decimal,
    /// Also hedge instruments entering the trend universe
    #[serde(default = "default_hedge_universe_members")]
    pub hedge_universe_members: bool,
}

fn default_underlying() -> Symbol {
    "SPY".to_string()
}

fn default_underlying_allocation() -> Decimal {
    Decimal::new(9, 2)
}

fn default_style() -> HedgeStyle {
    HedgeStyle::ProtectivePut
}

fn default_target_dte() -> i64 {
    25
}

fn default_dte_tolerance() -> i64 {
    7
}

fn default_otm_offset() -> Decimal {
    Decimal::new(1, 2)
}

fn default_days_before_expiry() -> i64 {
    2
}

fn default_shares_per_contract() -> Decimal {
    Decimal::new(90, 0)
}

fn default_hedge_universe_members() -> bool {
    true
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self {
            underlying: default_underlying(),
            underlying_allocation: default_underlying_allocation(),
            style: default_style(),
            target_dte: default_target_dte(),
            dte_tolerance: default_dte_tolerance(),
            otm_offset: default_otm_offset(),
            days_before_expiry: default_days_before_expiry(),
            shares_per_contract: default_shares_per_contract(),
            hedge_universe_members: default_hedge_universe_members(),
        }
    }
}

/// Drawdown overlay parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Unrealized loss fraction that triggers liquidation (0.10 = 10%)
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: Decimal,
}

fn default_max_drawdown_pct() -> Decimal {
    Decimal::new(10, 2)
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_drawdown_pct: default_max_drawdown_pct(),
        }
    }
}

impl StrategyConfig {
    /// Parse from TOML text and validate
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: StrategyConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file and validate
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "Loaded strategy configuration");
        Ok(config)
    }

    /// Reject parameter combinations the components cannot honour
    pub fn validate(&self) -> Result<(), ConfigError> {
        let u = &self.universe;
        if u.fast_period == 0 || u.slow_period == 0 {
            return Err(ConfigError::invalid("universe.fast_period", "periods must be positive"));
        }
        if u.fast_period >= u.slow_period {
            return Err(ConfigError::invalid(
                "universe.fast_period",
                format!("{} must be shorter than slow_period {}", u.fast_period, u.slow_period),
            ));
        }
        if u.breadth == 0 || u.max_selected == 0 {
            return Err(ConfigError::invalid("universe.breadth", "breadth and max_selected must be positive"));
        }
        if u.min_price.is_sign_negative() {
            return Err(ConfigError::invalid("universe.min_price", "must not be negative"));
        }
        check_weight("universe.allocation_per_instrument", u.allocation_per_instrument)?;

        let v = &self.volatility;
        if v.lookback_days == 0 {
            return Err(ConfigError::invalid("volatility.lookback_days", "must be positive"));
        }
        if v.trigger_level < Decimal::ZERO || v.trigger_level > Decimal::ONE {
            return Err(ConfigError::invalid("volatility.trigger_level", "must lie in [0, 1]"));
        }

        let h = &self.hedge;
        check_weight("hedge.underlying_allocation", h.underlying_allocation)?;
        if h.target_dte <= 0 {
            return Err(ConfigError::invalid("hedge.target_dte", "must be positive"));
        }
        if h.dte_tolerance < 0 || h.dte_tolerance > h.target_dte {
            return Err(ConfigError::invalid(
                "hedge.dte_tolerance",
                format!("must lie in [0, target_dte={}]", h.target_dte),
            ));
        }
        if h.days_before_expiry < 0 {
            return Err(ConfigError::invalid("hedge.days_before_expiry", "must not be negative"));
        }
        if h.otm_offset.is_sign_negative() {
            return Err(ConfigError::invalid("hedge.otm_offset", "must not be negative"));
        }
        if h.shares_per_contract <= Decimal::ZERO {
            return Err(ConfigError::invalid("hedge.shares_per_contract", "must be positive"));
        }

        if self.risk.max_drawdown_pct <= Decimal::ZERO || self.risk.max_drawdown_pct >= Decimal::ONE {
            return Err(ConfigError::invalid("risk.max_drawdown_pct", "must lie in (0, 1)"));
        }

        Ok(())
    }
}

fn check_weight(field: &str, weight: Decimal) -> Result<(), ConfigError> {
    if weight <= Decimal::ZERO || weight > Decimal::ONE {
        return Err(ConfigError::invalid(field, format!("weight {} outside (0, 1]", weight)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_defaults_match_stock_parameters() {
        let config = StrategyConfig::default();
        assert_eq!(config.universe.min_price, dec!(10));
        assert_eq!(config.universe.breadth, 100);
        assert_eq!(config.universe.max_selected, 10);
        assert_eq!(config.volatility.lookback_days, 150);
        assert_eq!(config.volatility.trigger_level, dec!(0.5));
        assert_eq!(config.hedge.target_dte, 25);
        assert_eq!(config.hedge.otm_offset, dec!(0.01));
        assert_eq!(config.hedge.days_before_expiry, 2);
        assert_eq!(config.risk.max_drawdown_pct, dec!(0.10));
        assert_eq!(config.warm_up_days, 150);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = StrategyConfig::from_toml_str(
            r#"
            warm_up_days = 20

            [hedge]
            style = "covered_call"
            target_dte = 30

            [risk]
            max_drawdown_pct = 0.2
            "#,
        )
        .unwrap();

        assert_eq!(config.warm_up_days, 20);
        assert_eq!(config.hedge.style, HedgeStyle::CoveredCall);
        assert_eq!(config.hedge.target_dte, 30);
        assert_eq!(config.hedge.dte_tolerance, 7);
        assert_eq!(config.risk.max_drawdown_pct, dec!(0.2));
        assert_eq!(config.universe, UniverseConfig::default());
    }

    #[test]
    fn test_rejects_inverted_periods() {
        let err = StrategyConfig::from_toml_str(
            r#"
            [universe]
            fast_period = 200
            slow_period = 50
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_rejects_tolerance_wider_than_target() {
        let mut config = StrategyConfig::default();
        config.hedge.dte_tolerance = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_weights() {
        let mut config = StrategyConfig::default();
        config.universe.allocation_per_instrument = dec!(1.5);
        assert!(config.validate().is_err());

        let mut config = StrategyConfig::default();
        config.risk.max_drawdown_pct = Decimal::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_error() {
        let err = StrategyConfig::from_toml_str("warm_up_days = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[volatility]\nreference_symbol = \"VXX\"").unwrap();

        let config = StrategyConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.volatility.reference_symbol, "VXX");

        let missing = StrategyConfig::load_from_path("/nonexistent/trendguard.toml");
        assert!(matches!(missing, Err(ConfigError::FileNotFound(_))));
    }
}
