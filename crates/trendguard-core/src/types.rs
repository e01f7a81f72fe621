//! Domain types shared by every Trendguard component

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Instrument identifier (ticker for equities, contract id for options)
pub type Symbol = String;

/// Data resolution requested from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Minute,
    Hour,
    Daily,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Minute => write!(f, "minute"),
            Resolution::Hour => write!(f, "hour"),
            Resolution::Daily => write!(f, "daily"),
        }
    }
}

/// Per-cycle coarse market snapshot entry for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoarseFundamental {
    pub symbol: Symbol,
    /// Raw last price, used for the price floor
    pub price: Decimal,
    /// Split/dividend adjusted price, fed to the trend indicators
    pub adjusted_price: Decimal,
    /// Liquidity metric used for ranking
    pub dollar_volume: Decimal,
}

impl CoarseFundamental {
    /// Snapshot entry whose adjusted price equals the raw price
    pub fn new(symbol: impl Into<Symbol>, price: Decimal, dollar_volume: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            adjusted_price: price,
            dollar_volume,
        }
    }
}

/// Historical OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub volume: Decimal,
}

/// Option right
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionRight {
    Call,
    Put,
}

impl OptionRight {
    /// Single-letter code used in contract identifiers
    pub fn code(&self) -> char {
        match self {
            OptionRight::Call => 'C',
            OptionRight::Put => 'P',
        }
    }
}

impl fmt::Display for OptionRight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionRight::Call => write!(f, "call"),
            OptionRight::Put => write!(f, "put"),
        }
    }
}

/// Identifier of a single derivative contract
///
/// Always non-empty; "no contract" is expressed with `Option<ContractId>` or
/// the hedge state machine, never with an empty identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractId(String);

impl ContractId {
    /// Wrap an identifier. Returns `None` for an empty string.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Portfolio symbol under which the contract is held
    pub fn to_symbol(&self) -> Symbol {
        self.0.clone()
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of an option chain snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractCandidate {
    pub id: ContractId,
    pub underlying: Symbol,
    pub right: OptionRight,
    pub strike: Decimal,
    pub expiry: NaiveDate,
}

impl ContractCandidate {
    /// Build a candidate with an OCC-style identifier, e.g. `SPY240119P00450000`
    pub fn new(
        underlying: impl Into<Symbol>,
        right: OptionRight,
        strike: Decimal,
        expiry: NaiveDate,
    ) -> Self {
        let underlying = underlying.into();
        let id = Self::build_id(&underlying, right, strike, expiry);
        Self {
            id,
            underlying,
            right,
            strike,
            expiry,
        }
    }

    /// OCC-style identifier: underlying, `yymmdd`, right code, strike x1000 padded to 8 digits
    pub fn build_id(underlying: &str, right: OptionRight, strike: Decimal, expiry: NaiveDate) -> ContractId {
        let strike_milli = (strike * Decimal::ONE_THOUSAND)
            .trunc()
            .to_u64()
            .unwrap_or(0);
        ContractId(format!(
            "{}{}{}{:08}",
            underlying,
            expiry.format("%y%m%d"),
            right.code(),
            strike_milli
        ))
    }

    /// Recover the contract terms from an identifier built by [`Self::build_id`]
    pub fn from_id(id: &ContractId) -> Option<Self> {
        let raw = id.as_str();
        // yymmdd + right + 8 strike digits
        if raw.len() <= 15 || !raw.is_ascii() {
            return None;
        }
        let (underlying, tail) = raw.split_at(raw.len() - 15);
        let expiry = NaiveDate::parse_from_str(&tail[..6], "%y%m%d").ok()?;
        let right = match &tail[6..7] {
            "C" => OptionRight::Call,
            "P" => OptionRight::Put,
            _ => return None,
        };
        let strike_milli: u64 = tail[7..].parse().ok()?;
        Some(Self {
            id: id.clone(),
            underlying: underlying.to_string(),
            right,
            strike: Decimal::from(strike_milli) / Decimal::ONE_THOUSAND,
            expiry,
        })
    }

    /// Value at expiry per unit of underlying
    pub fn intrinsic_value(&self, spot: Decimal) -> Decimal {
        (-self.otm_distance(spot)).max(Decimal::ZERO)
    }

    /// Whole calendar days between the evaluation date and expiry
    pub fn days_to_expiry(&self, as_of: DateTime<Utc>) -> i64 {
        days_between(as_of, self.expiry)
    }

    /// Distance out of the money, positive when OTM
    ///
    /// Puts: `spot - strike`. Calls: `strike - spot`.
    pub fn otm_distance(&self, spot: Decimal) -> Decimal {
        match self.right {
            OptionRight::Put => spot - self.strike,
            OptionRight::Call => self.strike - spot,
        }
    }
}

/// Whole calendar days from `as_of` to `expiry` (negative once expired)
pub fn days_between(as_of: DateTime<Utc>, expiry: NaiveDate) -> i64 {
    (expiry - as_of.date_naive()).num_days()
}

/// Allocation target produced by portfolio construction or the risk overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioTarget {
    pub symbol: Symbol,
    /// Fraction of portfolio value; zero means flat
    pub weight: Decimal,
}

impl PortfolioTarget {
    pub fn new(symbol: impl Into<Symbol>, weight: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            weight,
        }
    }

    /// Zero-weight target
    pub fn liquidate(symbol: impl Into<Symbol>) -> Self {
        Self::new(symbol, Decimal::ZERO)
    }

    pub fn is_liquidation(&self) -> bool {
        self.weight.is_zero()
    }
}

/// Live position as reported by the host's portfolio accounting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    /// Unrealized profit as a fraction of cost basis (-0.15 = 15% loss)
    pub unrealized_pnl_pct: Decimal,
}

impl Holding {
    pub fn is_invested(&self) -> bool {
        !self.quantity.is_zero()
    }
}

/// Order or allocation instruction emitted by the core for the execution host
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Rebalance the instrument to a fraction of portfolio value
    SetTargetAllocation { symbol: Symbol, weight: Decimal },
    /// Flatten the instrument
    Liquidate { symbol: Symbol, reason: String },
    /// Signed market order (negative sells)
    MarketOrder {
        symbol: Symbol,
        quantity: i64,
        reason: String,
    },
}

impl Directive {
    pub fn symbol(&self) -> &str {
        match self {
            Directive::SetTargetAllocation { symbol, .. }
            | Directive::Liquidate { symbol, .. }
            | Directive::MarketOrder { symbol, .. } => symbol,
        }
    }

    pub fn is_liquidation(&self) -> bool {
        matches!(self, Directive::Liquidate { .. })
    }

    /// Hand the directive to the execution collaborator
    pub fn dispatch(self, sink: &mut dyn crate::traits::ExecutionSink) {
        match self {
            Directive::SetTargetAllocation { symbol, weight } => {
                sink.set_target_allocation(&symbol, weight)
            }
            Directive::Liquidate { symbol, reason } => sink.liquidate(&symbol, &reason),
            Directive::MarketOrder {
                symbol,
                quantity,
                reason,
            } => sink.market_order(&symbol, quantity, &reason),
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::SetTargetAllocation { symbol, weight } => {
                write!(f, "allocate {} to {}", weight, symbol)
            }
            Directive::Liquidate { symbol, reason } => write!(f, "liquidate {} ({})", symbol, reason),
            Directive::MarketOrder {
                symbol, quantity, ..
            } => write!(f, "market order {} x{}", symbol, quantity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_contract_id_rejects_empty() {
        assert!(ContractId::new("").is_none());
        assert!(ContractId::new("   ").is_none());
        assert_eq!(ContractId::new("SPY").unwrap().as_str(), "SPY");
    }

    #[test]
    fn test_occ_style_id() {
        let expiry = NaiveDate::from_ymd_opt(2024, 1, 19).unwrap();
        let contract = ContractCandidate::new("SPY", OptionRight::Put, dec!(450), expiry);
        assert_eq!(contract.id.as_str(), "SPY240119P00450000");

        let contract = ContractCandidate::new("SPY", OptionRight::Call, dec!(452.5), expiry);
        assert_eq!(contract.id.as_str(), "SPY240119C00452500");
    }

    #[test]
    fn test_parse_contract_id() {
        let expiry = NaiveDate::from_ymd_opt(2024, 1, 19).unwrap();
        let contract = ContractCandidate::new("BRK.B", OptionRight::Call, dec!(452.5), expiry);

        let parsed = ContractCandidate::from_id(&contract.id).unwrap();
        assert_eq!(parsed, contract);

        assert!(ContractCandidate::from_id(&ContractId::new("SPY").unwrap()).is_none());
        assert!(ContractCandidate::from_id(&ContractId::new("SPY240119X00450000").unwrap()).is_none());
    }

    #[test]
    fn test_intrinsic_value() {
        let expiry = NaiveDate::from_ymd_opt(2024, 1, 19).unwrap();
        let put = ContractCandidate::new("SPY", OptionRight::Put, dec!(440), expiry);
        assert_eq!(put.intrinsic_value(dec!(430)), dec!(10));
        assert_eq!(put.intrinsic_value(dec!(450)), Decimal::ZERO);
    }

    #[test]
    fn test_days_to_expiry_ignores_intraday_time() {
        let expiry = NaiveDate::from_ymd_opt(2024, 1, 19).unwrap();
        let contract = ContractCandidate::new("SPY", OptionRight::Put, dec!(450), expiry);

        let morning = Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2024, 1, 15, 23, 59, 0).unwrap();
        assert_eq!(contract.days_to_expiry(morning), 4);
        assert_eq!(contract.days_to_expiry(evening), 4);

        let after = Utc.with_ymd_and_hms(2024, 1, 22, 14, 30, 0).unwrap();
        assert_eq!(contract.days_to_expiry(after), -3);
    }

    #[test]
    fn test_otm_distance_by_right() {
        let expiry = NaiveDate::from_ymd_opt(2024, 1, 19).unwrap();
        let put = ContractCandidate::new("SPY", OptionRight::Put, dec!(440), expiry);
        let call = ContractCandidate::new("SPY", OptionRight::Call, dec!(460), expiry);

        assert_eq!(put.otm_distance(dec!(450)), dec!(10));
        assert_eq!(call.otm_distance(dec!(450)), dec!(10));
        assert_eq!(put.otm_distance(dec!(430)), dec!(-10));
    }

    #[test]
    fn test_holding_invested() {
        let mut holding = Holding {
            symbol: "AAPL".to_string(),
            quantity: dec!(10),
            avg_price: dec!(100),
            unrealized_pnl_pct: Decimal::ZERO,
        };
        assert!(holding.is_invested());
        holding.quantity = Decimal::ZERO;
        assert!(!holding.is_invested());
    }
}
