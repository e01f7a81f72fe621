use crate::types::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Universe membership delta between two selections
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityChanges {
    /// Newly selected instruments, in selection order
    pub added: Vec<Symbol>,
    /// Instruments that left the selection, in previous-selection order
    pub removed: Vec<Symbol>,
}

impl SecurityChanges {
    /// Compute the delta from `previous` to `next`
    pub fn between(previous: &[Symbol], next: &[Symbol]) -> Self {
        let prev_set: HashSet<&Symbol> = previous.iter().collect();
        let next_set: HashSet<&Symbol> = next.iter().collect();

        Self {
            added: next
                .iter()
                .filter(|s| !prev_set.contains(s))
                .cloned()
                .collect(),
            removed: previous
                .iter()
                .filter(|s| !next_set.contains(s))
                .cloned()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Result of one universe selection pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniverseSelection {
    /// Selected instruments, best liquidity first
    pub selected: Vec<Symbol>,
    /// Delta against the previous selection
    pub changes: SecurityChanges,
}

/// Latest prices delivered by the host for one tick
#[derive(Debug, Clone, Default)]
pub struct DataSlice {
    pub time: DateTime<Utc>,
    pub prices: HashMap<Symbol, Decimal>,
    /// Set by the host while the algorithm is still warming up
    pub warming_up: bool,
}

impl DataSlice {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time,
            prices: HashMap::new(),
            warming_up: false,
        }
    }

    pub fn with_price(mut self, symbol: impl Into<Symbol>, price: Decimal) -> Self {
        self.prices.insert(symbol.into(), price);
        self
    }

    /// Presence check used before acting on a tracked contract
    pub fn contains(&self, symbol: &str) -> bool {
        self.prices.contains_key(symbol)
    }

    pub fn price(&self, symbol: &str) -> Option<Decimal> {
        self.prices.get(symbol).copied()
    }
}

/// Order lifecycle status reported by the execution host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Submitted,
    PartiallyFilled,
    Filled,
    Canceled,
    Invalid,
}

impl OrderStatus {
    /// Whether no further fills will arrive for this order
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Invalid
        )
    }
}

/// Order notification from the execution host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: String,
    pub symbol: Symbol,
    pub status: OrderStatus,
    /// Signed filled quantity
    pub fill_quantity: Decimal,
    pub fill_price: Decimal,
    pub time: DateTime<Utc>,
}

impl std::fmt::Display for OrderEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {:?} qty={} @ {}",
            self.time.format("%Y-%m-%d %H:%M"),
            self.symbol,
            self.status,
            self.fill_quantity,
            self.fill_price
        )
    }
}
