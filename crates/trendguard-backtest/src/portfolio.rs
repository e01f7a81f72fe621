//! Simulated brokerage account
//!
//! Fills every order immediately at the current mark, charges a flat fee per
//! fill and reports each fill back as an order event.

use crate::results::TradeResult;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};
use trendguard_core::{
    ContractCandidate, ContractId, DataSlice, ExecutionSink, Holding, MarketData, OrderEvent,
    OrderStatus, PortfolioView, Symbol,
};

/// Open position in one instrument
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Position {
    /// Signed quantity, negative when short
    pub quantity: Decimal,
    pub avg_price: Decimal,
}

/// Cash, positions and trade log of a simulated account
#[derive(Debug)]
pub struct SimulatedPortfolio {
    cash: Decimal,
    positions: BTreeMap<Symbol, Position>,
    marks: HashMap<Symbol, Decimal>,
    fee_per_order: Decimal,
    option_multiplier: Decimal,
    now: DateTime<Utc>,
    events: Vec<OrderEvent>,
    trades: Vec<TradeResult>,
}

impl SimulatedPortfolio {
    /// Create a new account holding only cash
    pub fn new(initial_capital: Decimal, fee_per_order: Decimal, option_multiplier: Decimal) -> Self {
        Self {
            cash: initial_capital,
            positions: BTreeMap::new(),
            marks: HashMap::new(),
            fee_per_order,
            option_multiplier,
            now: DateTime::<Utc>::MIN_UTC,
            events: Vec::new(),
            trades: Vec::new(),
        }
    }

    pub fn set_time(&mut self, time: DateTime<Utc>) {
        self.now = time;
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn mark(&self, symbol: &str) -> Option<Decimal> {
        self.marks.get(symbol).copied()
    }

    pub fn trades(&self) -> &[TradeResult] {
        &self.trades
    }

    pub fn into_trades(self) -> Vec<TradeResult> {
        self.trades
    }

    /// Order events produced since the last drain, in fill order
    pub fn drain_events(&mut self) -> Vec<OrderEvent> {
        std::mem::take(&mut self.events)
    }

    /// Take this tick's prices, falling back to the last known price for
    /// held instruments that did not print
    pub fn refresh_marks(&mut self, slice: &DataSlice, market: &dyn MarketData) {
        for (symbol, price) in &slice.prices {
            self.marks.insert(symbol.clone(), *price);
        }
        for symbol in self.positions.keys() {
            if slice.contains(symbol) {
                continue;
            }
            if let Some(price) = market.price(symbol) {
                self.marks.insert(symbol.clone(), price);
            }
        }
    }

    /// Cash plus the marked value of every position
    pub fn total_value(&self) -> Decimal {
        let positions: Decimal = self
            .positions
            .iter()
            .map(|(symbol, p)| {
                let mark = self.marks.get(symbol).copied().unwrap_or(p.avg_price);
                p.quantity * mark * self.multiplier(symbol)
            })
            .sum();
        self.cash + positions
    }

    /// Close expired option positions at intrinsic value
    pub fn settle_expired(&mut self, market: &dyn MarketData) {
        let expired: Vec<(Symbol, ContractCandidate)> = self
            .positions
            .keys()
            .filter_map(|symbol| {
                let contract = ContractCandidate::from_id(&ContractId::new(symbol.as_str())?)?;
                (contract.days_to_expiry(self.now) < 0).then(|| (symbol.clone(), contract))
            })
            .collect();

        for (symbol, contract) in expired {
            let spot = market.price(&contract.underlying).unwrap_or(Decimal::ZERO);
            let settlement = contract.intrinsic_value(spot);
            let quantity = self.positions.get(&symbol).map(|p| p.quantity).unwrap_or_default();
            info!(
                contract = %symbol,
                quantity = %quantity,
                settlement = %settlement,
                "Option expired"
            );
            self.marks.insert(symbol.clone(), settlement);
            self.fill(&symbol, -quantity, settlement, Decimal::ZERO, "expired");
        }
    }

    /// Flatten every open position at its current mark
    pub fn close_all(&mut self, reason: &str) {
        let symbols: Vec<Symbol> = self.positions.keys().cloned().collect();
        for symbol in symbols {
            self.liquidate(&symbol, reason);
        }
    }

    fn multiplier(&self, symbol: &str) -> Decimal {
        let is_option = ContractId::new(symbol)
            .and_then(|id| ContractCandidate::from_id(&id))
            .is_some();
        if is_option {
            self.option_multiplier
        } else {
            Decimal::ONE
        }
    }

    fn reject(&mut self, symbol: &str, reason: &str) {
        warn!(symbol = %symbol, reason = %reason, "Order rejected, no price");
        self.events.push(OrderEvent {
            order_id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            status: OrderStatus::Invalid,
            fill_quantity: Decimal::ZERO,
            fill_price: Decimal::ZERO,
            time: self.now,
        });
    }

    /// Execute against the mark, if the instrument has one
    fn execute(&mut self, symbol: &str, quantity: Decimal, reason: &str) {
        if quantity.is_zero() {
            return;
        }
        match self.mark(symbol) {
            Some(price) => self.fill(symbol, quantity, price, self.fee_per_order, reason),
            None => self.reject(symbol, reason),
        }
    }

    fn fill(&mut self, symbol: &str, quantity: Decimal, price: Decimal, fee: Decimal, reason: &str) {
        let multiplier = self.multiplier(symbol);
        let position = self.positions.entry(symbol.to_string()).or_default();

        let mut realized = Decimal::ZERO;
        let same_direction = position.quantity.is_zero()
            || position.quantity.is_sign_positive() == quantity.is_sign_positive();
        if same_direction {
            let total_cost = position.quantity * position.avg_price + quantity * price;
            let new_quantity = position.quantity + quantity;
            if !new_quantity.is_zero() {
                position.avg_price = total_cost / new_quantity;
            }
        } else {
            let closed = quantity.abs().min(position.quantity.abs());
            let direction = if position.quantity.is_sign_positive() {
                Decimal::ONE
            } else {
                Decimal::NEGATIVE_ONE
            };
            realized = (price - position.avg_price) * closed * direction * multiplier;
            if quantity.abs() > position.quantity.abs() {
                // Flipped through zero
                position.avg_price = price;
            }
        }
        position.quantity += quantity;
        let flat = position.quantity.is_zero();
        if flat {
            self.positions.remove(symbol);
        }

        let notional = quantity * price * multiplier;
        self.cash -= notional + fee;

        debug!(
            symbol = %symbol,
            quantity = %quantity,
            price = %price,
            realized = %realized,
            reason = %reason,
            "Simulated fill"
        );

        let order_id = uuid::Uuid::new_v4().to_string();
        self.trades.push(TradeResult {
            id: order_id.clone(),
            symbol: symbol.to_string(),
            is_buy: quantity.is_sign_positive(),
            quantity: quantity.abs(),
            price,
            notional: notional.abs(),
            fees: fee,
            realized_pnl: realized,
            timestamp: self.now,
            reason: reason.to_string(),
        });
        self.events.push(OrderEvent {
            order_id,
            symbol: symbol.to_string(),
            status: OrderStatus::Filled,
            fill_quantity: quantity,
            fill_price: price,
            time: self.now,
        });
    }
}

impl PortfolioView for SimulatedPortfolio {
    fn holding(&self, symbol: &str) -> Option<Holding> {
        let position = self.positions.get(symbol)?;
        let mark = self.mark(symbol).unwrap_or(position.avg_price);
        let unrealized_pnl_pct = if position.avg_price.is_zero() {
            Decimal::ZERO
        } else if position.quantity.is_sign_negative() {
            (position.avg_price - mark) / position.avg_price
        } else {
            (mark - position.avg_price) / position.avg_price
        };
        Some(Holding {
            symbol: symbol.to_string(),
            quantity: position.quantity,
            avg_price: position.avg_price,
            unrealized_pnl_pct,
        })
    }

    fn holdings(&self) -> Vec<Holding> {
        self.positions
            .keys()
            .filter_map(|symbol| self.holding(symbol))
            .collect()
    }
}

impl ExecutionSink for SimulatedPortfolio {
    fn set_target_allocation(&mut self, symbol: &str, weight: Decimal) {
        let Some(price) = self.mark(symbol).filter(|p| *p > Decimal::ZERO) else {
            self.reject(symbol, "target allocation");
            return;
        };
        let unit_value = price * self.multiplier(symbol);
        let target = (self.total_value() * weight / unit_value).floor();
        let current = self.quantity(symbol);
        self.execute(symbol, target - current, "target allocation");
    }

    fn liquidate(&mut self, symbol: &str, reason: &str) {
        let quantity = self.quantity(symbol);
        self.execute(symbol, -quantity, reason);
    }

    fn market_order(&mut self, symbol: &str, quantity: i64, reason: &str) {
        self.execute(symbol, Decimal::from(quantity), reason);
    }
}
