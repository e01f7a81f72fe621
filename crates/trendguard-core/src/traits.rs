use crate::events::{DataSlice, OrderEvent, SecurityChanges, UniverseSelection};
use crate::types::{
    CoarseFundamental, ContractCandidate, ContractId, Directive, Holding, PortfolioTarget,
    PriceBar, Resolution, Symbol,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Market data collaborator
pub trait MarketData {
    /// Coarse snapshot of every tradable instrument at `time`
    fn coarse_snapshot(&self, time: DateTime<Utc>) -> Vec<CoarseFundamental>;

    /// Up to `lookback` bars ending at the current host time, ordered oldest to newest
    fn history(&self, symbol: &str, lookback: usize, resolution: Resolution) -> Vec<PriceBar>;

    /// Last known price
    fn price(&self, symbol: &str) -> Option<Decimal>;
}

/// Option chain collaborator
pub trait OptionChainProvider {
    /// Every contract listed for `underlying` as of `as_of`
    fn contract_list(&self, underlying: &str, as_of: DateTime<Utc>) -> Vec<ContractCandidate>;
}

/// Read-only view of brokerage accounting
pub trait PortfolioView {
    /// Get the live position for a symbol
    fn holding(&self, symbol: &str) -> Option<Holding>;

    /// Get every open position
    fn holdings(&self) -> Vec<Holding>;

    fn is_invested(&self, symbol: &str) -> bool {
        self.holding(symbol).map(|h| h.is_invested()).unwrap_or(false)
    }

    fn unrealized_pnl_pct(&self, symbol: &str) -> Decimal {
        self.holding(symbol)
            .map(|h| h.unrealized_pnl_pct)
            .unwrap_or(Decimal::ZERO)
    }

    fn quantity(&self, symbol: &str) -> Decimal {
        self.holding(symbol)
            .map(|h| h.quantity)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Order routing collaborator
pub trait ExecutionSink {
    /// Rebalance `symbol` to `weight` of portfolio value
    fn set_target_allocation(&mut self, symbol: &str, weight: Decimal);

    /// Flatten `symbol`
    fn liquidate(&mut self, symbol: &str, reason: &str);

    /// Submit a signed market order
    fn market_order(&mut self, symbol: &str, quantity: i64, reason: &str);
}

/// Live data subscription collaborator
pub trait SubscriptionManager {
    /// Register a contract for live data. Must tolerate repeated calls.
    fn subscribe(&mut self, contract: &ContractId, resolution: Resolution);
}

/// Collaborators handed to the algorithm on each callback
pub struct HostContext<'a> {
    pub market: &'a dyn MarketData,
    pub chain: &'a dyn OptionChainProvider,
    pub portfolio: &'a dyn PortfolioView,
    pub subscriptions: &'a mut dyn SubscriptionManager,
}

/// Entry points the host invokes on its own schedule
///
/// All callbacks run to completion on the host's thread and never block.
pub trait Algorithm {
    /// Unique identifier for this algorithm
    fn id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str;

    /// Universe filter: rank the coarse snapshot and report membership changes
    fn select_universe(
        &mut self,
        time: DateTime<Utc>,
        snapshot: &[CoarseFundamental],
        market: &dyn MarketData,
    ) -> UniverseSelection;

    /// Membership change callback
    fn on_securities_changed(
        &mut self,
        time: DateTime<Utc>,
        changes: &SecurityChanges,
        ctx: &mut HostContext<'_>,
    ) -> Vec<Directive>;

    /// Scheduled volatility-regime refresh; returns the new rank
    fn update_volatility_rank(&mut self, time: DateTime<Utc>, market: &dyn MarketData) -> Decimal;

    /// Per-tick data callback
    fn on_data(&mut self, slice: &DataSlice, ctx: &mut HostContext<'_>) -> Vec<Directive>;

    /// Allocation targets currently requested by the algorithm
    fn current_targets(&self) -> Vec<PortfolioTarget>;

    /// Risk-management callback: overrides that take precedence over `targets`
    fn manage_risk(
        &mut self,
        targets: &[PortfolioTarget],
        portfolio: &dyn PortfolioView,
    ) -> Vec<PortfolioTarget>;

    /// Order notification callback
    fn on_order_event(&mut self, event: &OrderEvent);

    /// Scheduled status report (logging only)
    fn report_status(
        &self,
        _time: DateTime<Utc>,
        _market: &dyn MarketData,
        _portfolio: &dyn PortfolioView,
    ) {
    }
}

/// Symbols of every invested holding
pub fn invested_symbols(portfolio: &dyn PortfolioView) -> Vec<Symbol> {
    portfolio
        .holdings()
        .into_iter()
        .filter(|h| h.is_invested())
        .map(|h| h.symbol)
        .collect()
}
