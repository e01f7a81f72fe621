//! Trend + Hedge Strategy
//!
//! Holds a core underlying, allocates equally to the most liquid instruments
//! in an uptrend, buys protection when volatility is high relative to its
//! recent range, and defers to the drawdown overlay for per-security exits.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};
use trendguard_core::{
    Algorithm, CoarseFundamental, DataSlice, Directive, HostContext, MarketData, OrderEvent,
    PortfolioTarget, PortfolioView, Resolution, SecurityChanges, StrategyConfig, Symbol,
    UniverseSelection,
};
use trendguard_risk::{DrawdownRiskOverlay, VolBar, VolatilityRankTracker};

use crate::hedge::HedgeBook;
use crate::universe::UniverseSelector;

/// Trend-following universe with volatility-triggered option hedges
pub struct TrendHedgeStrategy {
    id: String,
    name: String,
    config: StrategyConfig,
    universe: UniverseSelector,
    volatility: VolatilityRankTracker,
    hedges: HedgeBook,
    overlay: DrawdownRiskOverlay,
    members: Vec<Symbol>,
}

impl TrendHedgeStrategy {
    /// Create a new strategy; the core underlying is hedged from the start
    pub fn new(config: StrategyConfig) -> Self {
        let mut hedges = HedgeBook::new(config.hedge.clone());
        hedges.register(&config.hedge.underlying);

        Self {
            id: "trend_hedge".to_string(),
            name: "Trend Hedge Strategy".to_string(),
            universe: UniverseSelector::new(config.universe.clone()),
            volatility: VolatilityRankTracker::new(),
            overlay: DrawdownRiskOverlay::from_config(&config.risk),
            hedges,
            members: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Current trend universe, most liquid first
    pub fn members(&self) -> &[Symbol] {
        &self.members
    }

    pub fn rank(&self) -> Decimal {
        self.volatility.rank()
    }

    pub fn hedges(&self) -> &HedgeBook {
        &self.hedges
    }

    pub fn overlay(&self) -> &DrawdownRiskOverlay {
        &self.overlay
    }

    fn is_core(&self, symbol: &str) -> bool {
        symbol == self.config.hedge.underlying
    }
}

impl Algorithm for TrendHedgeStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn select_universe(
        &mut self,
        time: DateTime<Utc>,
        snapshot: &[CoarseFundamental],
        market: &dyn MarketData,
    ) -> UniverseSelection {
        let selection = self.universe.select(time, snapshot, market);
        self.members = selection.selected.clone();
        selection
    }

    fn on_securities_changed(
        &mut self,
        time: DateTime<Utc>,
        changes: &SecurityChanges,
        ctx: &mut HostContext<'_>,
    ) -> Vec<Directive> {
        let mut directives = Vec::new();

        for symbol in &changes.removed {
            directives.push(Directive::Liquidate {
                symbol: symbol.clone(),
                reason: "removed from universe".to_string(),
            });
            if !self.is_core(symbol) {
                self.hedges.force_close(symbol);
            }
        }

        let weight = self.config.universe.allocation_per_instrument;
        for symbol in &changes.added {
            directives.push(Directive::SetTargetAllocation {
                symbol: symbol.clone(),
                weight,
            });
        }

        if self.config.hedge.hedge_universe_members {
            let rank = self.volatility.rank();
            let trigger = self.config.volatility.trigger_level;
            for symbol in &changes.added {
                self.hedges.register(symbol);
                let mut slice = DataSlice::new(time);
                if let Some(price) = ctx.market.price(symbol) {
                    slice.prices.insert(symbol.clone(), price);
                }
                directives.extend(self.hedges.evaluate_one(symbol, &slice, rank, trigger, ctx));
            }
        }

        debug!(
            added = changes.added.len(),
            removed = changes.removed.len(),
            directives = directives.len(),
            "Processed universe changes"
        );
        directives
    }

    fn update_volatility_rank(&mut self, time: DateTime<Utc>, market: &dyn MarketData) -> Decimal {
        let reference = &self.config.volatility.reference_symbol;
        let bars = market.history(reference, self.config.volatility.lookback_days, Resolution::Daily);
        let current = market
            .price(reference)
            .or_else(|| bars.last().map(|b| b.close));

        let window: Vec<VolBar> = bars.iter().map(VolBar::from).collect();
        let rank = match current {
            Some(current) => self.volatility.recompute(&window, current),
            None => self.volatility.recompute(&[], Decimal::ZERO),
        };
        debug!(
            time = %time,
            reference = %reference,
            rank = %rank,
            "Volatility rank updated"
        );
        rank
    }

    fn on_data(&mut self, slice: &DataSlice, ctx: &mut HostContext<'_>) -> Vec<Directive> {
        if slice.warming_up {
            return Vec::new();
        }

        let mut directives = Vec::new();
        let underlying = &self.config.hedge.underlying;
        if !ctx.portfolio.is_invested(underlying) && !self.overlay.is_liquidated(underlying) {
            directives.push(Directive::SetTargetAllocation {
                symbol: underlying.clone(),
                weight: self.config.hedge.underlying_allocation,
            });
        }

        directives.extend(self.hedges.evaluate_all(
            slice,
            self.volatility.rank(),
            self.config.volatility.trigger_level,
            ctx,
        ));
        directives
    }

    fn current_targets(&self) -> Vec<PortfolioTarget> {
        let mut targets = vec![PortfolioTarget::new(
            self.config.hedge.underlying.clone(),
            self.config.hedge.underlying_allocation,
        )];
        targets.extend(
            self.members
                .iter()
                .filter(|s| !self.is_core(s))
                .map(|s| PortfolioTarget::new(s.clone(), self.config.universe.allocation_per_instrument)),
        );
        targets
    }

    fn manage_risk(
        &mut self,
        targets: &[PortfolioTarget],
        portfolio: &dyn PortfolioView,
    ) -> Vec<PortfolioTarget> {
        self.overlay.manage_risk(targets, portfolio)
    }

    fn on_order_event(&mut self, event: &OrderEvent) {
        info!(
            order_id = %event.order_id,
            symbol = %event.symbol,
            status = ?event.status,
            quantity = %event.fill_quantity,
            price = %event.fill_price,
            "Order event"
        );
        self.hedges.on_order_event(event);
    }

    fn report_status(&self, time: DateTime<Utc>, market: &dyn MarketData, portfolio: &dyn PortfolioView) {
        let underlying = &self.config.hedge.underlying;
        let strikes: Vec<String> = self
            .hedges
            .tracked_contracts()
            .into_iter()
            .filter(|c| portfolio.is_invested(c.id.as_str()))
            .map(|c| format!("{}@{}", c.id, c.strike))
            .collect();

        info!(
            date = %time.date_naive(),
            rank = %self.volatility.rank(),
            trigger = %self.config.volatility.trigger_level,
            underlying = %underlying,
            close = ?market.price(underlying),
            members = self.members.len(),
            hedges = ?strikes,
            "Status"
        );
    }
}
