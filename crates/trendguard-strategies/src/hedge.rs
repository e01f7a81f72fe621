//! Hedge lifecycle
//!
//! One state machine per hedged underlying:
//! `NoHedge -> Requesting -> Holding -> Closing -> NoHedge`.
//!
//! A hedge is requested when the volatility rank is elevated, a contract is
//! chosen and subscribed, the order is placed once the contract shows up in
//! the data feed, and the position is closed a configured number of days
//! before expiry.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use trendguard_core::{
    days_between, ContractCandidate, ContractId, DataSlice, Directive, HedgeConfig, HedgeStyle,
    HostContext, OptionChainProvider, OptionRight, OrderEvent, OrderStatus, PortfolioView,
    SubscriptionManager, Symbol,
};

use crate::contract_selector::{ContractQuery, ContractSelector};

/// The hedge's view of a chosen contract
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedContract {
    pub id: ContractId,
    pub right: OptionRight,
    pub strike: Decimal,
    pub expiry: NaiveDate,
}

impl TrackedContract {
    pub fn days_to_expiry(&self, as_of: DateTime<Utc>) -> i64 {
        days_between(as_of, self.expiry)
    }

    pub fn symbol(&self) -> Symbol {
        self.id.to_symbol()
    }
}

impl From<&ContractCandidate> for TrackedContract {
    fn from(c: &ContractCandidate) -> Self {
        Self {
            id: c.id.clone(),
            right: c.right,
            strike: c.strike,
            expiry: c.expiry,
        }
    }
}

/// Hedge state for one underlying
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HedgeState {
    #[default]
    NoHedge,
    /// Waiting for a contract to be chosen and then filled
    Requesting { candidate: Option<TrackedContract> },
    Holding(TrackedContract),
    /// Exit requested; waits until the contract is present in the feed
    Closing(TrackedContract),
}

impl HedgeState {
    /// Contract referenced by the state, if any
    pub fn contract(&self) -> Option<&TrackedContract> {
        match self {
            HedgeState::NoHedge => None,
            HedgeState::Requesting { candidate } => candidate.as_ref(),
            HedgeState::Holding(c) | HedgeState::Closing(c) => Some(c),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HedgeState::NoHedge => "no_hedge",
            HedgeState::Requesting { .. } => "requesting",
            HedgeState::Holding(_) => "holding",
            HedgeState::Closing(_) => "closing",
        }
    }
}

/// Inputs for one evaluation of one lifecycle
pub struct HedgeContext<'a> {
    pub time: DateTime<Utc>,
    pub rank: Decimal,
    pub trigger: Decimal,
    /// Underlying price, when known
    pub spot: Option<Decimal>,
    pub slice: &'a DataSlice,
    pub portfolio: &'a dyn PortfolioView,
    pub chain: &'a dyn OptionChainProvider,
    pub subscriptions: &'a mut dyn SubscriptionManager,
    pub selector: &'a mut ContractSelector,
    pub config: &'a HedgeConfig,
}

/// State machine for a single underlying
#[derive(Debug, Clone)]
pub struct HedgeLifecycle {
    underlying: Symbol,
    state: HedgeState,
    order_pending: bool,
    /// Set once the underlying left the universe
    retiring: bool,
}

impl HedgeLifecycle {
    /// Create a new lifecycle in `NoHedge`
    pub fn new(underlying: impl Into<Symbol>) -> Self {
        Self {
            underlying: underlying.into(),
            state: HedgeState::NoHedge,
            order_pending: false,
            retiring: false,
        }
    }

    pub fn underlying(&self) -> &str {
        &self.underlying
    }

    pub fn state(&self) -> &HedgeState {
        &self.state
    }

    pub fn is_order_pending(&self) -> bool {
        self.order_pending
    }

    pub fn is_retiring(&self) -> bool {
        self.retiring
    }

    /// Advance the state machine by one cycle
    pub fn evaluate(&mut self, ctx: &mut HedgeContext<'_>) -> Vec<Directive> {
        let mut directives = Vec::new();

        if self.state == HedgeState::NoHedge {
            if self.retiring || ctx.rank <= ctx.trigger {
                return directives;
            }
            info!(
                underlying = %self.underlying,
                rank = %ctx.rank,
                trigger = %ctx.trigger,
                "Volatility elevated, requesting hedge"
            );
            self.transition(HedgeState::Requesting { candidate: None });
        }

        if let HedgeState::Requesting { candidate: None } = self.state {
            self.request_candidate(ctx);
            // The subscription has to deliver data before an order can be placed
            return directives;
        }

        if let HedgeState::Requesting {
            candidate: Some(contract),
        } = &self.state
        {
            let contract = contract.clone();
            if ctx.portfolio.is_invested(contract.id.as_str()) {
                self.order_pending = false;
                self.transition(HedgeState::Holding(contract));
            } else if contract.days_to_expiry(ctx.time) <= ctx.config.days_before_expiry {
                info!(
                    underlying = %self.underlying,
                    contract = %contract.id,
                    "Candidate too close to expiry, discarding"
                );
                self.order_pending = false;
                self.transition(HedgeState::NoHedge);
                return directives;
            } else {
                if let Some(order) = self.open_order(&contract, ctx) {
                    self.order_pending = true;
                    directives.push(order);
                }
                return directives;
            }
        }

        if let HedgeState::Holding(contract) = &self.state {
            let contract = contract.clone();
            if !ctx.portfolio.is_invested(contract.id.as_str()) {
                warn!(
                    underlying = %self.underlying,
                    contract = %contract.id,
                    "Hedge no longer held, resetting"
                );
                self.transition(HedgeState::NoHedge);
                return directives;
            }
            if contract.days_to_expiry(ctx.time) > ctx.config.days_before_expiry {
                return directives;
            }
            self.transition(HedgeState::Closing(contract));
        }

        if let HedgeState::Closing(contract) = &self.state {
            let contract = contract.clone();
            if ctx.slice.contains(contract.id.as_str()) {
                directives.push(Directive::Liquidate {
                    symbol: contract.symbol(),
                    reason: if self.retiring {
                        "underlying left universe".to_string()
                    } else {
                        "too close to expiration".to_string()
                    },
                });
                self.order_pending = false;
                self.transition(HedgeState::NoHedge);
            } else {
                warn!(
                    underlying = %self.underlying,
                    contract = %contract.id,
                    "Contract missing from data feed, retrying close"
                );
            }
        }

        directives
    }

    /// Abandon the hedge because the underlying left the universe
    pub fn force_close(&mut self) {
        self.retiring = true;
        match &self.state {
            HedgeState::Holding(c) | HedgeState::Closing(c) => {
                let contract = c.clone();
                self.transition(HedgeState::Closing(contract));
            }
            HedgeState::Requesting {
                candidate: Some(c),
            } if self.order_pending => {
                // The order may still fill, so the contract has to be wound down
                let contract = c.clone();
                self.transition(HedgeState::Closing(contract));
            }
            HedgeState::Requesting { .. } => {
                self.order_pending = false;
                self.transition(HedgeState::NoHedge);
            }
            HedgeState::NoHedge => {}
        }
    }

    /// Undo a pending retirement when the underlying re-enters the universe
    pub fn reinstate(&mut self) {
        self.retiring = false;
    }

    /// Clear the pending flag once the tracked contract's order is done
    ///
    /// A fill while requesting moves straight to `Holding`, so a retirement
    /// arriving before the next cycle still closes the position.
    pub fn on_order_event(&mut self, event: &OrderEvent) -> bool {
        let tracks = self
            .state
            .contract()
            .map(|c| c.id.as_str() == event.symbol)
            .unwrap_or(false);
        if !tracks {
            return false;
        }
        if self.order_pending && event.status.is_terminal() {
            debug!(
                underlying = %self.underlying,
                contract = %event.symbol,
                status = ?event.status,
                "Hedge order settled"
            );
            self.order_pending = false;
        }
        let filled = matches!(
            event.status,
            OrderStatus::Filled | OrderStatus::PartiallyFilled
        );
        if filled {
            if let HedgeState::Requesting {
                candidate: Some(contract),
            } = &self.state
            {
                let contract = contract.clone();
                self.transition(HedgeState::Holding(contract));
            }
        }
        true
    }

    fn request_candidate(&mut self, ctx: &mut HedgeContext<'_>) {
        let Some(spot) = ctx.spot else {
            debug!(underlying = %self.underlying, "No price for underlying, retrying next cycle");
            return;
        };
        let query = ContractQuery::for_hedge(ctx.config);
        match ctx.selector.select(
            &self.underlying,
            ctx.time,
            spot,
            &query,
            ctx.chain,
            &mut *ctx.subscriptions,
        ) {
            Some(candidate) => {
                info!(
                    underlying = %self.underlying,
                    contract = %candidate.id,
                    strike = %candidate.strike,
                    expiry = %candidate.expiry,
                    "Hedge contract chosen"
                );
                self.state = HedgeState::Requesting {
                    candidate: Some(TrackedContract::from(&candidate)),
                };
            }
            None => {
                debug!(underlying = %self.underlying, "No hedge candidate, retrying next cycle");
            }
        }
    }

    fn open_order(&self, contract: &TrackedContract, ctx: &HedgeContext<'_>) -> Option<Directive> {
        if self.order_pending {
            return None;
        }
        if !ctx.slice.contains(contract.id.as_str()) {
            debug!(contract = %contract.id, "Contract not in data feed yet");
            return None;
        }
        let quantity = contract_quantity(
            ctx.portfolio.quantity(&self.underlying),
            ctx.config.shares_per_contract,
            ctx.config.style,
        );
        if quantity == 0 {
            debug!(underlying = %self.underlying, "Underlying position too small to hedge");
            return None;
        }
        Some(Directive::MarketOrder {
            symbol: contract.symbol(),
            quantity,
            reason: format!("hedge {}", self.underlying),
        })
    }

    fn transition(&mut self, next: HedgeState) {
        info!(
            underlying = %self.underlying,
            from = self.state.name(),
            to = next.name(),
            contract = ?next.contract().map(|c| c.id.as_str()),
            "Hedge state transition"
        );
        self.state = next;
    }
}

/// Signed number of contracts covering `shares` of the underlying
///
/// Protective puts are bought, covered calls are sold.
pub fn contract_quantity(shares: Decimal, shares_per_contract: Decimal, style: HedgeStyle) -> i64 {
    if shares_per_contract <= Decimal::ZERO {
        return 0;
    }
    let contracts = (shares.abs() / shares_per_contract)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
        .to_i64()
        .unwrap_or(0);
    match style {
        HedgeStyle::ProtectivePut => contracts,
        HedgeStyle::CoveredCall => -contracts,
    }
}

/// One lifecycle per hedged underlying
#[derive(Debug)]
pub struct HedgeBook {
    config: HedgeConfig,
    selector: ContractSelector,
    lifecycles: BTreeMap<Symbol, HedgeLifecycle>,
}

impl HedgeBook {
    /// Create a new, empty book
    pub fn new(config: HedgeConfig) -> Self {
        Self {
            config,
            selector: ContractSelector::new(),
            lifecycles: BTreeMap::new(),
        }
    }

    /// Start hedging `underlying`; no effect if already tracked
    pub fn register(&mut self, underlying: &str) {
        match self.lifecycles.get_mut(underlying) {
            Some(lifecycle) => lifecycle.reinstate(),
            None => {
                debug!(underlying = %underlying, "Registered hedge underlying");
                self.lifecycles
                    .insert(underlying.to_string(), HedgeLifecycle::new(underlying));
            }
        }
    }

    /// Wind down the hedge on `underlying`; the lifecycle is dropped once flat
    pub fn force_close(&mut self, underlying: &str) {
        if let Some(lifecycle) = self.lifecycles.get_mut(underlying) {
            lifecycle.force_close();
        }
        self.prune();
    }

    /// Evaluate every lifecycle in underlying order
    pub fn evaluate_all(
        &mut self,
        slice: &DataSlice,
        rank: Decimal,
        trigger: Decimal,
        host: &mut HostContext<'_>,
    ) -> Vec<Directive> {
        let underlyings: Vec<Symbol> = self.lifecycles.keys().cloned().collect();
        let mut directives = Vec::new();
        for underlying in underlyings {
            directives.extend(self.evaluate_one(&underlying, slice, rank, trigger, host));
        }
        self.prune();
        directives
    }

    /// Evaluate a single underlying, e.g. right after it joins the universe
    pub fn evaluate_one(
        &mut self,
        underlying: &str,
        slice: &DataSlice,
        rank: Decimal,
        trigger: Decimal,
        host: &mut HostContext<'_>,
    ) -> Vec<Directive> {
        let Some(lifecycle) = self.lifecycles.get_mut(underlying) else {
            return Vec::new();
        };
        let spot = slice
            .price(underlying)
            .or_else(|| host.market.price(underlying));
        let mut ctx = HedgeContext {
            time: slice.time,
            rank,
            trigger,
            spot,
            slice,
            portfolio: host.portfolio,
            chain: host.chain,
            subscriptions: &mut *host.subscriptions,
            selector: &mut self.selector,
            config: &self.config,
        };
        lifecycle.evaluate(&mut ctx)
    }

    /// Route an order event to the lifecycle tracking its contract
    pub fn on_order_event(&mut self, event: &OrderEvent) {
        for lifecycle in self.lifecycles.values_mut() {
            if lifecycle.on_order_event(event) {
                break;
            }
        }
    }

    pub fn lifecycle(&self, underlying: &str) -> Option<&HedgeLifecycle> {
        self.lifecycles.get(underlying)
    }

    pub fn underlyings(&self) -> impl Iterator<Item = &Symbol> {
        self.lifecycles.keys()
    }

    /// Contracts currently referenced by any lifecycle
    pub fn tracked_contracts(&self) -> Vec<&TrackedContract> {
        self.lifecycles
            .values()
            .filter_map(|l| l.state().contract())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lifecycles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lifecycles.is_empty()
    }

    fn prune(&mut self) {
        self.lifecycles.retain(|underlying, lifecycle| {
            let done = lifecycle.is_retiring() && lifecycle.state() == &HedgeState::NoHedge;
            if done {
                debug!(underlying = %underlying, "Hedge lifecycle retired");
            }
            !done
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use trendguard_core::{
        CoarseFundamental, Holding, MarketData, PriceBar, Resolution,
    };

    struct MockChain {
        contracts: Vec<ContractCandidate>,
    }

    impl OptionChainProvider for MockChain {
        fn contract_list(&self, underlying: &str, _as_of: DateTime<Utc>) -> Vec<ContractCandidate> {
            self.contracts
                .iter()
                .filter(|c| c.underlying == underlying)
                .cloned()
                .collect()
        }
    }

    #[derive(Default)]
    struct MockSubscriptions {
        calls: usize,
    }

    impl SubscriptionManager for MockSubscriptions {
        fn subscribe(&mut self, _contract: &ContractId, _resolution: Resolution) {
            self.calls += 1;
        }
    }

    #[derive(Default)]
    struct MockPortfolio {
        quantities: HashMap<Symbol, Decimal>,
    }

    impl MockPortfolio {
        fn set(&mut self, symbol: &str, quantity: Decimal) {
            self.quantities.insert(symbol.to_string(), quantity);
        }
    }

    impl PortfolioView for MockPortfolio {
        fn holding(&self, symbol: &str) -> Option<Holding> {
            self.quantities.get(symbol).map(|q| Holding {
                symbol: symbol.to_string(),
                quantity: *q,
                avg_price: dec!(1),
                unrealized_pnl_pct: Decimal::ZERO,
            })
        }

        fn holdings(&self) -> Vec<Holding> {
            self.quantities
                .keys()
                .filter_map(|s| self.holding(s))
                .collect()
        }
    }

    struct MockMarket;

    impl MarketData for MockMarket {
        fn coarse_snapshot(&self, _time: DateTime<Utc>) -> Vec<CoarseFundamental> {
            Vec::new()
        }

        fn history(&self, _symbol: &str, _lookback: usize, _resolution: Resolution) -> Vec<PriceBar> {
            Vec::new()
        }

        fn price(&self, _symbol: &str) -> Option<Decimal> {
            None
        }
    }

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap() + Duration::days(n)
    }

    fn spy_put() -> ContractCandidate {
        ContractCandidate::new(
            "SPY",
            OptionRight::Put,
            dec!(420),
            day(0).date_naive() + Duration::days(25),
        )
    }

    struct Fixture {
        chain: MockChain,
        subs: MockSubscriptions,
        selector: ContractSelector,
        portfolio: MockPortfolio,
        config: HedgeConfig,
    }

    impl Fixture {
        fn new(contracts: Vec<ContractCandidate>) -> Self {
            let mut portfolio = MockPortfolio::default();
            portfolio.set("SPY", dec!(900));
            Self {
                chain: MockChain { contracts },
                subs: MockSubscriptions::default(),
                selector: ContractSelector::new(),
                portfolio,
                config: HedgeConfig::default(),
            }
        }

        fn run(
            &mut self,
            lifecycle: &mut HedgeLifecycle,
            slice: &DataSlice,
            rank: Decimal,
        ) -> Vec<Directive> {
            let mut ctx = HedgeContext {
                time: slice.time,
                rank,
                trigger: dec!(0.5),
                spot: slice.price("SPY"),
                slice,
                portfolio: &self.portfolio,
                chain: &self.chain,
                subscriptions: &mut self.subs,
                selector: &mut self.selector,
                config: &self.config,
            };
            lifecycle.evaluate(&mut ctx)
        }
    }

    fn slice(n: i64, with_contract: bool) -> DataSlice {
        let slice = DataSlice::new(day(n)).with_price("SPY", dec!(450));
        if with_contract {
            slice.with_price(spy_put().id.as_str(), dec!(3))
        } else {
            slice
        }
    }

    fn filled(contract: &ContractCandidate, status: OrderStatus) -> OrderEvent {
        OrderEvent {
            order_id: "1".to_string(),
            symbol: contract.id.to_symbol(),
            status,
            fill_quantity: dec!(10),
            fill_price: dec!(3),
            time: day(0),
        }
    }

    #[test]
    fn test_low_rank_stays_idle() {
        let mut fx = Fixture::new(vec![spy_put()]);
        let mut lifecycle = HedgeLifecycle::new("SPY");

        assert!(fx.run(&mut lifecycle, &slice(0, true), dec!(0.5)).is_empty());
        assert_eq!(lifecycle.state(), &HedgeState::NoHedge);
    }

    #[test]
    fn test_full_lifecycle() {
        let put = spy_put();
        let mut fx = Fixture::new(vec![put.clone()]);
        let mut lifecycle = HedgeLifecycle::new("SPY");

        // Cycle 1: choose and subscribe, no order yet
        assert!(fx.run(&mut lifecycle, &slice(0, false), dec!(0.8)).is_empty());
        assert!(matches!(
            lifecycle.state(),
            HedgeState::Requesting { candidate: Some(_) }
        ));
        assert_eq!(fx.subs.calls, 1);

        // Cycle 2: contract not in feed yet
        assert!(fx.run(&mut lifecycle, &slice(0, false), dec!(0.8)).is_empty());

        // Cycle 3: contract present, order 900 / 90 = 10 contracts
        let out = fx.run(&mut lifecycle, &slice(1, true), dec!(0.8));
        assert_eq!(
            out,
            vec![Directive::MarketOrder {
                symbol: put.id.to_symbol(),
                quantity: 10,
                reason: "hedge SPY".to_string(),
            }]
        );
        assert!(lifecycle.is_order_pending());

        // Pending: no duplicate order
        assert!(fx.run(&mut lifecycle, &slice(1, true), dec!(0.8)).is_empty());

        fx.portfolio.set(put.id.as_str(), dec!(10));
        lifecycle.on_order_event(&filled(&put, OrderStatus::Filled));
        assert!(!lifecycle.is_order_pending());

        fx.run(&mut lifecycle, &slice(2, true), dec!(0.1));
        assert!(matches!(lifecycle.state(), HedgeState::Holding(_)));

        // 22 days left: still holding
        assert!(fx.run(&mut lifecycle, &slice(3, true), dec!(0.1)).is_empty());

        // 2 days left: close
        let out = fx.run(&mut lifecycle, &slice(23, true), dec!(0.9));
        assert_eq!(out.len(), 1);
        assert!(out[0].is_liquidation());
        assert_eq!(lifecycle.state(), &HedgeState::NoHedge);
        assert_eq!(fx.subs.calls, 1);
    }

    #[test]
    fn test_no_put_in_band_keeps_requesting() {
        let far = ContractCandidate::new(
            "SPY",
            OptionRight::Put,
            dec!(420),
            day(0).date_naive() + Duration::days(90),
        );
        let mut fx = Fixture::new(vec![far]);
        let mut lifecycle = HedgeLifecycle::new("SPY");

        for n in 0..3 {
            assert!(fx.run(&mut lifecycle, &slice(n, true), dec!(0.9)).is_empty());
            assert_eq!(lifecycle.state(), &HedgeState::Requesting { candidate: None });
        }
        assert_eq!(fx.subs.calls, 0);
    }

    #[test]
    fn test_canceled_order_retries() {
        let put = spy_put();
        let mut fx = Fixture::new(vec![put.clone()]);
        let mut lifecycle = HedgeLifecycle::new("SPY");

        fx.run(&mut lifecycle, &slice(0, true), dec!(0.9));
        assert_eq!(fx.run(&mut lifecycle, &slice(0, true), dec!(0.9)).len(), 1);

        lifecycle.on_order_event(&filled(&put, OrderStatus::Canceled));
        assert!(!lifecycle.is_order_pending());
        assert_eq!(fx.run(&mut lifecycle, &slice(1, true), dec!(0.9)).len(), 1);
    }

    #[test]
    fn test_candidate_near_expiry_discarded() {
        let put = spy_put();
        let mut fx = Fixture::new(vec![put]);
        let mut lifecycle = HedgeLifecycle::new("SPY");

        fx.run(&mut lifecycle, &slice(0, false), dec!(0.9));
        assert!(fx.run(&mut lifecycle, &slice(23, true), dec!(0.9)).is_empty());
        assert_eq!(lifecycle.state(), &HedgeState::NoHedge);
    }

    #[test]
    fn test_close_waits_for_feed() {
        let put = spy_put();
        let mut fx = Fixture::new(vec![put.clone()]);
        let mut lifecycle = HedgeLifecycle::new("SPY");
        fx.run(&mut lifecycle, &slice(0, true), dec!(0.9));
        fx.portfolio.set(put.id.as_str(), dec!(10));
        fx.run(&mut lifecycle, &slice(1, true), dec!(0.9));
        assert!(matches!(lifecycle.state(), HedgeState::Holding(_)));

        assert!(fx.run(&mut lifecycle, &slice(23, false), dec!(0.9)).is_empty());
        assert!(matches!(lifecycle.state(), HedgeState::Closing(_)));

        let out = fx.run(&mut lifecycle, &slice(23, true), dec!(0.9));
        assert_eq!(out.len(), 1);
        assert_eq!(lifecycle.state(), &HedgeState::NoHedge);
    }

    #[test]
    fn test_external_liquidation_resets() {
        let put = spy_put();
        let mut fx = Fixture::new(vec![put.clone()]);
        let mut lifecycle = HedgeLifecycle::new("SPY");
        fx.run(&mut lifecycle, &slice(0, true), dec!(0.9));
        fx.portfolio.set(put.id.as_str(), dec!(10));
        fx.run(&mut lifecycle, &slice(1, true), dec!(0.9));

        fx.portfolio.set(put.id.as_str(), Decimal::ZERO);
        assert!(fx.run(&mut lifecycle, &slice(2, true), dec!(0.1)).is_empty());
        assert_eq!(lifecycle.state(), &HedgeState::NoHedge);
    }

    #[test]
    fn test_never_tracks_two_contracts() {
        let near = spy_put();
        let other = ContractCandidate::new(
            "SPY",
            OptionRight::Put,
            dec!(425),
            day(0).date_naive() + Duration::days(25),
        );
        let mut fx = Fixture::new(vec![near, other.clone()]);
        let mut lifecycle = HedgeLifecycle::new("SPY");

        let mut seen: Vec<ContractId> = Vec::new();
        for n in 0..30 {
            let s = slice(n, true).with_price(other.id.as_str(), dec!(4));
            fx.run(&mut lifecycle, &s, dec!(0.9));
            if let Some(c) = lifecycle.state().contract() {
                if !seen.contains(&c.id) {
                    seen.push(c.id.clone());
                }
                if lifecycle.is_order_pending() {
                    fx.portfolio.set(c.id.as_str(), dec!(10));
                }
                // Closing always happens before expiry
                assert!(c.days_to_expiry(day(n)) > 0);
            }
        }
        // Strike closest to spot wins, and no second contract is ever picked
        assert_eq!(seen, vec![other.id]);
    }

    #[test]
    fn test_force_close_from_holding() {
        let put = spy_put();
        let mut fx = Fixture::new(vec![put.clone()]);
        let mut lifecycle = HedgeLifecycle::new("SPY");
        fx.run(&mut lifecycle, &slice(0, true), dec!(0.9));
        fx.portfolio.set(put.id.as_str(), dec!(10));
        fx.run(&mut lifecycle, &slice(1, true), dec!(0.9));

        lifecycle.force_close();
        assert!(matches!(lifecycle.state(), HedgeState::Closing(_)));

        let out = fx.run(&mut lifecycle, &slice(2, true), dec!(0.9));
        assert_eq!(
            out,
            vec![Directive::Liquidate {
                symbol: put.id.to_symbol(),
                reason: "underlying left universe".to_string(),
            }]
        );
        // Retired lifecycles do not request again
        assert!(fx.run(&mut lifecycle, &slice(3, true), dec!(0.9)).is_empty());
        assert_eq!(lifecycle.state(), &HedgeState::NoHedge);
    }

    #[test]
    fn test_force_close_while_requesting() {
        let mut fx = Fixture::new(vec![spy_put()]);
        let mut lifecycle = HedgeLifecycle::new("SPY");
        fx.run(&mut lifecycle, &slice(0, false), dec!(0.9));

        lifecycle.force_close();
        assert_eq!(lifecycle.state(), &HedgeState::NoHedge);
    }

    #[test]
    fn test_force_close_after_same_tick_fill_liquidates() {
        let put = spy_put();
        let mut fx = Fixture::new(vec![put.clone()]);
        let mut lifecycle = HedgeLifecycle::new("SPY");
        fx.run(&mut lifecycle, &slice(0, false), dec!(0.9));
        assert_eq!(fx.run(&mut lifecycle, &slice(1, true), dec!(0.9)).len(), 1);

        // Filled before the next cycle could observe the position
        fx.portfolio.set(put.id.as_str(), dec!(10));
        lifecycle.on_order_event(&filled(&put, OrderStatus::Filled));
        assert!(matches!(lifecycle.state(), HedgeState::Holding(_)));

        lifecycle.force_close();
        assert!(matches!(lifecycle.state(), HedgeState::Closing(_)));

        let closes: Vec<Directive> = (2..6)
            .flat_map(|n| fx.run(&mut lifecycle, &slice(n, true), dec!(0.9)))
            .collect();
        assert_eq!(
            closes,
            vec![Directive::Liquidate {
                symbol: put.id.to_symbol(),
                reason: "underlying left universe".to_string(),
            }]
        );
        assert_eq!(lifecycle.state(), &HedgeState::NoHedge);
    }

    #[test]
    fn test_force_close_with_order_in_flight_liquidates() {
        let put = spy_put();
        let mut fx = Fixture::new(vec![put.clone()]);
        let mut lifecycle = HedgeLifecycle::new("SPY");
        fx.run(&mut lifecycle, &slice(0, false), dec!(0.9));
        fx.run(&mut lifecycle, &slice(1, true), dec!(0.9));
        assert!(lifecycle.is_order_pending());

        lifecycle.force_close();
        assert!(matches!(lifecycle.state(), HedgeState::Closing(_)));

        let out = fx.run(&mut lifecycle, &slice(2, true), dec!(0.9));
        assert_eq!(out.len(), 1);
        assert!(out[0].is_liquidation());
        assert_eq!(lifecycle.state(), &HedgeState::NoHedge);
    }

    #[test]
    fn test_contract_quantity() {
        assert_eq!(contract_quantity(dec!(900), dec!(90), HedgeStyle::ProtectivePut), 10);
        assert_eq!(contract_quantity(dec!(940), dec!(90), HedgeStyle::ProtectivePut), 10);
        assert_eq!(contract_quantity(dec!(40), dec!(90), HedgeStyle::ProtectivePut), 0);
        assert_eq!(contract_quantity(dec!(900), dec!(90), HedgeStyle::CoveredCall), -10);
        assert_eq!(contract_quantity(dec!(900), Decimal::ZERO, HedgeStyle::CoveredCall), 0);
    }

    #[test]
    fn test_book_routes_and_retires() {
        let put = spy_put();
        let chain = MockChain {
            contracts: vec![put.clone()],
        };
        let mut portfolio = MockPortfolio::default();
        portfolio.set("SPY", dec!(900));
        let mut subs = MockSubscriptions::default();
        let market = MockMarket;

        let mut book = HedgeBook::new(HedgeConfig::default());
        book.register("SPY");
        book.register("SPY");
        book.register("QQQ");
        assert_eq!(book.len(), 2);

        let s = slice(0, true);
        {
            let mut host = HostContext {
                market: &market,
                chain: &chain,
                portfolio: &portfolio,
                subscriptions: &mut subs,
            };
            book.evaluate_all(&s, dec!(0.9), dec!(0.5), &mut host);
            let out = book.evaluate_all(&s, dec!(0.9), dec!(0.5), &mut host);
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].symbol(), put.id.as_str());
        }
        assert_eq!(book.tracked_contracts().len(), 1);
        assert!(book.lifecycle("SPY").map(|l| l.is_order_pending()).unwrap_or(false));

        book.on_order_event(&filled(&put, OrderStatus::Invalid));
        assert!(!book.lifecycle("SPY").map(|l| l.is_order_pending()).unwrap_or(true));

        // QQQ has no chain and no price: retiring it drops the lifecycle
        book.force_close("QQQ");
        assert!(book.lifecycle("QQQ").is_none());
        assert_eq!(book.underlyings().cloned().collect::<Vec<_>>(), vec!["SPY".to_string()]);
    }
}
