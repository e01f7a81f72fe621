//! Simulated market data
//!
//! Serves bars, prices, coarse snapshots and option chains from a loaded data
//! set as of the current simulated time. Nothing after that time is visible.

use crate::chain::SyntheticOptionChain;
use crate::config::ChainConfig;
use crate::data_loader::DataSet;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use trendguard_core::{
    CoarseFundamental, ContractCandidate, ContractId, DataSlice, MarketData, OptionChainProvider,
    PriceBar, Resolution, SubscriptionManager,
};

/// Market state as of one point in simulated time
#[derive(Debug, Clone)]
pub struct SimulatedMarket {
    data: DataSet,
    chain: SyntheticOptionChain,
    now: DateTime<Utc>,
}

impl SimulatedMarket {
    /// Create a new market positioned before the first bar
    pub fn new(data: DataSet, chain: ChainConfig) -> Self {
        Self {
            data,
            chain: SyntheticOptionChain::new(chain),
            now: DateTime::<Utc>::MIN_UTC,
        }
    }

    pub fn set_time(&mut self, time: DateTime<Utc>) {
        self.now = time;
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn data(&self) -> &DataSet {
        &self.data
    }

    /// Bars of `symbol` up to and including the current time
    fn visible(&self, symbol: &str) -> &[PriceBar] {
        let series = self.data.series(symbol);
        let end = series.partition_point(|b| b.time <= self.now);
        &series[..end]
    }

    /// Latest visible bar, only if it was printed on the current date
    pub fn todays_bar(&self, symbol: &str) -> Option<&PriceBar> {
        self.visible(symbol)
            .last()
            .filter(|b| b.time.date_naive() == self.now.date_naive())
    }

    /// Mark for an option identifier, priced off its underlying
    pub fn option_price(&self, contract: &ContractCandidate) -> Option<Decimal> {
        let spot = self.visible(&contract.underlying).last()?.close;
        Some(self.chain.mark(contract, spot, self.now))
    }

    /// Prices delivered to the algorithm this tick: every instrument that
    /// printed today plus subscribed, unexpired contracts
    pub fn slice(&self, ledger: &SubscriptionLedger, warming_up: bool) -> DataSlice {
        let mut slice = DataSlice::new(self.now);
        slice.warming_up = warming_up;

        for symbol in self.data.symbols() {
            if let Some(bar) = self.todays_bar(symbol) {
                slice.prices.insert(symbol.clone(), bar.close);
            }
        }
        for id in ledger.contracts() {
            let Some(contract) = ContractCandidate::from_id(id) else {
                continue;
            };
            if contract.days_to_expiry(self.now) < 0 {
                continue;
            }
            if let Some(price) = self.option_price(&contract) {
                slice.prices.insert(id.to_symbol(), price);
            }
        }
        slice
    }
}

impl MarketData for SimulatedMarket {
    fn coarse_snapshot(&self, _time: DateTime<Utc>) -> Vec<CoarseFundamental> {
        self.data
            .symbols()
            .filter(|s| self.data.is_tradable(s))
            .filter_map(|s| {
                let bar = self.todays_bar(s)?;
                Some(CoarseFundamental::new(s.clone(), bar.close, bar.close * bar.volume))
            })
            .collect()
    }

    fn history(&self, symbol: &str, lookback: usize, _resolution: Resolution) -> Vec<PriceBar> {
        let visible = self.visible(symbol);
        let start = visible.len().saturating_sub(lookback);
        visible[start..].to_vec()
    }

    fn price(&self, symbol: &str) -> Option<Decimal> {
        if let Some(bar) = self.visible(symbol).last() {
            return Some(bar.close);
        }
        let id = ContractId::new(symbol)?;
        let contract = ContractCandidate::from_id(&id)?;
        self.option_price(&contract)
    }
}

impl OptionChainProvider for SimulatedMarket {
    fn contract_list(&self, underlying: &str, as_of: DateTime<Utc>) -> Vec<ContractCandidate> {
        match self.visible(underlying).last() {
            Some(bar) => self.chain.list(underlying, bar.close, as_of),
            None => Vec::new(),
        }
    }
}

/// Records every live-data subscription
#[derive(Debug, Default)]
pub struct SubscriptionLedger {
    subscriptions: BTreeMap<ContractId, Resolution>,
    calls: usize,
}

impl SubscriptionLedger {
    /// Create a new, empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contracts(&self) -> impl Iterator<Item = &ContractId> {
        self.subscriptions.keys()
    }

    pub fn is_subscribed(&self, contract: &ContractId) -> bool {
        self.subscriptions.contains_key(contract)
    }

    /// Distinct contracts subscribed
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Total `subscribe` calls, including repeats
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl SubscriptionManager for SubscriptionLedger {
    fn subscribe(&mut self, contract: &ContractId, resolution: Resolution) {
        self.calls += 1;
        self.subscriptions.insert(contract.clone(), resolution);
    }
}
