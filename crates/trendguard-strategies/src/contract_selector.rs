//! Option contract selection
//!
//! Filters an option chain snapshot by right, days to expiry and moneyness,
//! then picks one contract with a single composite ranking key.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::{debug, info};
use trendguard_core::{
    ContractCandidate, ContractId, HedgeConfig, HedgeStyle, OptionChainProvider, OptionRight,
    Resolution, SubscriptionManager,
};

/// Moneyness filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Moneyness {
    /// Strictly further out of the money than `min_offset` times spot
    OutOfTheMoney { min_offset: Decimal },
    /// No moneyness constraint
    Any,
}

impl Moneyness {
    pub fn accepts(&self, contract: &ContractCandidate, spot: Decimal) -> bool {
        match self {
            Moneyness::OutOfTheMoney { min_offset } => {
                contract.otm_distance(spot) > *min_offset * spot
            }
            Moneyness::Any => true,
        }
    }
}

/// Ordering applied to the filtered candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ranking {
    /// Expiry closest to the target, then strike closest to spot
    NearestExpiry,
    /// Latest expiry in the band, then strike closest to spot
    LatestExpiry,
}

/// Selection criteria
#[derive(Debug, Clone, PartialEq)]
pub struct ContractQuery {
    pub right: OptionRight,
    pub target_dte: i64,
    /// Inclusive, in whole days
    pub dte_tolerance: i64,
    pub moneyness: Moneyness,
    pub ranking: Ranking,
}

impl ContractQuery {
    /// Query matching the configured hedge style
    pub fn for_hedge(config: &HedgeConfig) -> Self {
        match config.style {
            HedgeStyle::ProtectivePut => Self {
                right: OptionRight::Put,
                target_dte: config.target_dte,
                dte_tolerance: config.dte_tolerance,
                moneyness: Moneyness::OutOfTheMoney {
                    min_offset: config.otm_offset,
                },
                ranking: Ranking::NearestExpiry,
            },
            HedgeStyle::CoveredCall => Self {
                right: OptionRight::Call,
                target_dte: config.target_dte,
                dte_tolerance: config.dte_tolerance,
                moneyness: Moneyness::Any,
                ranking: Ranking::LatestExpiry,
            },
        }
    }

    fn in_band(&self, dte: i64) -> bool {
        (dte - self.target_dte).abs() <= self.dte_tolerance
    }

    /// Smaller keys rank first; ties fall through to strike distance then id
    fn rank_key(
        &self,
        contract: &ContractCandidate,
        as_of: DateTime<Utc>,
        spot: Decimal,
    ) -> (i64, Decimal, ContractId) {
        let dte = contract.days_to_expiry(as_of);
        let primary = match self.ranking {
            Ranking::NearestExpiry => (dte - self.target_dte).abs(),
            Ranking::LatestExpiry => -dte,
        };
        (primary, (spot - contract.strike).abs(), contract.id.clone())
    }
}

/// Picks contracts and registers each chosen one for live data once
#[derive(Debug, Default)]
pub struct ContractSelector {
    subscribed: HashSet<ContractId>,
}

impl ContractSelector {
    /// Create a new selector
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose one contract on `underlying`, or `None` when nothing qualifies
    pub fn select(
        &mut self,
        underlying: &str,
        as_of: DateTime<Utc>,
        spot: Decimal,
        query: &ContractQuery,
        chain: &dyn OptionChainProvider,
        subscriptions: &mut dyn SubscriptionManager,
    ) -> Option<ContractCandidate> {
        let contracts = chain.contract_list(underlying, as_of);
        let listed = contracts.len();

        let best = contracts
            .into_iter()
            .filter(|c| c.right == query.right)
            .filter(|c| query.in_band(c.days_to_expiry(as_of)))
            .filter(|c| query.moneyness.accepts(c, spot))
            .min_by_key(|c| query.rank_key(c, as_of, spot));

        let Some(contract) = best else {
            debug!(
                underlying = %underlying,
                listed,
                right = %query.right,
                target_dte = query.target_dte,
                "No contract matches query"
            );
            return None;
        };

        if self.subscribed.insert(contract.id.clone()) {
            subscriptions.subscribe(&contract.id, Resolution::Minute);
            info!(
                contract = %contract.id,
                strike = %contract.strike,
                expiry = %contract.expiry,
                "Subscribed to contract"
            );
        }

        Some(contract)
    }

    pub fn is_subscribed(&self, contract: &ContractId) -> bool {
        self.subscribed.contains(contract)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscribed.len()
    }
}
