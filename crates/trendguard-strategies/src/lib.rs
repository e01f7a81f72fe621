//! Trendguard Strategies
//!
//! Trend universe selection, option contract selection, the hedge lifecycle
//! and the strategy that ties them together.

pub mod contract_selector;
pub mod hedge;
pub mod trend;
pub mod trend_hedge;
pub mod universe;

pub use contract_selector::{ContractQuery, ContractSelector, Moneyness, Ranking};
pub use hedge::{contract_quantity, HedgeBook, HedgeContext, HedgeLifecycle, HedgeState, TrackedContract};
pub use trend::{Ema, TrendIndicatorPair};
pub use trend_hedge::TrendHedgeStrategy;
pub use universe::UniverseSelector;
