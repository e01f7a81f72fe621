//! Trendguard Backtest
//!
//! Deterministic simulation host: replays daily bars through an algorithm,
//! prices synthetic option chains, fills orders and reports performance.

pub mod chain;
pub mod config;
pub mod data_loader;
pub mod engine;
pub mod error;
pub mod market;
pub mod portfolio;
pub mod results;

pub use chain::SyntheticOptionChain;
pub use config::{BacktestConfig, ChainConfig, RunConfig};
pub use data_loader::DataSet;
pub use engine::BacktestEngine;
pub use error::{BacktestError, Result};
pub use market::{SimulatedMarket, SubscriptionLedger};
pub use portfolio::{Position, SimulatedPortfolio};
pub use results::{BacktestResults, EquityPoint, PerformanceMetrics, TradeResult};
