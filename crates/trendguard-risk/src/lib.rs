//! Trendguard Risk Management
//!
//! Volatility regime ranking and the per-security drawdown overlay.

pub mod drawdown;
pub mod volatility;

pub use drawdown::{apply_overrides, DrawdownRiskOverlay, DRAWDOWN_REASON};
pub use volatility::{VolBar, VolatilityRankTracker};
