//! Backtest error types

use thiserror::Error;
use trendguard_core::ConfigError;

/// Backtest result type alias
pub type Result<T> = std::result::Result<T, BacktestError>;

/// Backtest errors
#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("No data available for the specified time range")]
    NoData,

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("Invalid data set: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for BacktestError {
    fn from(err: serde_json::Error) -> Self {
        BacktestError::SerializationError(err.to_string())
    }
}
