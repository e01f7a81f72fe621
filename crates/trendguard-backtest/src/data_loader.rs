//! Historical data loading
//!
//! A data set is a JSON document of daily bars keyed by symbol:
//!
//! ```json
//! {
//!   "untradable": ["VIX"],
//!   "bars": {
//!     "SPY": [{"time": "2023-01-03T21:00:00Z", "open": "384.4", "high": "386.4",
//!              "low": "377.8", "close": "380.8", "volume": "74850700"}]
//!   }
//! }
//! ```

use crate::error::{BacktestError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;
use trendguard_core::{PriceBar, Symbol};

/// Daily bars per symbol, each series ordered oldest to newest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSet {
    /// Reference series that never appear in the coarse snapshot (e.g. VIX)
    #[serde(default)]
    pub untradable: BTreeSet<Symbol>,
    pub bars: BTreeMap<Symbol, Vec<PriceBar>>,
}

impl DataSet {
    /// Load and normalize a JSON data set
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let data = Self::from_json_str(&content)?;
        info!(
            path = %path.display(),
            symbols = data.bars.len(),
            days = data.trading_times().len(),
            "Loaded data set"
        );
        Ok(data)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let mut data: DataSet = serde_json::from_str(content)?;
        data.normalize()?;
        Ok(data)
    }

    /// Build a data set in memory
    pub fn from_bars(bars: BTreeMap<Symbol, Vec<PriceBar>>) -> Result<Self> {
        let mut data = Self {
            untradable: BTreeSet::new(),
            bars,
        };
        data.normalize()?;
        Ok(data)
    }

    pub fn with_untradable(mut self, symbol: impl Into<Symbol>) -> Self {
        self.untradable.insert(symbol.into());
        self
    }

    /// Sort every series, drop duplicate timestamps and reject bad bars
    fn normalize(&mut self) -> Result<()> {
        for (symbol, series) in self.bars.iter_mut() {
            series.sort_by_key(|b| b.time);
            series.dedup_by_key(|b| b.time);
            if let Some(bad) = series.iter().find(|b| b.low > b.high || b.close.is_sign_negative()) {
                return Err(BacktestError::InvalidData(format!(
                    "{} bar at {} has low {} above high {} or a negative close",
                    symbol, bad.time, bad.low, bad.high
                )));
            }
        }
        Ok(())
    }

    pub fn series(&self, symbol: &str) -> &[PriceBar] {
        self.bars.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.bars.keys()
    }

    pub fn is_tradable(&self, symbol: &str) -> bool {
        !self.untradable.contains(symbol)
    }

    /// Every distinct bar timestamp across all symbols, ascending
    pub fn trading_times(&self) -> Vec<DateTime<Utc>> {
        let times: BTreeSet<DateTime<Utc>> = self
            .bars
            .values()
            .flat_map(|series| series.iter().map(|b| b.time))
            .collect();
        times.into_iter().collect()
    }

    /// Trading times whose date lies inside the optional bounds
    pub fn trading_times_between(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Vec<DateTime<Utc>> {
        self.trading_times()
            .into_iter()
            .filter(|t| start.map(|s| t.date_naive() >= s).unwrap_or(true))
            .filter(|t| end.map(|e| t.date_naive() <= e).unwrap_or(true))
            .collect()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let times = self.trading_times();
        Some((times.first()?.date_naive(), times.last()?.date_naive()))
    }
}
