//! Trend universe selection
//!
//! Ranks the coarse snapshot by liquidity, maintains one indicator pair per
//! instrument in the liquid set, and keeps the most liquid instruments whose
//! fast average sits above the slow one.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info};
use trendguard_core::{
    CoarseFundamental, MarketData, Resolution, SecurityChanges, Symbol, UniverseConfig,
    UniverseSelection,
};

use crate::trend::TrendIndicatorPair;

/// Owns the indicator store and the previous selection
#[derive(Debug)]
pub struct UniverseSelector {
    config: UniverseConfig,
    indicators: HashMap<Symbol, TrendIndicatorPair>,
    selected: Vec<Symbol>,
}

impl UniverseSelector {
    /// Create a new selector with an empty indicator store
    pub fn new(config: UniverseConfig) -> Self {
        Self {
            config,
            indicators: HashMap::new(),
            selected: Vec::new(),
        }
    }

    /// Run one selection pass over `snapshot`
    pub fn select(
        &mut self,
        time: DateTime<Utc>,
        snapshot: &[CoarseFundamental],
        market: &dyn MarketData,
    ) -> UniverseSelection {
        let mut liquid: Vec<&CoarseFundamental> = snapshot
            .iter()
            .filter(|c| c.price > self.config.min_price)
            .collect();
        // Stable: ties keep snapshot order
        liquid.sort_by(|a, b| b.dollar_volume.cmp(&a.dollar_volume));
        liquid.truncate(self.config.breadth);

        let before = self.indicators.len();
        self.indicators
            .retain(|symbol, _| liquid.iter().any(|c| &c.symbol == symbol));
        let dropped = before - self.indicators.len();

        let mut created = 0usize;
        for coarse in &liquid {
            let pair = self.indicators.entry(coarse.symbol.clone()).or_insert_with(|| {
                created += 1;
                let history =
                    market.history(&coarse.symbol, self.config.history_lookback, Resolution::Daily);
                TrendIndicatorPair::with_history(
                    self.config.fast_period,
                    self.config.slow_period,
                    &history,
                )
            });
            // Ignored when the backfill already covered `time`
            pair.update(time, coarse.adjusted_price);
        }

        let selected: Vec<Symbol> = liquid
            .iter()
            .filter(|c| {
                self.indicators
                    .get(&c.symbol)
                    .map(|p| p.is_bullish())
                    .unwrap_or(false)
            })
            .take(self.config.max_selected)
            .map(|c| c.symbol.clone())
            .collect();

        let changes = SecurityChanges::between(&self.selected, &selected);
        debug!(
            candidates = snapshot.len(),
            liquid = liquid.len(),
            tracked = self.indicators.len(),
            created,
            dropped,
            selected = selected.len(),
            "Universe selection pass"
        );
        if !changes.is_empty() {
            info!(
                added = ?changes.added,
                removed = ?changes.removed,
                "Universe membership changed"
            );
        }

        self.selected = selected.clone();
        UniverseSelection { selected, changes }
    }

    /// Current selection, most liquid first
    pub fn selected(&self) -> &[Symbol] {
        &self.selected
    }

    pub fn indicator(&self, symbol: &str) -> Option<&TrendIndicatorPair> {
        self.indicators.get(symbol)
    }

    /// Number of instruments with a live indicator pair
    pub fn tracked_count(&self) -> usize {
        self.indicators.len()
    }
}
