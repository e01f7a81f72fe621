//! Volatility regime ranking
//!
//! Places the current level of a volatility reference series inside its
//! trailing low/high range. A rank near 1 means volatility is close to the top
//! of its recent range, which is when hedges are requested.

use rust_decimal::Decimal;
use tracing::{debug, warn};
use trendguard_core::PriceBar;

/// Low/high extent of one bar of the reference series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolBar {
    pub low: Decimal,
    pub high: Decimal,
}

impl VolBar {
    pub fn new(low: Decimal, high: Decimal) -> Self {
        Self { low, high }
    }
}

impl From<Decimal> for VolBar {
    fn from(value: Decimal) -> Self {
        Self {
            low: value,
            high: value,
        }
    }
}

impl From<&PriceBar> for VolBar {
    fn from(bar: &PriceBar) -> Self {
        Self {
            low: bar.low,
            high: bar.high,
        }
    }
}

/// Keeps the most recent volatility rank
#[derive(Debug, Clone, Default)]
pub struct VolatilityRankTracker {
    rank: Decimal,
    updates: u64,
}

impl VolatilityRankTracker {
    /// Create a new tracker with rank 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute the rank of `current` within `window`
    ///
    /// `rank = (current - min(lows)) / (max(highs) - min(lows))`, clamped to
    /// `[0, 1]`. An empty window or one with no range yields 0.
    pub fn recompute(&mut self, window: &[VolBar], current: Decimal) -> Decimal {
        self.updates += 1;
        self.rank = Self::rank_within(window, current);
        debug!(
            rank = %self.rank,
            current = %current,
            window_len = window.len(),
            "Volatility rank recomputed"
        );
        self.rank
    }

    /// Last computed rank
    pub fn rank(&self) -> Decimal {
        self.rank
    }

    /// Whether the last rank is strictly above `trigger`
    pub fn is_elevated(&self, trigger: Decimal) -> bool {
        self.rank > trigger
    }

    /// Number of recomputations so far
    pub fn updates(&self) -> u64 {
        self.updates
    }

    fn rank_within(window: &[VolBar], current: Decimal) -> Decimal {
        let low = window.iter().map(|b| b.low).min();
        let high = window.iter().map(|b| b.high).max();

        let (low, high) = match (low, high) {
            (Some(low), Some(high)) => (low, high),
            _ => {
                warn!("Empty volatility window, rank defaults to 0");
                return Decimal::ZERO;
            }
        };

        let range = high - low;
        if range <= Decimal::ZERO {
            warn!(low = %low, high = %high, "Degenerate volatility window, rank defaults to 0");
            return Decimal::ZERO;
        }

        ((current - low) / range).clamp(Decimal::ZERO, Decimal::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn closes(values: &[Decimal]) -> Vec<VolBar> {
        values.iter().copied().map(VolBar::from).collect()
    }

    #[test]
    fn test_rank_at_window_high() {
        let mut tracker = VolatilityRankTracker::new();
        let window = closes(&[dec!(10), dec!(12), dec!(15), dec!(9), dec!(20)]);

        let rank = tracker.recompute(&window, dec!(20));
        assert_eq!(rank, Decimal::ONE);
        assert!(tracker.is_elevated(dec!(0.5)));
    }

    #[test]
    fn test_rank_midpoint() {
        let mut tracker = VolatilityRankTracker::new();
        let window = closes(&[dec!(10), dec!(20)]);

        assert_eq!(tracker.recompute(&window, dec!(15)), dec!(0.5));
        // Strictly above the trigger is required
        assert!(!tracker.is_elevated(dec!(0.5)));
    }

    #[test]
    fn test_rank_uses_bar_extremes() {
        let mut tracker = VolatilityRankTracker::new();
        let now = Utc::now();
        let bars = vec![
            PriceBar {
                time: now,
                open: dec!(14),
                high: dec!(18),
                low: dec!(12),
                close: dec!(15),
                volume: Decimal::ZERO,
            },
            PriceBar {
                time: now,
                open: dec!(15),
                high: dec!(22),
                low: dec!(14),
                close: dec!(20),
                volume: Decimal::ZERO,
            },
        ];
        let window: Vec<VolBar> = bars.iter().map(VolBar::from).collect();

        // (17 - 12) / (22 - 12)
        assert_eq!(tracker.recompute(&window, dec!(17)), dec!(0.5));
    }

    #[test]
    fn test_flat_window_falls_back_to_zero() {
        let mut tracker = VolatilityRankTracker::new();
        let window = closes(&[dec!(15), dec!(15), dec!(15)]);

        assert_eq!(tracker.recompute(&window, dec!(15)), Decimal::ZERO);
        assert!(!tracker.is_elevated(Decimal::ZERO));
    }

    #[test]
    fn test_empty_window_falls_back_to_zero() {
        let mut tracker = VolatilityRankTracker::new();
        assert_eq!(tracker.recompute(&[], dec!(15)), Decimal::ZERO);
        assert_eq!(tracker.updates(), 1);
    }

    #[test]
    fn test_rank_clamped_outside_window() {
        let mut tracker = VolatilityRankTracker::new();
        let window = closes(&[dec!(10), dec!(20)]);

        assert_eq!(tracker.recompute(&window, dec!(30)), Decimal::ONE);
        assert_eq!(tracker.recompute(&window, dec!(5)), Decimal::ZERO);
    }

    #[test]
    fn test_keeps_only_last_rank() {
        let mut tracker = VolatilityRankTracker::new();
        tracker.recompute(&closes(&[dec!(10), dec!(20)]), dec!(20));
        tracker.recompute(&closes(&[dec!(10), dec!(20)]), dec!(12));

        assert_eq!(tracker.rank(), dec!(0.2));
        assert_eq!(tracker.updates(), 2);
    }
}
