//! Trend indicators
//!
//! Exponential moving averages and the fast/slow pair used to decide whether
//! an instrument is in an uptrend.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use trendguard_core::PriceBar;

/// Exponential moving average seeded with a simple mean
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    alpha: Decimal,
    value: Decimal,
    sum: Decimal,
    samples: usize,
    last_time: Option<DateTime<Utc>>,
}

impl Ema {
    /// Create a new EMA. A zero period is treated as 1.
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            alpha: Decimal::TWO / Decimal::from(period as u64 + 1),
            value: Decimal::ZERO,
            sum: Decimal::ZERO,
            samples: 0,
            last_time: None,
        }
    }

    /// Feed one observation. Returns false if it was ignored because it is
    /// not newer than the last accepted one.
    pub fn update(&mut self, time: DateTime<Utc>, value: Decimal) -> bool {
        if let Some(last) = self.last_time {
            if time <= last {
                return false;
            }
        }
        self.last_time = Some(time);
        self.samples += 1;

        if self.samples <= self.period {
            self.sum += value;
            self.value = self.sum / Decimal::from(self.samples as u64);
        } else {
            // EMA = alpha * new_value + (1 - alpha) * old_ema
            self.value = self.alpha * value + (Decimal::ONE - self.alpha) * self.value;
        }
        true
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Ready once at least `period` samples have been seen
    pub fn is_ready(&self) -> bool {
        self.samples >= self.period
    }

    /// Samples still needed before the average is ready
    pub fn warm_up_remaining(&self) -> usize {
        self.period.saturating_sub(self.samples)
    }
}

/// Fast and slow EMA over the same instrument
#[derive(Debug, Clone)]
pub struct TrendIndicatorPair {
    fast: Ema,
    slow: Ema,
}

impl TrendIndicatorPair {
    /// Create a new, empty pair
    pub fn new(fast_period: usize, slow_period: usize) -> Self {
        Self {
            fast: Ema::new(fast_period),
            slow: Ema::new(slow_period),
        }
    }

    /// Create a pair pre-warmed from daily bars ordered oldest to newest
    pub fn with_history(fast_period: usize, slow_period: usize, bars: &[PriceBar]) -> Self {
        let mut pair = Self::new(fast_period, slow_period);
        for bar in bars {
            pair.update(bar.time, bar.close);
        }
        pair
    }

    pub fn update(&mut self, time: DateTime<Utc>, price: Decimal) {
        self.fast.update(time, price);
        self.slow.update(time, price);
    }

    pub fn is_ready(&self) -> bool {
        self.fast.is_ready() && self.slow.is_ready()
    }

    pub fn fast(&self) -> Decimal {
        self.fast.value()
    }

    pub fn slow(&self) -> Decimal {
        self.slow.value()
    }

    /// Ready and fast average strictly above the slow one
    pub fn is_bullish(&self) -> bool {
        self.is_ready() && self.fast.value() > self.slow.value()
    }

    pub fn warm_up_remaining(&self) -> usize {
        self.fast.warm_up_remaining().max(self.slow.warm_up_remaining())
    }
}
