//! Synthetic option chains
//!
//! Lists puts and calls on a strike grid around spot for the next few weekly
//! Friday expiries, and marks them at intrinsic value plus a linear time-value
//! proxy. Good enough to exercise contract selection and hedge accounting.

use crate::config::ChainConfig;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use trendguard_core::{ContractCandidate, OptionRight};

/// Smallest mark quoted for a live contract
const MIN_MARK: Decimal = dec!(0.01);

#[derive(Debug, Clone)]
pub struct SyntheticOptionChain {
    config: ChainConfig,
}

impl SyntheticOptionChain {
    /// Create a new chain generator
    pub fn new(config: ChainConfig) -> Self {
        Self { config }
    }

    /// Every listed contract on `underlying` given the current spot
    pub fn list(
        &self,
        underlying: &str,
        spot: Decimal,
        as_of: DateTime<Utc>,
    ) -> Vec<ContractCandidate> {
        let step = self.config.strike_step;
        if spot <= Decimal::ZERO || step <= Decimal::ZERO {
            return Vec::new();
        }

        let atm = (spot / step).round() * step;
        let n = i64::from(self.config.strikes_each_side);
        let strikes: Vec<Decimal> = (-n..=n)
            .map(|k| atm + step * Decimal::from(k))
            .filter(|s| *s > Decimal::ZERO)
            .collect();

        let mut contracts =
            Vec::with_capacity(strikes.len() * 2 * self.config.expiry_weeks as usize);
        for expiry in weekly_expiries(as_of.date_naive(), self.config.expiry_weeks) {
            for strike in &strikes {
                for right in [OptionRight::Put, OptionRight::Call] {
                    contracts.push(ContractCandidate::new(underlying, right, *strike, expiry));
                }
            }
        }
        contracts
    }

    /// Mark price per unit of underlying
    pub fn mark(
        &self,
        contract: &ContractCandidate,
        spot: Decimal,
        as_of: DateTime<Utc>,
    ) -> Decimal {
        let intrinsic = contract.intrinsic_value(spot);
        let dte = contract.days_to_expiry(as_of);
        if dte <= 0 {
            return intrinsic;
        }
        let time_value =
            spot * self.config.time_value_pct * Decimal::from(dte) / Decimal::from(365);
        (intrinsic + time_value).max(MIN_MARK)
    }
}

/// The next `weeks` Fridays strictly after `date`
pub fn weekly_expiries(date: NaiveDate, weeks: u32) -> Vec<NaiveDate> {
    let today = date.weekday().num_days_from_monday() as i64;
    let friday = Weekday::Fri.num_days_from_monday() as i64;
    let mut ahead = (friday - today).rem_euclid(7);
    if ahead == 0 {
        ahead = 7;
    }
    let first = date + Duration::days(ahead);
    (0..weeks as i64)
        .map(|w| first + Duration::weeks(w))
        .collect()
}
