//! Per-security drawdown overlay
//!
//! Liquidates any held security whose unrealized loss exceeds the configured
//! threshold and keeps it flat until the strategy's target set changes.

use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};
use trendguard_core::{invested_symbols, Directive, PortfolioTarget, PortfolioView, RiskConfig, Symbol};

/// Reason attached to liquidations issued by the overlay
pub const DRAWDOWN_REASON: &str = "max drawdown per security";

/// Tracks liquidated securities for the current target epoch
#[derive(Debug, Clone)]
pub struct DrawdownRiskOverlay {
    /// Stored negative, e.g. -0.10
    max_drawdown_pct: Decimal,
    /// Fingerprint of the last target set seen
    current_targets: BTreeSet<Symbol>,
    liquidated: HashSet<Symbol>,
}

impl DrawdownRiskOverlay {
    /// Create a new overlay; the sign of `max_drawdown_pct` is ignored
    pub fn new(max_drawdown_pct: Decimal) -> Self {
        Self {
            max_drawdown_pct: -max_drawdown_pct.abs(),
            current_targets: BTreeSet::new(),
            liquidated: HashSet::new(),
        }
    }

    pub fn from_config(config: &RiskConfig) -> Self {
        Self::new(config.max_drawdown_pct)
    }

    /// Threshold as a negative fraction
    pub fn threshold(&self) -> Decimal {
        self.max_drawdown_pct
    }

    /// Evaluate every invested holding against the threshold
    ///
    /// Returns zero-weight targets for securities to flatten. A security that
    /// breached stays in the output on later calls until the target set changes.
    pub fn manage_risk(
        &mut self,
        targets: &[PortfolioTarget],
        portfolio: &dyn PortfolioView,
    ) -> Vec<PortfolioTarget> {
        let fingerprint: BTreeSet<Symbol> = targets.iter().map(|t| t.symbol.clone()).collect();
        if fingerprint != self.current_targets {
            if !self.liquidated.is_empty() {
                info!(
                    cleared = self.liquidated.len(),
                    targets = fingerprint.len(),
                    "Target set changed, re-arming drawdown overlay"
                );
            }
            self.current_targets = fingerprint;
            self.liquidated.clear();
        }

        let mut overrides = Vec::new();
        for symbol in invested_symbols(portfolio) {
            let pnl = portfolio.unrealized_pnl_pct(&symbol);
            let breached = pnl < self.max_drawdown_pct;

            if breached && self.liquidated.insert(symbol.clone()) {
                warn!(
                    symbol = %symbol,
                    unrealized_pnl_pct = %pnl,
                    threshold = %self.max_drawdown_pct,
                    "Drawdown limit breached"
                );
            }

            if breached || self.liquidated.contains(&symbol) {
                overrides.push(PortfolioTarget::liquidate(symbol));
            }
        }

        if !overrides.is_empty() {
            debug!(count = overrides.len(), "Drawdown overrides issued");
        }
        overrides
    }

    /// Whether `symbol` was liquidated in the current epoch
    pub fn is_liquidated(&self, symbol: &str) -> bool {
        self.liquidated.contains(symbol)
    }

    pub fn liquidated_count(&self) -> usize {
        self.liquidated.len()
    }
}

/// Merge overlay overrides into a directive batch
///
/// Directives for overridden symbols are dropped and a `Liquidate` is appended
/// for each override, so the overlay wins within the tick.
pub fn apply_overrides(directives: Vec<Directive>, overrides: &[PortfolioTarget]) -> Vec<Directive> {
    if overrides.is_empty() {
        return directives;
    }

    let overridden: HashSet<&str> = overrides.iter().map(|t| t.symbol.as_str()).collect();
    let mut merged: Vec<Directive> = directives
        .into_iter()
        .filter(|d| !overridden.contains(d.symbol()))
        .collect();

    let mut seen = HashSet::new();
    for target in overrides {
        if seen.insert(target.symbol.as_str()) {
            merged.push(Directive::Liquidate {
                symbol: target.symbol.clone(),
                reason: DRAWDOWN_REASON.to_string(),
            });
        }
    }
    merged
}
