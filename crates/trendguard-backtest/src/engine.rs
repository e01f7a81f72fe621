//! Backtest engine for replaying daily bars through an algorithm
//!
//! Each trading day runs the host schedule in a fixed order: universe
//! selection and membership changes, the volatility rank refresh, the data
//! callback, risk overrides, order dispatch and finally order notifications.

use crate::config::BacktestConfig;
use crate::data_loader::DataSet;
use crate::error::{BacktestError, Result};
use crate::market::{SimulatedMarket, SubscriptionLedger};
use crate::portfolio::SimulatedPortfolio;
use crate::results::{BacktestResults, EquityPoint};
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use trendguard_core::{Algorithm, Directive, HostContext, MarketData};
use trendguard_risk::apply_overrides;

/// Replays a data set through one algorithm
pub struct BacktestEngine {
    config: BacktestConfig,
    data: DataSet,
}

impl BacktestEngine {
    /// Create a new backtest engine
    pub fn new(config: BacktestConfig, data: DataSet) -> Self {
        Self { config, data }
    }

    /// Load the configured data set from disk
    pub fn from_config(config: BacktestConfig) -> Result<Self> {
        let path = config.data_path.clone().ok_or_else(|| {
            BacktestError::InvalidData("backtest.data_path is not set".to_string())
        })?;
        let data = DataSet::from_json_file(path)?;
        Ok(Self::new(config, data))
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Get the available data range
    pub fn data_range(&self) -> Option<(chrono::NaiveDate, chrono::NaiveDate)> {
        self.data.date_range()
    }

    /// Run a backtest; the first `warm_up_days` ticks only feed indicators
    pub fn run(&self, strategy: &mut dyn Algorithm, warm_up_days: usize) -> Result<BacktestResults> {
        self.config.validate()?;
        let times = self
            .data
            .trading_times_between(self.config.start_date, self.config.end_date);
        if times.is_empty() {
            return Err(BacktestError::NoData);
        }

        info!(
            strategy_id = %strategy.id(),
            start = %times[0],
            end = %times[times.len() - 1],
            days = times.len(),
            warm_up_days,
            "Starting backtest"
        );

        let mut market = SimulatedMarket::new(self.data.clone(), self.config.chain.clone());
        let mut ledger = SubscriptionLedger::new();
        let mut portfolio = SimulatedPortfolio::new(
            self.config.initial_capital,
            self.config.fee_per_order,
            self.config.option_multiplier,
        );
        let mut equity_curve = Vec::with_capacity(times.len());

        for (index, time) in times.iter().copied().enumerate() {
            let warming_up = index < warm_up_days;
            self.step(
                strategy,
                time,
                warming_up,
                &mut market,
                &mut ledger,
                &mut portfolio,
            );

            let days_traded = index + 1;
            if !warming_up
                && self.config.status_every_days > 0
                && days_traded % self.config.status_every_days == 0
            {
                strategy.report_status(time, &market, &portfolio);
            }

            equity_curve.push(EquityPoint {
                time,
                equity: portfolio.total_value(),
            });
        }

        if self.config.close_at_end {
            portfolio.close_all("end of backtest");
            for event in portfolio.drain_events() {
                strategy.on_order_event(&event);
            }
            if let Some(last) = equity_curve.last_mut() {
                last.equity = portfolio.total_value();
            }
        }

        let results = BacktestResults::new(
            strategy.id().to_string(),
            self.config.initial_capital,
            ledger.len(),
            portfolio.into_trades(),
            equity_curve,
        );

        info!(
            strategy_id = %results.strategy_id,
            final_capital = %results.final_capital,
            return_pct = %results.metrics.return_pct.round_dp(2),
            max_drawdown_pct = %results.metrics.max_drawdown_pct.round_dp(2),
            trade_count = results.metrics.trade_count,
            subscriptions = results.subscription_count,
            "Backtest complete"
        );

        Ok(results)
    }

    /// One trading day
    fn step(
        &self,
        strategy: &mut dyn Algorithm,
        time: DateTime<Utc>,
        warming_up: bool,
        market: &mut SimulatedMarket,
        ledger: &mut SubscriptionLedger,
        portfolio: &mut SimulatedPortfolio,
    ) {
        market.set_time(time);
        portfolio.set_time(time);
        portfolio.settle_expired(&*market);

        let slice = market.slice(ledger, warming_up);
        portfolio.refresh_marks(&slice, &*market);

        let mut directives: Vec<Directive> = Vec::new();

        if !warming_up {
            let snapshot = market.coarse_snapshot(time);
            let selection = strategy.select_universe(time, &snapshot, &*market);
            if !selection.changes.is_empty() {
                let mut ctx = HostContext {
                    market: &*market,
                    chain: &*market,
                    portfolio: &*portfolio,
                    subscriptions: &mut *ledger,
                };
                directives.extend(strategy.on_securities_changed(time, &selection.changes, &mut ctx));
            }
        }

        strategy.update_volatility_rank(time, &*market);

        {
            let mut ctx = HostContext {
                market: &*market,
                chain: &*market,
                portfolio: &*portfolio,
                subscriptions: &mut *ledger,
            };
            directives.extend(strategy.on_data(&slice, &mut ctx));
        }

        if !warming_up {
            let targets = strategy.current_targets();
            let overrides = strategy.manage_risk(&targets, &*portfolio);
            directives = apply_overrides(directives, &overrides);
        }

        for directive in directives {
            debug!(time = %time, directive = %directive, "Dispatching");
            directive.dispatch(&mut *portfolio);
        }

        for event in portfolio.drain_events() {
            strategy.on_order_event(&event);
        }
    }
}
