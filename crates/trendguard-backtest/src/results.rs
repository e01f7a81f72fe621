//! Backtest results and performance metrics

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// sqrt(252)
const TRADING_DAYS_SQRT: Decimal = dec!(15.8745);

/// Reported when no fill realized a loss
const PROFIT_FACTOR_CAP: Decimal = dec!(999.99);

/// Results of a backtest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResults {
    /// Identifier of the strategy that produced the run
    pub strategy_id: String,
    /// First simulated tick
    pub start_time: DateTime<Utc>,
    /// Last simulated tick
    pub end_time: DateTime<Utc>,
    pub initial_capital: Decimal,
    /// Account value after the last tick
    pub final_capital: Decimal,
    /// Distinct option contracts subscribed for live data
    pub subscription_count: usize,
    /// Individual fills
    pub trades: Vec<TradeResult>,
    /// Account value at the end of every tick
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: PerformanceMetrics,
    /// Per-symbol breakdown
    pub symbol_breakdown: BTreeMap<String, SymbolPerformance>,
}

impl BacktestResults {
    /// Create new results from the fills and the equity curve
    pub fn new(
        strategy_id: String,
        initial_capital: Decimal,
        subscription_count: usize,
        trades: Vec<TradeResult>,
        equity_curve: Vec<EquityPoint>,
    ) -> Self {
        let start_time = equity_curve.first().map(|p| p.time).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let end_time = equity_curve.last().map(|p| p.time).unwrap_or(start_time);
        let final_capital = equity_curve.last().map(|p| p.equity).unwrap_or(initial_capital);
        let metrics =
            PerformanceMetrics::calculate(&trades, &equity_curve, initial_capital, final_capital);
        let symbol_breakdown = Self::calculate_symbol_breakdown(&trades);

        Self {
            strategy_id,
            start_time,
            end_time,
            initial_capital,
            final_capital,
            subscription_count,
            trades,
            equity_curve,
            metrics,
            symbol_breakdown,
        }
    }

    fn calculate_symbol_breakdown(trades: &[TradeResult]) -> BTreeMap<String, SymbolPerformance> {
        let mut breakdown: BTreeMap<String, SymbolPerformance> = BTreeMap::new();
        for trade in trades {
            let entry = breakdown.entry(trade.symbol.clone()).or_default();
            entry.trade_count += 1;
            entry.realized_pnl += trade.realized_pnl;
            entry.fees += trade.fees;
        }
        breakdown
    }

    /// Pretty-printed JSON report
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// One CSV row per fill, with a header line
    pub fn trades_to_csv(&self) -> String {
        let mut csv =
            String::from("timestamp,symbol,side,quantity,price,notional,fees,realized_pnl,reason\n");
        for trade in &self.trades {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{}\n",
                trade.timestamp.to_rfc3339(),
                trade.symbol,
                if trade.is_buy { "BUY" } else { "SELL" },
                trade.quantity,
                trade.price,
                trade.notional,
                trade.fees,
                trade.realized_pnl,
                trade.reason.replace(',', ";"),
            ));
        }
        csv
    }
}

/// Individual simulated fill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeResult {
    /// Order ID reported in the matching order event
    pub id: String,
    pub symbol: String,
    pub is_buy: bool,
    /// Unsigned filled quantity (shares or contracts)
    pub quantity: Decimal,
    pub price: Decimal,
    /// Unsigned cash value including the contract multiplier
    pub notional: Decimal,
    pub fees: Decimal,
    /// Profit or loss realized by reducing an existing position
    pub realized_pnl: Decimal,
    pub timestamp: DateTime<Utc>,
    /// Why the order was placed
    pub reason: String,
}

/// Account value after one tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub time: DateTime<Utc>,
    pub equity: Decimal,
}

/// Summary statistics over a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Final minus initial capital
    pub total_pnl: Decimal,
    /// Sum of realized P&L over all fills
    pub realized_pnl: Decimal,
    /// `total_pnl` as a percentage of initial capital
    pub return_pct: Decimal,
    /// Number of fills
    pub trade_count: usize,
    /// Fills that realized a profit
    pub winning_trades: usize,
    /// Fills that realized a loss
    pub losing_trades: usize,
    /// Winning share of the fills that realized anything, in percent
    pub win_rate: Decimal,
    /// Gross profit / gross loss over realizing fills
    pub profit_factor: Decimal,
    /// Maximum peak-to-trough decline of the equity curve in percent
    pub max_drawdown_pct: Decimal,
    /// Maximum peak-to-trough decline in USD
    pub max_drawdown_usd: Decimal,
    /// Sharpe ratio of daily equity returns (annualized)
    pub sharpe_ratio: Decimal,
    /// Sum of fees across all fills
    pub total_fees: Decimal,
}

impl PerformanceMetrics {
    /// Calculate metrics from fills and the equity curve
    pub fn calculate(
        trades: &[TradeResult],
        equity_curve: &[EquityPoint],
        initial_capital: Decimal,
        final_capital: Decimal,
    ) -> Self {
        let total_pnl = final_capital - initial_capital;
        let return_pct = if initial_capital.is_zero() {
            Decimal::ZERO
        } else {
            (total_pnl / initial_capital) * dec!(100)
        };

        let winners: Vec<Decimal> = trades
            .iter()
            .map(|t| t.realized_pnl)
            .filter(|p| *p > Decimal::ZERO)
            .collect();
        let losers: Vec<Decimal> = trades
            .iter()
            .map(|t| t.realized_pnl)
            .filter(|p| *p < Decimal::ZERO)
            .collect();

        let decided = winners.len() + losers.len();
        let win_rate = if decided > 0 {
            Decimal::from(winners.len()) / Decimal::from(decided) * dec!(100)
        } else {
            Decimal::ZERO
        };

        let gross_profit: Decimal = winners.iter().sum();
        let gross_loss: Decimal = losers.iter().map(|p| p.abs()).sum();
        let profit_factor = match (gross_profit.is_zero(), gross_loss.is_zero()) {
            (true, true) => Decimal::ZERO,
            (false, true) => PROFIT_FACTOR_CAP,
            _ => (gross_profit / gross_loss).min(PROFIT_FACTOR_CAP),
        };

        let (max_drawdown_pct, max_drawdown_usd) =
            Self::calculate_max_drawdown(equity_curve, initial_capital);

        Self {
            total_pnl,
            realized_pnl: trades.iter().map(|t| t.realized_pnl).sum(),
            return_pct,
            trade_count: trades.len(),
            winning_trades: winners.len(),
            losing_trades: losers.len(),
            win_rate,
            profit_factor,
            max_drawdown_pct,
            max_drawdown_usd,
            sharpe_ratio: Self::calculate_sharpe_ratio(equity_curve),
            total_fees: trades.iter().map(|t| t.fees).sum(),
        }
    }

    /// Largest peak-to-trough decline, measured from `initial_capital` onward
    fn calculate_max_drawdown(
        equity_curve: &[EquityPoint],
        initial_capital: Decimal,
    ) -> (Decimal, Decimal) {
        let mut peak = initial_capital;
        let mut worst = (Decimal::ZERO, Decimal::ZERO);

        for equity in equity_curve.iter().map(|p| p.equity) {
            peak = peak.max(equity);
            let decline = peak - equity;
            if decline > worst.1 && peak > Decimal::ZERO {
                worst = (decline / peak * dec!(100), decline);
            }
        }
        worst
    }

    /// Annualized Sharpe ratio of tick-over-tick equity returns, zero risk-free rate
    fn calculate_sharpe_ratio(equity_curve: &[EquityPoint]) -> Decimal {
        let returns: Vec<Decimal> = equity_curve
            .windows(2)
            .filter_map(|w| {
                let (prev, next) = (w[0].equity, w[1].equity);
                (!prev.is_zero()).then(|| (next - prev) / prev)
            })
            .collect();
        if returns.len() < 2 {
            return Decimal::ZERO;
        }

        let count = Decimal::from(returns.len());
        let mean = returns.iter().sum::<Decimal>() / count;
        let variance = returns.iter().map(|r| (*r - mean) * (*r - mean)).sum::<Decimal>() / count;

        match variance.sqrt() {
            Some(std_dev) if !std_dev.is_zero() => mean / std_dev * TRADING_DAYS_SQRT,
            _ => Decimal::ZERO,
        }
    }
}

/// Per-symbol performance breakdown
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolPerformance {
    pub trade_count: usize,
    pub realized_pnl: Decimal,
    pub fees: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap() + Duration::days(n)
    }

    fn make_trade(symbol: &str, realized_pnl: Decimal, fees: Decimal) -> TradeResult {
        TradeResult {
            id: "test".to_string(),
            symbol: symbol.to_string(),
            is_buy: false,
            quantity: dec!(10),
            price: dec!(100),
            notional: dec!(1000),
            fees,
            realized_pnl,
            timestamp: day(0),
            reason: "test, with comma".to_string(),
        }
    }

    fn curve(values: &[Decimal]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, equity)| EquityPoint {
                time: day(i as i64),
                equity: *equity,
            })
            .collect()
    }

    #[test]
    fn test_metrics_calculation() {
        let trades = vec![
            make_trade("SPY", dec!(10), dec!(1)),
            make_trade("SPY", dec!(-5), dec!(1)),
            make_trade("AAPL", dec!(15), dec!(1)),
            make_trade("AAPL", Decimal::ZERO, dec!(1)),
        ];
        let equity = curve(&[dec!(1000), dec!(1020), dec!(1016)]);

        let metrics = PerformanceMetrics::calculate(&trades, &equity, dec!(1000), dec!(1016));

        assert_eq!(metrics.trade_count, 4);
        assert_eq!(metrics.winning_trades, 2);
        assert_eq!(metrics.losing_trades, 1);
        assert_eq!(metrics.total_pnl, dec!(16));
        assert_eq!(metrics.realized_pnl, dec!(20));
        assert_eq!(metrics.return_pct, dec!(1.6));
        assert_eq!(metrics.profit_factor, dec!(5));
        assert_eq!(metrics.total_fees, dec!(4));
    }

    #[test]
    fn test_max_drawdown_from_equity_curve() {
        let equity = curve(&[dec!(100), dec!(110), dec!(88), dec!(95), dec!(120)]);
        let (dd_pct, dd_usd) = PerformanceMetrics::calculate_max_drawdown(&equity, dec!(100));

        // Peak 110, trough 88
        assert_eq!(dd_usd, dec!(22));
        assert_eq!(dd_pct, dec!(20));
    }

    #[test]
    fn test_flat_curve_has_no_sharpe() {
        let equity = curve(&[dec!(100), dec!(100), dec!(100)]);
        assert_eq!(PerformanceMetrics::calculate_sharpe_ratio(&equity), Decimal::ZERO);
    }

    #[test]
    fn test_sharpe_sign_follows_drift() {
        let rising = curve(&[dec!(100), dec!(101), dec!(103), dec!(104)]);
        assert!(PerformanceMetrics::calculate_sharpe_ratio(&rising) > Decimal::ZERO);

        let falling = curve(&[dec!(100), dec!(99), dec!(96), dec!(95)]);
        assert!(PerformanceMetrics::calculate_sharpe_ratio(&falling) < Decimal::ZERO);
    }

    #[test]
    fn test_results_summary_and_csv() {
        let results = BacktestResults::new(
            "trend_hedge".to_string(),
            dec!(1000),
            3,
            vec![make_trade("SPY", dec!(10), dec!(1)), make_trade("SPY", dec!(-4), dec!(1))],
            curve(&[dec!(1000), dec!(1005)]),
        );

        assert_eq!(results.start_time, day(0));
        assert_eq!(results.end_time, day(1));
        assert_eq!(results.final_capital, dec!(1005));
        assert_eq!(results.subscription_count, 3);
        let spy = &results.symbol_breakdown["SPY"];
        assert_eq!(spy.trade_count, 2);
        assert_eq!(spy.realized_pnl, dec!(6));

        let csv = results.trades_to_csv();
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.lines().nth(1).unwrap().ends_with("test; with comma"));

        let json = results.to_json().unwrap();
        assert!(json.contains("\"strategy_id\": \"trend_hedge\""));
    }
}
