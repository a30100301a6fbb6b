use crate::models::{BacktestSummary, EquityPoint, MonthlyReturn, Trade};
use chrono::Datelike;
use statrs::statistics::Statistics;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawdownInfo {
    pub max_drawdown: f64,
    pub max_drawdown_percent: f64,
}

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    pub fn calculate_summary(
        trades: &[Trade],
        equity_curve: &[EquityPoint],
        initial_capital: f64,
    ) -> BacktestSummary {
        let total_trades = trades.len();

        let mut trade_pnls = Vec::with_capacity(total_trades);
        let mut winning_pnls = Vec::new();
        let mut losing_pnls = Vec::new();
        let mut bars_held = Vec::with_capacity(total_trades);

        for trade in trades {
            trade_pnls.push(trade.pnl);
            bars_held.push(trade.bars_held as f64);
            if trade.pnl > 0.0 {
                winning_pnls.push(trade.pnl);
            } else if trade.pnl < 0.0 {
                losing_pnls.push(trade.pnl);
            }
        }

        let winning_trades = winning_pnls.len();
        let losing_trades = losing_pnls.len();
        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64
        } else {
            0.0
        };

        let final_equity = equity_curve
            .last()
            .map(|point| point.equity)
            .filter(|equity| equity.is_finite())
            .unwrap_or(initial_capital);
        let total_return = final_equity - initial_capital;
        let total_return_percent = Self::percent_of(total_return, initial_capital);

        let benchmark_return_percent = equity_curve
            .last()
            .map(|point| Self::percent_of(point.benchmark_equity - initial_capital, initial_capital))
            .unwrap_or(0.0);

        let gross_profit: f64 = winning_pnls.iter().sum();
        let gross_loss: f64 = losing_pnls.iter().map(|pnl| pnl.abs()).sum();
        let profit_factor = if gross_loss > 0.0 {
            Some(gross_profit / gross_loss)
        } else {
            None
        };

        let best_trade = if trade_pnls.is_empty() {
            0.0
        } else {
            trade_pnls.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        };
        let worst_trade = if trade_pnls.is_empty() {
            0.0
        } else {
            trade_pnls.iter().copied().fold(f64::INFINITY, f64::min)
        };

        let drawdown = Self::calculate_max_drawdown(equity_curve);

        BacktestSummary {
            total_return,
            total_return_percent,
            final_equity,
            win_rate,
            total_trades,
            winning_trades,
            losing_trades,
            avg_trade: Self::average(&trade_pnls),
            avg_win: Self::average(&winning_pnls),
            avg_loss: Self::average(&losing_pnls),
            best_trade,
            worst_trade,
            profit_factor,
            avg_bars_held: Self::average(&bars_held),
            max_drawdown: drawdown.max_drawdown_percent,
            max_drawdown_amount: drawdown.max_drawdown,
            sharpe_ratio: Self::calculate_sharpe_ratio(equity_curve),
            benchmark_return_percent,
        }
    }

    fn percent_of(amount: f64, base: f64) -> f64 {
        if base > 0.0 && amount.is_finite() {
            amount / base * 100.0
        } else {
            0.0
        }
    }

    fn average(values: &[f64]) -> f64 {
        let mut sum = 0.0;
        let mut count = 0usize;

        for value in values.iter().copied() {
            if value.is_finite() {
                sum += value;
                count += 1;
            }
        }

        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    pub fn daily_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
        equity_curve
            .windows(2)
            .map(|window| {
                let prev_value = window[0].equity;
                let curr_value = window[1].equity;
                if prev_value > 0.0 {
                    (curr_value - prev_value) / prev_value
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Annualized Sharpe ratio of daily equity returns, no risk-free rate,
    /// population standard deviation.
    pub fn calculate_sharpe_ratio(equity_curve: &[EquityPoint]) -> f64 {
        let returns = Self::daily_returns(equity_curve);
        if returns.len() < 2 {
            return 0.0;
        }

        let mean_return = returns.iter().mean();
        let std_dev = returns.iter().population_std_dev();

        if !std_dev.is_finite() || std_dev <= 1e-12 {
            return 0.0;
        }

        mean_return / std_dev * TRADING_DAYS_PER_YEAR.sqrt()
    }

    /// Largest peak-to-trough decline against the running peak, both in
    /// currency and as a percentage of the peak.
    pub fn calculate_max_drawdown(equity_curve: &[EquityPoint]) -> DrawdownInfo {
        let mut info = DrawdownInfo {
            max_drawdown: 0.0,
            max_drawdown_percent: 0.0,
        };
        let Some(first) = equity_curve.first() else {
            return info;
        };

        let mut peak_value = first.equity;
        for point in equity_curve {
            if point.equity > peak_value {
                peak_value = point.equity;
                continue;
            }
            let drawdown = peak_value - point.equity;
            let drawdown_percent = if peak_value > 0.0 {
                (drawdown / peak_value * 100.0).min(100.0)
            } else {
                0.0
            };
            if drawdown > info.max_drawdown {
                info.max_drawdown = drawdown;
            }
            if drawdown_percent > info.max_drawdown_percent {
                info.max_drawdown_percent = drawdown_percent;
            }
        }
        info
    }

    /// Month-end equity compared with the previous month-end. The first month
    /// is measured from the initial capital.
    pub fn calculate_monthly_returns(
        equity_curve: &[EquityPoint],
        initial_capital: f64,
    ) -> Vec<MonthlyReturn> {
        let mut month_ends: Vec<&EquityPoint> = Vec::new();
        for point in equity_curve {
            let same_month = month_ends.last().is_some_and(|last| {
                last.date.year() == point.date.year() && last.date.month() == point.date.month()
            });
            match month_ends.last_mut() {
                Some(last) if same_month => *last = point,
                _ => month_ends.push(point),
            }
        }

        let mut previous = initial_capital;
        month_ends
            .into_iter()
            .map(|point| {
                let return_percent = if previous > 0.0 {
                    (point.equity - previous) / previous * 100.0
                } else {
                    0.0
                };
                previous = point.equity;
                MonthlyReturn {
                    month: point.date.format("%Y-%m").to_string(),
                    label: point.date.format("%b").to_string(),
                    return_percent,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, ExitReason};
    use chrono::NaiveDate;

    fn point(year: i32, month: u32, day: u32, equity: f64) -> EquityPoint {
        EquityPoint {
            date: NaiveDate::from_ymd_opt(year, month, day).unwrap(),
            equity,
            benchmark_equity: equity,
            cash: equity,
            positions_value: 0.0,
            open_positions: 0,
        }
    }

    fn curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, value)| point(2024, 1, 1 + i as u32, *value))
            .collect()
    }

    fn trade(id: u64, pnl: f64, bars_held: usize) -> Trade {
        Trade {
            id,
            entry_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            exit_date: NaiveDate::from_ymd_opt(2024, 1, 9).unwrap(),
            entry_price: 100.0,
            exit_price: 100.0 + pnl / 10.0,
            quantity: 10,
            direction: Direction::Long,
            pnl,
            fees: 0.0,
            return_percent: pnl / 10.0,
            bars_held,
            reason: ExitReason::ExitSignal,
        }
    }

    #[test]
    fn strictly_increasing_curve_has_no_drawdown() {
        let info =
            PerformanceCalculator::calculate_max_drawdown(&curve(&[100.0, 101.0, 105.0, 110.0]));
        assert_eq!(info.max_drawdown, 0.0);
        assert_eq!(info.max_drawdown_percent, 0.0);
    }

    #[test]
    fn drawdown_measures_against_running_peak() {
        let info = PerformanceCalculator::calculate_max_drawdown(&curve(&[
            100.0, 120.0, 90.0, 130.0, 117.0,
        ]));
        assert!((info.max_drawdown - 30.0).abs() < 1e-9);
        assert!((info.max_drawdown_percent - 25.0).abs() < 1e-9);
    }

    #[test]
    fn sharpe_uses_population_std_dev() {
        let equity = [100.0, 110.0, 121.0, 127.05];
        let sharpe = PerformanceCalculator::calculate_sharpe_ratio(&curve(&equity));

        let returns = [0.1, 0.1, 0.05];
        let mean = returns.iter().sum::<f64>() / 3.0;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / 3.0;
        let expected = mean / variance.sqrt() * 252.0_f64.sqrt();
        assert!((sharpe - expected).abs() < 1e-6);
    }

    #[test]
    fn sharpe_is_zero_for_flat_or_short_curves() {
        assert_eq!(
            PerformanceCalculator::calculate_sharpe_ratio(&curve(&[100.0, 100.0, 100.0])),
            0.0
        );
        assert_eq!(
            PerformanceCalculator::calculate_sharpe_ratio(&curve(&[100.0, 105.0])),
            0.0
        );
        assert_eq!(PerformanceCalculator::calculate_sharpe_ratio(&[]), 0.0);
    }

    #[test]
    fn summary_handles_empty_ledger() {
        let summary =
            PerformanceCalculator::calculate_summary(&[], &curve(&[1_000.0, 1_000.0]), 1_000.0);
        assert_eq!(summary.total_trades, 0);
        assert_eq!(summary.win_rate, 0.0);
        assert_eq!(summary.avg_trade, 0.0);
        assert_eq!(summary.total_return, 0.0);
        assert_eq!(summary.profit_factor, None);
    }

    #[test]
    fn summary_aggregates_trade_statistics() {
        let trades = vec![trade(1, 300.0, 5), trade(2, -100.0, 3), trade(3, 100.0, 4)];
        let summary = PerformanceCalculator::calculate_summary(
            &trades,
            &curve(&[10_000.0, 10_100.0, 10_300.0]),
            10_000.0,
        );
        assert_eq!(summary.total_trades, 3);
        assert_eq!(summary.winning_trades, 2);
        assert_eq!(summary.losing_trades, 1);
        assert!((summary.win_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!((summary.avg_trade - 100.0).abs() < 1e-9);
        assert_eq!(summary.best_trade, 300.0);
        assert_eq!(summary.worst_trade, -100.0);
        assert_eq!(summary.profit_factor, Some(4.0));
        assert!((summary.avg_bars_held - 4.0).abs() < 1e-12);
        assert!((summary.total_return - 300.0).abs() < 1e-9);
        assert!((summary.total_return_percent - 3.0).abs() < 1e-9);
    }

    #[test]
    fn monthly_returns_chain_month_ends() {
        let points = vec![
            point(2024, 1, 15, 100_500.0),
            point(2024, 1, 31, 101_000.0),
            point(2024, 2, 15, 95_000.0),
            point(2024, 2, 29, 99_990.0),
        ];
        let monthly = PerformanceCalculator::calculate_monthly_returns(&points, 100_000.0);
        assert_eq!(monthly.len(), 2);
        assert_eq!(monthly[0].month, "2024-01");
        assert_eq!(monthly[0].label, "Jan");
        assert!((monthly[0].return_percent - 1.0).abs() < 1e-9);
        assert_eq!(monthly[1].label, "Feb");
        assert!((monthly[1].return_percent + 1.0).abs() < 1e-9);
    }
}
