use crate::models::*;
use statrs::statistics::Statistics;
use std::cmp::Ordering;

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    pub fn calculate_performance(
        trades: &[Trade],
        initial_balance: f64,
        final_balance: f64,
        equity_curve: &[EquityPoint],
    ) -> StrategyPerformance {
        let total_trades = trades.len() as i32;

        let mut trade_pnls = Vec::with_capacity(trades.len());
        let mut trade_pnl_percents = Vec::with_capacity(trades.len());
        let mut winning_trade_pnls = Vec::new();
        let mut losing_trade_pnls = Vec::new();

        for trade in trades {
            trade_pnls.push(trade.pnl);
            trade_pnl_percents.push(trade.pnl_percent);

            if trade.pnl > 0.0 {
                winning_trade_pnls.push(trade.pnl);
            } else if trade.pnl < 0.0 {
                losing_trade_pnls.push(trade.pnl);
            }
        }
        let winning_trades = winning_trade_pnls.len() as i32;
        let losing_trades = losing_trade_pnls.len() as i32;
        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64
        } else {
            0.0
        };

        let final_balance = if final_balance.is_finite() {
            final_balance
        } else {
            equity_curve
                .last()
                .map(|point| point.balance_absolute)
                .unwrap_or(initial_balance)
        };

        let total_return = if final_balance.is_finite() {
            final_balance - initial_balance
        } else {
            0.0
        };
        let total_return_percent = if initial_balance > 0.0 {
            total_return / initial_balance * 100.0
        } else {
            0.0
        };

        let sharpe_ratio = Self::calculate_sharpe_ratio(equity_curve);
        let drawdown_info = Self::calculate_max_drawdown(equity_curve);

        let best_trade = trade_pnls
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let worst_trade = trade_pnls.iter().copied().fold(f64::INFINITY, f64::min);

        let exposure_percent = if equity_curve.is_empty() {
            0.0
        } else {
            let exposed = equity_curve
                .iter()
                .filter(|point| point.open_positions > 0)
                .count();
            exposed as f64 / equity_curve.len() as f64 * 100.0
        };

        StrategyPerformance {
            total_trades,
            winning_trades,
            losing_trades,
            win_rate,
            total_return,
            total_return_percent,
            sharpe_ratio,
            max_drawdown: drawdown_info.max_drawdown,
            max_drawdown_percent: drawdown_info.max_drawdown_percent,
            avg_trade_pnl: Self::average(&trade_pnls),
            avg_trade_pnl_percent: Self::average(&trade_pnl_percents),
            median_trade_pnl: Self::median(&trade_pnls),
            avg_winning_pnl: Self::average(&winning_trade_pnls),
            avg_losing_pnl: Self::average(&losing_trade_pnls),
            best_trade: finite_or_zero(best_trade),
            worst_trade: finite_or_zero(worst_trade),
            exposure_percent,
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

    fn median(values: &[f64]) -> f64 {
        let mut filtered: Vec<f64> = values
            .iter()
            .copied()
            .filter(|value| value.is_finite())
            .collect();

        if filtered.is_empty() {
            return 0.0;
        }

        filtered.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let mid = filtered.len() / 2;

        if filtered.len() % 2 == 0 {
            (filtered[mid - 1] + filtered[mid]) / 2.0
        } else {
            filtered[mid]
        }
    }

    /// Mean over standard deviation of bar-to-bar returns. Not annualised:
    /// bars carry no fixed calendar spacing.
    pub fn calculate_sharpe_ratio(equity_curve: &[EquityPoint]) -> f64 {
        if equity_curve.len() < 3 {
            return 0.0;
        }

        let returns: Vec<f64> = equity_curve
            .windows(2)
            .map(|window| {
                let prev_value = window[0].balance_absolute;
                let curr_value = window[1].balance_absolute;
                if prev_value > 0.0 {
                    (curr_value - prev_value) / prev_value
                } else {
                    0.0
                }
            })
            .collect();

        let mean_return = returns.iter().mean();
        let std_dev = returns.iter().std_dev();

        if !std_dev.is_finite() || std_dev == 0.0 {
            return 0.0;
        }

        mean_return / std_dev
    }

    pub fn calculate_max_drawdown(equity_curve: &[EquityPoint]) -> DrawdownInfo {
        if equity_curve.is_empty() {
            return DrawdownInfo {
                max_drawdown: 0.0,
                max_drawdown_percent: 0.0,
            };
        }

        let mut max_drawdown = 0.0;
        let mut max_drawdown_percent = 0.0;
        let mut peak_value = equity_curve[0].balance_absolute;

        for point in equity_curve {
            if point.balance_absolute > peak_value {
                peak_value = point.balance_absolute;
            } else {
                let drawdown = peak_value - point.balance_absolute;
                let drawdown_percent = if peak_value > 0.0 {
                    (drawdown / peak_value) * 100.0
                } else {
                    0.0
                };

                if drawdown > max_drawdown {
                    max_drawdown = drawdown;
                }
                if drawdown_percent > max_drawdown_percent {
                    max_drawdown_percent = drawdown_percent;
                }
            }
        }

        DrawdownInfo {
            max_drawdown,
            max_drawdown_percent,
        }
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
