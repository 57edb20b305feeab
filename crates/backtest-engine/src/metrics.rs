use core_types::{mean, std_dev, Frequency};
use rust_decimal::prelude::ToPrimitive;

use crate::models::{BacktestStats, EquityPoint, TradeRecord};

/// Bar-over-bar simple returns of the equity curve, in the order the curve
/// was recorded. `equity.len() < 2` yields an empty vector.
fn equity_returns(equity: &[EquityPoint]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| {
            let prev = w[0].equity.to_f64().unwrap_or(0.0);
            let cur = w[1].equity.to_f64().unwrap_or(0.0);
            if prev.abs() < f64::EPSILON {
                0.0
            } else {
                cur / prev - 1.0
            }
        })
        .collect()
}

/// Maximum peak-to-trough drawdown of the equity curve, as a negative
/// fraction (`-0.23` = a 23% drawdown). `0.0` if the curve never fell below
/// its running peak, including the degenerate single-point case.
fn max_drawdown(equity: &[EquityPoint]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for point in equity {
        let v = point.equity.to_f64().unwrap_or(0.0);
        if v > peak {
            peak = v;
        }
        if peak > 0.0 {
            let dd = v / peak - 1.0;
            if dd < worst {
                worst = dd;
            }
        }
    }
    worst
}

/// Derive the full [`BacktestStats`] bundle from a completed run's trades
/// and equity curve (§4.4). Every ratio degrades to a documented sentinel
/// in its degenerate case rather than `NaN`:
/// - zero-variance returns → Sharpe/Sortino = `0.0`
/// - zero max drawdown → Calmar = `f64::INFINITY` if return is positive, else `0.0`
/// - zero gross losses → profit_factor = `f64::INFINITY` if gross profit > 0, else `0.0`
/// - no trades → win_rate/avg/best/worst = `0.0`
pub fn compute_stats(
    trades: &[TradeRecord],
    equity: &[EquityPoint],
    frequency: Frequency,
) -> BacktestStats {
    let initial = equity.first().map(|p| p.equity.to_f64().unwrap_or(0.0)).unwrap_or(0.0);
    let final_equity = equity.last().map(|p| p.equity.to_f64().unwrap_or(0.0)).unwrap_or(0.0);

    let total_return = if initial.abs() > f64::EPSILON {
        final_equity / initial - 1.0
    } else {
        0.0
    };

    let periods_per_year = frequency.periods_per_year();
    let n_periods = equity.len().saturating_sub(1) as f64;
    let annualized_return = if n_periods > 0.0 {
        (1.0 + total_return).powf(periods_per_year / n_periods) - 1.0
    } else {
        0.0
    };

    let returns = equity_returns(equity);
    let ret_mean = mean(&returns);
    let ret_std = std_dev(&returns);
    let annualized_volatility = ret_std * periods_per_year.sqrt();

    let sharpe = if ret_std > f64::EPSILON {
        (ret_mean / ret_std) * periods_per_year.sqrt()
    } else {
        0.0
    };

    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let downside_std = std_dev(&downside);
    let sortino = if downside_std > f64::EPSILON {
        (ret_mean / downside_std) * periods_per_year.sqrt()
    } else {
        0.0
    };

    let max_dd = max_drawdown(equity);
    let calmar = if max_dd.abs() > f64::EPSILON {
        annualized_return / max_dd.abs()
    } else if annualized_return > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let num_trades = trades.len();
    let (win_rate, avg_trade_return, best_trade, worst_trade, profit_factor) = if num_trades == 0 {
        (0.0, 0.0, 0.0, 0.0, 0.0)
    } else {
        let wins = trades.iter().filter(|t| t.pnl.is_sign_positive() && !t.pnl.is_zero()).count();
        let win_rate = wins as f64 / num_trades as f64;

        let trade_returns: Vec<f64> = trades.iter().map(|t| t.return_pct).collect();
        let avg_trade_return = mean(&trade_returns);
        let best_trade = trade_returns.iter().copied().fold(f64::MIN, f64::max);
        let worst_trade = trade_returns.iter().copied().fold(f64::MAX, f64::min);

        let gross_profit: f64 = trades
            .iter()
            .filter(|t| t.pnl.is_sign_positive())
            .map(|t| t.pnl.to_f64().unwrap_or(0.0))
            .sum();
        let gross_loss: f64 = trades
            .iter()
            .filter(|t| t.pnl.is_sign_negative())
            .map(|t| t.pnl.to_f64().unwrap_or(0.0).abs())
            .sum();
        let profit_factor = if gross_loss > f64::EPSILON {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        (win_rate, avg_trade_return, best_trade, worst_trade, profit_factor)
    };

    BacktestStats {
        total_return,
        annualized_return,
        annualized_volatility,
        sharpe,
        sortino,
        max_drawdown: max_dd,
        calmar,
        win_rate,
        profit_factor,
        avg_trade_return,
        best_trade,
        worst_trade,
        num_trades,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExitReason;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn point(day: i64, equity: Decimal) -> EquityPoint {
        EquityPoint {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(day),
            equity,
        }
    }

    #[test]
    fn flat_equity_curve_yields_zero_sharpe_and_drawdown() {
        let equity = vec![point(0, dec!(1000)), point(1, dec!(1000)), point(2, dec!(1000))];
        let stats = compute_stats(&[], &equity, Frequency::Day1);
        assert_eq!(stats.sharpe, 0.0);
        assert_eq!(stats.max_drawdown, 0.0);
        assert_eq!(stats.total_return, 0.0);
    }

    #[test]
    fn no_trades_yields_zero_sentinel_trade_stats() {
        let equity = vec![point(0, dec!(1000)), point(1, dec!(1050))];
        let stats = compute_stats(&[], &equity, Frequency::Day1);
        assert_eq!(stats.win_rate, 0.0);
        assert_eq!(stats.profit_factor, 0.0);
        assert_eq!(stats.num_trades, 0);
    }

    #[test]
    fn no_losing_trades_yields_infinite_profit_factor() {
        let trade = TradeRecord {
            entry_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            exit_time: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            entry_price: dec!(100),
            exit_price: dec!(110),
            size: dec!(1),
            pnl: dec!(10),
            return_pct: 0.10,
            exit_reason: ExitReason::Signal,
        };
        let equity = vec![point(0, dec!(1000)), point(1, dec!(1010))];
        let stats = compute_stats(&[trade], &equity, Frequency::Day1);
        assert!(stats.profit_factor.is_infinite());
        assert_eq!(stats.win_rate, 1.0);
    }

    #[test]
    fn drawdown_is_measured_from_running_peak() {
        let equity = vec![
            point(0, dec!(1000)),
            point(1, dec!(1200)),
            point(2, dec!(900)),
            point(3, dec!(1100)),
        ];
        let stats = compute_stats(&[], &equity, Frequency::Day1);
        assert!((stats.max_drawdown - (900.0 / 1200.0 - 1.0)).abs() < 1e-9);
    }
}
