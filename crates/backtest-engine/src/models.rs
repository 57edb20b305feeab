use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_types::{Frequency, ResearchError};

const COMPONENT: &str = "backtest_engine";

/// Why a position was closed (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    Signal,
    StopLoss,
    TakeProfit,
    EndOfData,
}

/// A completed round-trip (§3). `entry_time < exit_time` strictly — the
/// engine never opens and closes a position on the same bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub size: Decimal,
    pub pnl: Decimal,
    pub return_pct: f64,
    pub exit_reason: ExitReason,
}

/// One point on the equity curve, recorded every bar (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: Decimal,
}

/// Commission and slippage, both expressed as fractions (e.g. `0.001` =
/// 0.1%), never basis points or whole-number percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Costs {
    pub commission_rate: f64,
    pub slippage_rate: f64,
}

/// A fraction above this is almost certainly a percentage passed where a
/// fraction was expected (e.g. `2.0` meaning "2%" instead of `0.02`).
const MAX_PLAUSIBLE_RATE: f64 = 0.2;

/// Backtest configuration (§4.4). Constructed only through [`BacktestConfig::new`]
/// so every contract violation named in §7 is caught at construction time,
/// never discovered mid-simulation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub initial_capital: Decimal,
    pub costs: Costs,
    /// Bars between signal observation and fill: `0` or `1` (§4.4).
    pub execution_delay: u8,
    pub size_fraction: f64,
    pub sl_pct: Option<f64>,
    pub tp_pct: Option<f64>,
    pub frequency_override: Option<Frequency>,
}

impl BacktestConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        initial_capital: Decimal,
        costs: Costs,
        execution_delay: u8,
        size_fraction: f64,
        sl_pct: Option<f64>,
        tp_pct: Option<f64>,
        frequency_override: Option<Frequency>,
    ) -> Result<Self, ResearchError> {
        if initial_capital <= Decimal::ZERO {
            return Err(ResearchError::invalid_parameter(
                COMPONENT,
                "initial_capital",
                initial_capital,
                "must be > 0",
            ));
        }
        for (field, rate) in [
            ("commission_rate", costs.commission_rate),
            ("slippage_rate", costs.slippage_rate),
        ] {
            if !(0.0..=MAX_PLAUSIBLE_RATE).contains(&rate) {
                return Err(ResearchError::invalid_parameter(
                    COMPONENT,
                    field,
                    rate,
                    format!(
                        "expected a fraction in [0, {MAX_PLAUSIBLE_RATE}]; a common mistake is \
                         passing a whole-number percentage (e.g. 1.0 meaning 1%) instead of 0.01"
                    ),
                ));
            }
        }
        if execution_delay > 1 {
            return Err(ResearchError::invalid_parameter(
                COMPONENT,
                "execution_delay",
                execution_delay,
                "must be 0 or 1",
            ));
        }
        if !(size_fraction > 0.0 && size_fraction <= 1.0) {
            return Err(ResearchError::invalid_parameter(
                COMPONENT,
                "size_fraction",
                size_fraction,
                "must be in (0, 1]",
            ));
        }
        for (field, pct) in [("sl_pct", sl_pct), ("tp_pct", tp_pct)] {
            if let Some(p) = pct {
                if !(p > 0.0) {
                    return Err(ResearchError::invalid_parameter(
                        COMPONENT,
                        field,
                        p,
                        "must be > 0 when set",
                    ));
                }
            }
        }
        if execution_delay == 0 && (sl_pct.is_some() || tp_pct.is_some()) {
            return Err(ResearchError::invalid_parameter(
                COMPONENT,
                "execution_delay",
                execution_delay,
                "execution_delay=0 combined with sl_pct/tp_pct is rejected: there is no delay \
                 bar separating signal observation from the intrabar stop check",
            ));
        }
        Ok(BacktestConfig {
            initial_capital,
            costs,
            execution_delay,
            size_fraction,
            sl_pct,
            tp_pct,
            frequency_override,
        })
    }
}

/// Scalar metrics bundle (§4.4). Every field is always defined — undefined
/// cases (empty trades, zero variance) degrade to a documented sentinel
/// (`0.0` or `±f64::INFINITY`) rather than `Option` or `NaN`, per §7.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct BacktestStats {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe: f64,
    pub sortino: f64,
    /// Always `<= 0`; `0.0` means the equity curve never fell below its
    /// running peak.
    pub max_drawdown: f64,
    pub calmar: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_trade_return: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub num_trades: usize,
}

/// The bundle produced by one backtest run (§3): trades, equity curve, and
/// the metrics derived from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub trades: Vec<TradeRecord>,
    pub equity: Vec<EquityPoint>,
    pub stats: BacktestStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn costs(c: f64, s: f64) -> Costs {
        Costs {
            commission_rate: c,
            slippage_rate: s,
        }
    }

    #[test]
    fn rejects_non_positive_capital() {
        assert!(BacktestConfig::new(Decimal::ZERO, costs(0.0, 0.0), 1, 1.0, None, None, None).is_err());
    }

    #[test]
    fn rejects_implausible_commission() {
        // A classic user error: passing "1%" as 1.0 instead of 0.01.
        assert!(BacktestConfig::new(Decimal::from(1000), costs(1.0, 0.0), 1, 1.0, None, None, None).is_err());
    }

    #[test]
    fn rejects_size_fraction_out_of_range() {
        assert!(BacktestConfig::new(Decimal::from(1000), costs(0.0, 0.0), 1, 0.0, None, None, None).is_err());
        assert!(BacktestConfig::new(Decimal::from(1000), costs(0.0, 0.0), 1, 1.5, None, None, None).is_err());
        assert!(BacktestConfig::new(Decimal::from(1000), costs(0.0, 0.0), 1, 1.0, None, None, None).is_ok());
    }

    #[test]
    fn rejects_zero_delay_with_stops() {
        assert!(BacktestConfig::new(Decimal::from(1000), costs(0.0, 0.0), 0, 1.0, Some(0.05), None, None).is_err());
        assert!(BacktestConfig::new(Decimal::from(1000), costs(0.0, 0.0), 0, 1.0, None, None, None).is_ok());
    }
}
