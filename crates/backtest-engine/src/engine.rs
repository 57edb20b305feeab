use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use core_types::{Bar, OhlcvSeries, ResearchError, ResearchLogger, SignalFrame};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::metrics::compute_stats;
use crate::models::{BacktestConfig, BacktestResult, EquityPoint, ExitReason, TradeRecord};

const COMPONENT: &str = "backtest_engine";

/// An open long position carried between bars. The engine is long-only per
/// §4.4: there is no `Short` variant, and no short-selling configuration.
pub(crate) struct OpenPosition {
    pub(crate) entry_idx: usize,
    pub(crate) entry_time: DateTime<Utc>,
    pub(crate) entry_price: Decimal,
    pub(crate) size: Decimal,
    pub(crate) stop_price: Option<Decimal>,
    pub(crate) target_price: Option<Decimal>,
}

/// Single-asset, single-threaded backtest engine (§4.4, §5). Runs one
/// `(prices, signals)` pair through a plain event loop — one pass over the
/// bars, no suspension points, no shared mutable state beyond the loop's own
/// locals, so the whole thing stays trivially `Send` for the walk-forward and
/// Monte-Carlo layers above it to parallelize *between* runs rather than
/// within one.
pub struct BacktestEngine {
    config: BacktestConfig,
    logger: Arc<dyn ResearchLogger>,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig, logger: Arc<dyn ResearchLogger>) -> Self {
        BacktestEngine { config, logger }
    }

    /// Run the backtest. `prices` and `signals` are intersected by
    /// timestamp first (§4.4) — a signal frame that doesn't align bar-for-bar
    /// with the price series is not an error, it is simply trimmed to the
    /// overlap.
    pub fn run(&self, prices: &OhlcvSeries, signals: &SignalFrame) -> Result<BacktestResult, ResearchError> {
        let (bars, entries, exits) = align(prices, signals);
        let n = bars.len();
        if n < 2 {
            return Err(ResearchError::InsufficientData {
                component: COMPONENT,
                detail: format!(
                    "{n} overlapping bar(s) between price series and signal frame, need at least 2"
                ),
            });
        }

        let delay = self.config.execution_delay as usize;
        let costs = self.config.costs;

        let mut cash = self.config.initial_capital;
        let mut position: Option<OpenPosition> = None;
        let mut trades: Vec<TradeRecord> = Vec::new();
        let mut equity: Vec<EquityPoint> = Vec::with_capacity(n);

        for i in 0..n {
            // SL/TP is checked intrabar, strictly after the entry bar, before
            // this bar's signal-driven exit — a stop that fires and a signal
            // exit on the same bar both close the same position, so only one
            // can win and the stop takes priority (§9).
            if let Some(pos) = &position {
                if i > pos.entry_idx {
                    if let Some(fill) = stop_fill(&bars[i], pos) {
                        let closed = position.take().unwrap();
                        trades.push(self.close_trade(&closed, bars[i].timestamp, fill.0, fill.1, &costs));
                        cash = self.settle(cash, trades.last().unwrap());
                    }
                }
            }

            // Signal-driven exit, only if the stop didn't already close it.
            if position.is_some() {
                let signal_idx = i.checked_sub(delay);
                let should_exit = signal_idx.map(|s| exits[s]).unwrap_or(false);
                if should_exit && i > position.as_ref().unwrap().entry_idx {
                    let closed = position.take().unwrap();
                    let fill_price = Decimal::from_f64(bars[i].open).unwrap_or(Decimal::ZERO);
                    trades.push(self.close_trade(&closed, bars[i].timestamp, fill_price, ExitReason::Signal, &costs));
                    cash = self.settle(cash, trades.last().unwrap());
                }
            }

            // Signal-driven entry, only when flat.
            if position.is_none() {
                let signal_idx = i.checked_sub(delay);
                let should_enter = signal_idx.map(|s| entries[s]).unwrap_or(false);
                if should_enter {
                    let fill_price = Decimal::from_f64(bars[i].open).unwrap_or(Decimal::ZERO);
                    if fill_price > Decimal::ZERO {
                        let effective_buy = fill_price * (Decimal::from_f64(1.0 + costs.commission_rate + costs.slippage_rate).unwrap_or(Decimal::ONE));
                        let budget = cash * Decimal::from_f64(self.config.size_fraction).unwrap_or(Decimal::ZERO);
                        let size = if effective_buy > Decimal::ZERO { budget / effective_buy } else { Decimal::ZERO };
                        if size > Decimal::ZERO {
                            let cost = size * effective_buy;
                            cash -= cost;
                            let stop_price = self.config.sl_pct.map(|p| fill_price * Decimal::from_f64(1.0 - p).unwrap_or(Decimal::ZERO));
                            let target_price = self.config.tp_pct.map(|p| fill_price * Decimal::from_f64(1.0 + p).unwrap_or(Decimal::ZERO));
                            position = Some(OpenPosition {
                                entry_idx: i,
                                entry_time: bars[i].timestamp,
                                entry_price: fill_price,
                                size,
                                stop_price,
                                target_price,
                            });
                        }
                    }
                }
            }

            let mark = position.as_ref().map(|p| p.size * Decimal::from_f64(bars[i].close).unwrap_or(Decimal::ZERO)).unwrap_or(Decimal::ZERO);
            equity.push(EquityPoint {
                timestamp: bars[i].timestamp,
                equity: cash + mark,
            });
        }

        // Force-close any still-open position at the final bar's close (§4.4).
        if let Some(pos) = position.take() {
            let last = &bars[n - 1];
            let fill_price = Decimal::from_f64(last.close).unwrap_or(Decimal::ZERO);
            let trade = self.close_trade(&pos, last.timestamp, fill_price, ExitReason::EndOfData, &costs);
            cash = self.settle(cash, &trade);
            trades.push(trade);
            if let Some(last_point) = equity.last_mut() {
                last_point.equity = cash;
            }
        }

        if trades.len() > 10_000 {
            self.logger.warn(
                COMPONENT,
                &format!("{} trades generated, unusually high for a single-asset run", trades.len()),
            );
        }

        let frequency = self.config.frequency_override.unwrap_or_else(|| prices.infer_frequency());
        let stats = compute_stats(&trades, &equity, frequency);

        Ok(BacktestResult { trades, equity, stats })
    }

    fn close_trade(
        &self,
        pos: &OpenPosition,
        exit_time: DateTime<Utc>,
        fill_price: Decimal,
        reason: ExitReason,
        costs: &crate::models::Costs,
    ) -> TradeRecord {
        let effective_sell = fill_price * Decimal::from_f64(1.0 - costs.commission_rate - costs.slippage_rate).unwrap_or(Decimal::ONE);
        let proceeds = pos.size * effective_sell;
        let effective_buy_cost = pos.size * pos.entry_price * Decimal::from_f64(1.0 + costs.commission_rate + costs.slippage_rate).unwrap_or(Decimal::ONE);
        let pnl = proceeds - effective_buy_cost;
        let return_pct = if effective_buy_cost > Decimal::ZERO {
            (pnl / effective_buy_cost).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };
        TradeRecord {
            entry_time: pos.entry_time,
            exit_time,
            entry_price: pos.entry_price,
            exit_price: fill_price,
            size: pos.size,
            pnl,
            return_pct,
            exit_reason: reason,
        }
    }

    /// Credit proceeds (`size * effective_sell`) back to cash. Entry already
    /// debited its cost when the position was opened.
    fn settle(&self, cash: Decimal, trade: &TradeRecord) -> Decimal {
        let costs = self.config.costs;
        let effective_sell = trade.exit_price * Decimal::from_f64(1.0 - costs.commission_rate - costs.slippage_rate).unwrap_or(Decimal::ONE);
        cash + trade.size * effective_sell
    }
}

/// Stop-loss / take-profit intrabar check, with the pessimistic tie-break
/// and gap-fill rule resolved per §9: if both are touched within the same
/// bar, the stop loses the trade first; if the bar's open already gapped
/// through the triggered level, the fill is the open, not the nominal level.
pub(crate) fn stop_fill(bar: &Bar, pos: &OpenPosition) -> Option<(Decimal, ExitReason)> {
    let open = Decimal::from_f64(bar.open).unwrap_or(Decimal::ZERO);
    let low = Decimal::from_f64(bar.low).unwrap_or(Decimal::ZERO);
    let high = Decimal::from_f64(bar.high).unwrap_or(Decimal::ZERO);

    let stop_touched = pos.stop_price.map(|s| low <= s).unwrap_or(false);
    if stop_touched {
        let s = pos.stop_price.unwrap();
        let fill = if open <= s { open } else { s };
        return Some((fill, ExitReason::StopLoss));
    }

    let target_touched = pos.target_price.map(|t| high >= t).unwrap_or(false);
    if target_touched {
        let t = pos.target_price.unwrap();
        let fill = if open >= t { open } else { t };
        return Some((fill, ExitReason::TakeProfit));
    }

    None
}

/// Intersect `prices` and `signals` by timestamp, returning the common bars
/// in price-series order along with the corresponding entry/exit flags.
fn align(prices: &OhlcvSeries, signals: &SignalFrame) -> (Vec<Bar>, Vec<bool>, Vec<bool>) {
    let signal_idx: HashMap<DateTime<Utc>, usize> = signals
        .timestamps
        .iter()
        .enumerate()
        .map(|(i, &t)| (t, i))
        .collect();

    let mut bars = Vec::new();
    let mut entries = Vec::new();
    let mut exits = Vec::new();
    for bar in prices.bars() {
        if let Some(&si) = signal_idx.get(&bar.timestamp) {
            bars.push(*bar);
            entries.push(signals.entries[si]);
            exits.push(signals.exits[si]);
        }
    }
    (bars, entries, exits)
}

