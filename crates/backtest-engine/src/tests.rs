use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use core_types::{Bar, NullLogger, OhlcvSeries, SignalFrame};
use rust_decimal_macros::dec;

use crate::engine::{stop_fill, BacktestEngine, OpenPosition};
use crate::models::{BacktestConfig, Costs, ExitReason};

fn bar(day: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar {
        timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day),
        open,
        high,
        low,
        close,
        volume: 1_000.0,
    }
}

fn engine(config: BacktestConfig) -> BacktestEngine {
    BacktestEngine::new(config, Arc::new(NullLogger))
}

fn no_cost_config() -> BacktestConfig {
    BacktestConfig::new(
        dec!(10000),
        Costs { commission_rate: 0.0, slippage_rate: 0.0 },
        1,
        1.0,
        None,
        None,
        None,
    )
    .unwrap()
}

/// Reproduces the worked execution-timing example: entry observed at
/// bar 1 fills at bar 2's open (104), exit observed at bar 4 fills at
/// bar 5's open (106), a ~1.92% trade.
#[test]
fn execution_delay_one_fills_at_next_bar_open() {
    let opens = [100.0, 102.0, 104.0, 103.0, 105.0, 106.0, 104.0, 107.0, 108.0, 110.0];
    let bars: Vec<Bar> = opens
        .iter()
        .enumerate()
        .map(|(i, &o)| bar(i as i64, o, o + 1.0, o - 1.0, o))
        .collect();
    let series = OhlcvSeries::new(bars, "test").unwrap();

    let mut entries = vec![false; 10];
    let mut exits = vec![false; 10];
    entries[1] = true;
    exits[4] = true;
    let frame = SignalFrame::new(series.timestamps(), entries, exits);

    let result = engine(no_cost_config()).run(&series, &frame).unwrap();
    assert_eq!(result.trades.len(), 1);
    let t = &result.trades[0];
    assert_eq!(t.entry_price, dec!(104));
    assert_eq!(t.exit_price, dec!(106));
    assert!((t.return_pct - (106.0 / 104.0 - 1.0)).abs() < 1e-9);
}

#[test]
fn stop_loss_wins_tie_break_over_take_profit() {
    // Entry at bar 1's open (100). Bar 2 gaps/ranges through both the
    // stop (95) and the target (105) in the same bar.
    let bars = vec![
        bar(0, 100.0, 101.0, 99.0, 100.0),
        bar(1, 100.0, 101.0, 99.0, 100.0),
        bar(2, 100.0, 106.0, 90.0, 95.0),
    ];
    let series = OhlcvSeries::new(bars, "test").unwrap();
    let mut entries = vec![false; 3];
    entries[0] = true;
    let exits = vec![false; 3];
    let frame = SignalFrame::new(series.timestamps(), entries, exits);

    let config = BacktestConfig::new(
        dec!(10000),
        Costs { commission_rate: 0.0, slippage_rate: 0.0 },
        1,
        1.0,
        Some(0.05),
        Some(0.05),
        None,
    )
    .unwrap();
    let result = engine(config).run(&series, &frame).unwrap();
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].exit_reason, ExitReason::StopLoss);
}

#[test]
fn stop_fills_at_open_when_already_gapped_through() {
    let pos = OpenPosition {
        entry_idx: 0,
        entry_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        entry_price: dec!(100),
        size: dec!(1),
        stop_price: Some(dec!(95)),
        target_price: None,
    };
    let gapped = bar(1, 90.0, 92.0, 88.0, 91.0);
    let (fill, reason) = stop_fill(&gapped, &pos).unwrap();
    assert_eq!(fill, dec!(90));
    assert_eq!(reason, ExitReason::StopLoss);
}

#[test]
fn unopened_positions_force_close_at_final_bar() {
    let bars = vec![
        bar(0, 100.0, 101.0, 99.0, 100.0),
        bar(1, 101.0, 102.0, 100.0, 101.0),
        bar(2, 102.0, 103.0, 101.0, 102.0),
    ];
    let series = OhlcvSeries::new(bars, "test").unwrap();
    let mut entries = vec![false; 3];
    entries[0] = true;
    let exits = vec![false; 3];
    let frame = SignalFrame::new(series.timestamps(), entries, exits);

    let result = engine(no_cost_config()).run(&series, &frame).unwrap();
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].exit_reason, ExitReason::EndOfData);
}

#[test]
fn fewer_than_two_overlapping_bars_is_an_error() {
    let bars: Vec<Bar> = (0..5).map(|i| bar(i, 100.0, 101.0, 99.0, 100.0)).collect();
    let series = OhlcvSeries::new(bars, "test").unwrap();
    let one_timestamp = series.timestamps()[..1].to_vec();
    let frame = SignalFrame::new(one_timestamp, vec![true], vec![false]);

    let result = engine(no_cost_config()).run(&series, &frame);
    assert!(result.is_err());
}

#[test]
fn misaligned_signal_frame_is_trimmed_to_overlap() {
    let bars: Vec<Bar> = (0..5).map(|i| bar(i, 100.0, 101.0, 99.0, 100.0)).collect();
    let series = OhlcvSeries::new(bars, "test").unwrap();
    let short_timestamps = series.timestamps()[..2].to_vec();
    let frame = SignalFrame::new(short_timestamps, vec![true, false], vec![false, false]);

    let result = engine(no_cost_config()).run(&series, &frame).unwrap();
    assert_eq!(result.equity.len(), 2);
}
