use core_types::{OhlcvSeries, ResearchError};
use indicators::{atr, bollinger_bands, macd, rsi, sma};

use crate::config::FeatureConfig;
use crate::table::{FeatureTable, TargetVector};

const COMPONENT: &str = "features";

/// `x` if finite, `None` otherwise (undefined ratios, e.g. division by a
/// zero-width Bollinger Band, must not leak an infinity into the table).
fn finite(x: f64) -> Option<f64> {
    if x.is_finite() {
        Some(x)
    } else {
        None
    }
}

/// Right-align an indicator's output (which always ends at the last input
/// bar) to `total_len`, padding the missing leading warmup bars with `None`.
fn align(total_len: usize, raw: &[f64]) -> Vec<Option<f64>> {
    let pad = total_len.saturating_sub(raw.len());
    let mut out = Vec::with_capacity(total_len);
    out.extend(std::iter::repeat(None).take(pad));
    out.extend(raw.iter().map(|&v| finite(v)));
    out
}

/// Lag a fully-computed column by exactly one bar: `shifted[t] = raw[t-1]`,
/// `shifted[0] = None`. This is the one place causality is enforced — every
/// column is built on unshifted prices up to this point (§4.2).
fn lag_one(raw: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(raw.len());
    out.push(None);
    out.extend(raw[..raw.len().saturating_sub(1)].iter().copied());
    out
}

/// Build the feature table and target vector for a price series per §4.2.
///
/// Every feature is computed on the *unshifted* price series; the whole
/// table is lagged by one bar as the very last step, so `feature[t]` only
/// ever depends on bars strictly before `t`. Shifting the inputs first and
/// then running a stateful smoother (Wilder's RSI, EMA) over the shifted
/// series would double-lag it — not equivalent to lagging once.
pub fn build_features(
    series: &OhlcvSeries,
    config: &FeatureConfig,
) -> Result<(FeatureTable, TargetVector), ResearchError> {
    let bars = series.bars();
    let n = bars.len();

    if config.horizon >= n {
        return Ok((
            FeatureTable {
                timestamps: vec![],
                columns: vec![],
                values: vec![],
            },
            vec![],
        ));
    }

    let closes = series.closes();
    let highs = series.highs();
    let lows = series.lows();
    let volumes = series.volumes();
    let timestamps = series.timestamps();

    let mut columns: Vec<String> = Vec::new();
    let mut raw: Vec<Vec<Option<f64>>> = Vec::new();

    // Past-window returns and momentum over the configured lookbacks.
    for &k in &config.lookback_periods {
        if k == 0 || k >= n {
            continue;
        }
        let mut ret = vec![None; n];
        let mut mom = vec![None; n];
        for t in k..n {
            ret[t] = finite(closes[t] / closes[t - k] - 1.0);
            mom[t] = finite(closes[t] - closes[t - k]);
        }
        columns.push(format!("return_{k}"));
        raw.push(ret);
        columns.push(format!("momentum_{k}"));
        raw.push(mom);
    }

    // SMAs and close/sma - 1 ratios.
    for &p in &config.sma_periods {
        if p == 0 {
            continue;
        }
        let sma_vals = align(n, &sma(&closes, p));
        let ratio: Vec<Option<f64>> = sma_vals
            .iter()
            .zip(closes.iter())
            .map(|(s, &c)| s.and_then(|s| finite(c / s - 1.0)))
            .collect();
        columns.push(format!("sma_{p}"));
        raw.push(sma_vals);
        columns.push(format!("close_over_sma_{p}"));
        raw.push(ratio);
    }

    // Fast/slow SMA cross and its normalised spread.
    if config.sma_periods.len() >= 2 {
        let fast_p = *config.sma_periods.iter().min().unwrap();
        let slow_p = *config.sma_periods.iter().max().unwrap();
        let fast = align(n, &sma(&closes, fast_p));
        let slow = align(n, &sma(&closes, slow_p));
        let cross: Vec<Option<f64>> = fast
            .iter()
            .zip(slow.iter())
            .map(|(f, s)| match (f, s) {
                (Some(f), Some(s)) => Some(if f > s { 1.0 } else { 0.0 }),
                _ => None,
            })
            .collect();
        let spread: Vec<Option<f64>> = fast
            .iter()
            .zip(slow.iter())
            .map(|(f, s)| match (f, s) {
                (Some(f), Some(s)) => finite((f - s) / s),
                _ => None,
            })
            .collect();
        columns.push("sma_cross".into());
        raw.push(cross);
        columns.push("sma_cross_spread".into());
        raw.push(spread);
    }

    // RSI plus overbought/oversold flags.
    if config.rsi_period > 0 {
        let rsi_vals = align(n, &rsi(&closes, config.rsi_period));
        let oversold: Vec<Option<f64>> = rsi_vals
            .iter()
            .map(|v| v.map(|v| if v < 30.0 { 1.0 } else { 0.0 }))
            .collect();
        let overbought: Vec<Option<f64>> = rsi_vals
            .iter()
            .map(|v| v.map(|v| if v > 70.0 { 1.0 } else { 0.0 }))
            .collect();
        columns.push("rsi".into());
        raw.push(rsi_vals);
        columns.push("rsi_oversold".into());
        raw.push(oversold);
        columns.push("rsi_overbought".into());
        raw.push(overbought);
    }

    // ATR and ATR/price.
    if config.atr_period > 0 {
        let atr_vals = align(n, &atr(bars, config.atr_period));
        let atr_over_price: Vec<Option<f64>> = atr_vals
            .iter()
            .zip(closes.iter())
            .map(|(a, &c)| a.and_then(|a| finite(a / c)))
            .collect();
        columns.push("atr".into());
        raw.push(atr_vals);
        columns.push("atr_over_price".into());
        raw.push(atr_over_price);
    }

    // Rolling standard deviation of returns over two windows.
    let returns: Vec<f64> = {
        let mut r = vec![0.0; n];
        for t in 1..n {
            r[t] = closes[t] / closes[t - 1] - 1.0;
        }
        r
    };
    let std_windows = stdev_windows(&config.lookback_periods);
    for w in std_windows {
        if w == 0 || w >= n {
            continue;
        }
        let mut stdev = vec![None; n];
        for t in w..n {
            stdev[t] = finite(core_types::std_dev(&returns[t - w + 1..=t]));
        }
        columns.push(format!("return_std_{w}"));
        raw.push(stdev);
    }

    // MACD line, signal, histogram (standard 12/26/9 parameterisation).
    {
        let m = macd(&closes, 12, 26, 9);
        columns.push("macd_line".into());
        raw.push(align(n, &m.macd_line));
        columns.push("macd_signal".into());
        raw.push(align(n, &m.signal_line));
        columns.push("macd_histogram".into());
        raw.push(align(n, &m.histogram));
    }

    // Bollinger position and width (standard 20-period, 2 sigma).
    {
        let bb = bollinger_bands(&closes, 20, 2.0);
        let bb_upper = align(n, &bb.upper);
        let bb_lower = align(n, &bb.lower);
        let position: Vec<Option<f64>> = (0..n)
            .map(|t| match (bb_upper[t], bb_lower[t]) {
                (Some(u), Some(l)) => finite((closes[t] - l) / (u - l)),
                _ => None,
            })
            .collect();
        let width: Vec<Option<f64>> = (0..n)
            .map(|t| match (bb_upper[t], bb_lower[t]) {
                (Some(u), Some(l)) => finite((u - l) / closes[t]),
                _ => None,
            })
            .collect();
        columns.push("bollinger_position".into());
        raw.push(position);
        columns.push("bollinger_width".into());
        raw.push(width);
    }

    // Volume ratio against its own 20-period SMA.
    if volumes.iter().any(|&v| v > 0.0) {
        let vol_sma = align(n, &sma(&volumes, 20));
        let ratio: Vec<Option<f64>> = vol_sma
            .iter()
            .zip(volumes.iter())
            .map(|(s, &v)| s.and_then(|s| finite(v / s)))
            .collect();
        columns.push("volume_ratio".into());
        raw.push(ratio);
    }

    // Intra-bar range and close position within the bar.
    {
        let mut range = vec![None; n];
        let mut close_pos = vec![None; n];
        for t in 0..n {
            range[t] = finite((highs[t] - lows[t]) / closes[t]);
            let span = highs[t] - lows[t];
            close_pos[t] = if span > 0.0 {
                finite((closes[t] - lows[t]) / span)
            } else {
                Some(0.5)
            };
        }
        columns.push("intrabar_range".into());
        raw.push(range);
        columns.push("close_position".into());
        raw.push(close_pos);
    }

    // Lag every column by exactly one bar — the single causality boundary.
    let lagged: Vec<Vec<Option<f64>>> = raw.iter().map(|c| lag_one(c)).collect();

    let mut values: Vec<Vec<Option<f64>>> = Vec::with_capacity(n);
    for t in 0..n {
        values.push(lagged.iter().map(|col| col[t]).collect());
    }

    let table = FeatureTable {
        timestamps,
        columns,
        values,
    };

    let target = build_target(&closes, config.horizon, config.threshold);

    Ok((table, target))
}

/// `future_return[t] = close[t+h]/close[t] - 1`; `target[t] = 1` if that
/// exceeds `threshold`, else `0`. Undefined (the trailing `h` rows) is
/// `None`, not a sentinel value that could be mistaken for a real label.
fn build_target(closes: &[f64], horizon: usize, threshold: f64) -> TargetVector {
    let n = closes.len();
    (0..n)
        .map(|t| {
            if t + horizon >= n {
                None
            } else {
                let future_return = closes[t + horizon] / closes[t] - 1.0;
                Some(if future_return > threshold { 1 } else { 0 })
            }
        })
        .collect()
}

/// Two rolling-stdev window sizes derived from the configured lookbacks:
/// the two largest distinct values, falling back to 5/20 when fewer than
/// two lookbacks are configured.
fn stdev_windows(lookback_periods: &[usize]) -> Vec<usize> {
    let mut sorted: Vec<usize> = lookback_periods.iter().copied().filter(|&p| p > 1).collect();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.len() >= 2 {
        let len = sorted.len();
        vec![sorted[len - 2], sorted[len - 1]]
    } else {
        vec![5, 20]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_types::Bar;

    fn series(closes: &[f64]) -> OhlcvSeries {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                    + chrono::Duration::days(i as i64),
                open: c,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 1_000.0,
            })
            .collect();
        OhlcvSeries::new(bars, "test").unwrap()
    }

    #[test]
    fn lag_shifts_every_column_by_one_bar() {
        let closes: Vec<f64> = (1..=60).map(|i| 100.0 + i as f64).collect();
        let s = series(&closes);
        let config = FeatureConfig::default();
        let (table, _target) = build_features(&s, &config).unwrap();
        assert!(table.values[0].iter().all(|v| v.is_none()));
    }

    #[test]
    fn causality_prefix_matches_full_series() {
        let closes: Vec<f64> = (1..=80)
            .map(|i| 100.0 + (i as f64 * 0.37).sin() * 5.0 + i as f64)
            .collect();
        let full = series(&closes);
        let prefix = full.prefix(60);

        let config = FeatureConfig::default();
        let (full_table, _) = build_features(&full, &config).unwrap();
        let (prefix_table, _) = build_features(&prefix, &config).unwrap();

        for t in 0..59 {
            assert_eq!(full_table.values[t], prefix_table.values[t], "row {t} diverged");
        }
    }

    #[test]
    fn horizon_at_or_past_series_length_yields_empty_dataset() {
        let closes: Vec<f64> = (1..=10).map(|i| 100.0 + i as f64).collect();
        let s = series(&closes);
        let config = FeatureConfig {
            horizon: 10,
            ..FeatureConfig::default()
        };
        let (table, target) = build_features(&s, &config).unwrap();
        assert!(table.is_empty());
        assert!(target.is_empty());
    }

    #[test]
    fn target_undefined_for_trailing_horizon_rows() {
        let closes: Vec<f64> = (1..=30).map(|i| 100.0 + i as f64).collect();
        let s = series(&closes);
        let config = FeatureConfig {
            horizon: 5,
            threshold: 0.0,
            ..FeatureConfig::default()
        };
        let (_table, target) = build_features(&s, &config).unwrap();
        assert_eq!(target.len(), 30);
        for t in 25..30 {
            assert_eq!(target[t], None);
        }
        // Monotonically increasing closes: every defined label is positive.
        for t in 0..25 {
            assert_eq!(target[t], Some(1));
        }
    }

    #[test]
    fn drop_na_removes_rows_with_any_missing_value() {
        let closes: Vec<f64> = (1..=60).map(|i| 100.0 + i as f64).collect();
        let s = series(&closes);
        let config = FeatureConfig::default();
        let (table, _) = build_features(&s, &config).unwrap();
        let dropped = table.drop_na();
        assert!(dropped.len() < table.len());
        assert!(dropped
            .values
            .iter()
            .all(|row| row.iter().all(|v| v.is_some())));
    }
}
