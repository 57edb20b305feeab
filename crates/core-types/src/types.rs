use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ResearchError;

/// A single OHLCV observation.
///
/// Invariants (checked by [`OhlcvSeries::new`], not here — a `Bar` on its own
/// carries no index, so monotonicity can't be judged from one value):
/// `low <= min(open, close) <= max(open, close) <= high`, `volume >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    fn ohlc_valid(&self) -> bool {
        self.low <= self.open.min(self.close)
            && self.open.max(self.close) <= self.high
            && self.volume >= 0.0
    }
}

/// Sampling interval of a bar series. Used to pick the annualisation factor
/// for risk-adjusted metrics (§4.4) — misinference silently corrupts Sharpe,
/// so callers that know better should pass an explicit override rather than
/// rely on inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    Minute1,
    Minute5,
    Minute15,
    Minute30,
    Hour1,
    Day1,
    Week1,
    Month1,
    /// Sampling interval could not be matched to a known bucket.
    Unknown,
}

impl Frequency {
    /// Trading periods per year, used by Sharpe/Sortino/CAGR.
    pub fn periods_per_year(&self) -> f64 {
        const TRADING_DAYS: f64 = 252.0;
        const HOURS_PER_SESSION: f64 = 6.5;
        match self {
            Frequency::Minute1 => TRADING_DAYS * HOURS_PER_SESSION * 60.0,
            Frequency::Minute5 => TRADING_DAYS * HOURS_PER_SESSION * 12.0,
            Frequency::Minute15 => TRADING_DAYS * HOURS_PER_SESSION * 4.0,
            Frequency::Minute30 => TRADING_DAYS * HOURS_PER_SESSION * 2.0,
            Frequency::Hour1 => TRADING_DAYS * HOURS_PER_SESSION,
            Frequency::Day1 => TRADING_DAYS,
            Frequency::Week1 => 52.0,
            Frequency::Month1 => 12.0,
            // Fallback per §4.4: don't fabricate an annualisation factor.
            Frequency::Unknown => 1.0,
        }
    }

    /// Infer the sampling interval from the median gap between consecutive
    /// timestamps. Tolerant of small gaps from weekends/holidays: buckets by
    /// nearest known interval rather than requiring an exact match.
    pub fn infer(timestamps: &[DateTime<Utc>]) -> Frequency {
        if timestamps.len() < 2 {
            return Frequency::Unknown;
        }
        let mut gaps_minutes: Vec<i64> = timestamps
            .windows(2)
            .map(|w| (w[1] - w[0]).num_minutes())
            .filter(|g| *g > 0)
            .collect();
        if gaps_minutes.is_empty() {
            return Frequency::Unknown;
        }
        gaps_minutes.sort_unstable();
        let median = gaps_minutes[gaps_minutes.len() / 2];

        // Daily/weekly/monthly series have gaps inflated by weekends and
        // month lengths, so bucket those on day-scale thresholds; intraday
        // series are bucketed on the minute gap directly.
        match median {
            m if m <= 2 => Frequency::Minute1,
            m if m <= 7 => Frequency::Minute5,
            m if m <= 20 => Frequency::Minute15,
            m if m <= 45 => Frequency::Minute30,
            m if m <= 90 => Frequency::Hour1,
            m if m <= 60 * 24 + 60 * 24 * 2 /* tolerate long weekends */ => Frequency::Day1,
            m if m <= 60 * 24 * 10 => Frequency::Week1,
            m if m <= 60 * 24 * 40 => Frequency::Month1,
            _ => Frequency::Unknown,
        }
    }
}

/// An ordered, validated OHLCV bar series: monotone strictly increasing
/// timestamps, no duplicates, OHLC invariants satisfied on every bar.
///
/// This is the one mutation point for the contract-violation checks named in
/// §7 — every downstream component (features, signals, engine) takes an
/// `&OhlcvSeries` and can assume the invariants already hold.
#[derive(Debug, Clone)]
pub struct OhlcvSeries {
    bars: Vec<Bar>,
}

impl OhlcvSeries {
    pub fn new(bars: Vec<Bar>, component: &'static str) -> Result<Self, ResearchError> {
        if bars.is_empty() {
            return Err(ResearchError::EmptyInput {
                component,
                detail: "bar series must contain at least one observation".into(),
            });
        }
        for w in bars.windows(2) {
            if w[1].timestamp <= w[0].timestamp {
                return Err(ResearchError::NonMonotoneIndex {
                    component,
                    detail: format!(
                        "timestamp {} does not strictly follow {}",
                        w[1].timestamp, w[0].timestamp
                    ),
                });
            }
        }
        if let Some(bad) = bars.iter().find(|b| !b.ohlc_valid()) {
            return Err(ResearchError::InvalidParameter {
                component,
                field: "ohlc",
                value: format!(
                    "open={} high={} low={} close={} volume={}",
                    bad.open, bad.high, bad.low, bad.close, bad.volume
                ),
                detail: "expected low <= min(open,close) <= max(open,close) <= high and volume >= 0"
                    .into(),
            });
        }
        Ok(Self { bars })
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.bars.iter().map(|b| b.timestamp).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn opens(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.open).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    pub fn infer_frequency(&self) -> Frequency {
        Frequency::infer(&self.timestamps())
    }

    /// A new series truncated to the first `k` bars. Used by causality tests:
    /// `features(series)[..k] == features(series.prefix(k))` must hold.
    pub fn prefix(&self, k: usize) -> OhlcvSeries {
        OhlcvSeries {
            bars: self.bars[..k.min(self.bars.len())].to_vec(),
        }
    }

    /// A contiguous sub-series `[start, end)`. Used to carve train/test
    /// windows for walk-forward validation; the result carries no
    /// invariants beyond what the parent series already guaranteed, so it
    /// never needs to re-validate.
    pub fn slice(&self, start: usize, end: usize) -> OhlcvSeries {
        let end = end.min(self.bars.len());
        let start = start.min(end);
        OhlcvSeries {
            bars: self.bars[start..end].to_vec(),
        }
    }
}

/// Aligned entry/exit booleans (§3), produced by any `signals`-crate
/// generator and consumed by the backtest engine. Lives here rather than in
/// `signals` so the engine can depend on the shape of a signal frame
/// without depending on how one is produced. Invariant: `entries ∧ exits`
/// is never true at the same timestamp — construction resolves conflicts by
/// giving `entries` precedence rather than letting the invariant hold only
/// by convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalFrame {
    pub timestamps: Vec<DateTime<Utc>>,
    pub entries: Vec<bool>,
    pub exits: Vec<bool>,
}

impl SignalFrame {
    pub fn new(timestamps: Vec<DateTime<Utc>>, entries: Vec<bool>, mut exits: Vec<bool>) -> Self {
        for i in 0..entries.len().min(exits.len()) {
            if entries[i] {
                exits[i] = false;
            }
        }
        SignalFrame {
            timestamps,
            entries,
            exits,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

#[cfg(test)]
mod signal_frame_tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn entries_take_precedence_over_exits() {
        let ts = vec![Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()];
        let frame = SignalFrame::new(ts, vec![true], vec![true]);
        assert!(frame.entries[0]);
        assert!(!frame.exits[0]);
    }
}
