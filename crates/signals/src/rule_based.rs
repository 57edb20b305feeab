use core_types::{OhlcvSeries, ResearchError};
use serde::{Deserialize, Serialize};

use crate::frame::SignalFrame;
use crate::generator::SignalGenerator;

const COMPONENT: &str = "ma_cross_signal_generator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaType {
    Simple,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaCrossConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    pub ma_type: MaType,
}

impl MaCrossConfig {
    pub fn new(fast_period: usize, slow_period: usize, ma_type: MaType) -> Result<Self, ResearchError> {
        if fast_period == 0 || slow_period == 0 || fast_period >= slow_period {
            return Err(ResearchError::invalid_parameter(
                COMPONENT,
                "fast_period/slow_period",
                format!("{fast_period}/{slow_period}"),
                "fast_period must be nonzero and strictly less than slow_period",
            ));
        }
        Ok(MaCrossConfig {
            fast_period,
            slow_period,
            ma_type,
        })
    }
}

/// Moving-average cross signal generator (§4.3). Entry on the bar where the
/// fast MA crosses strictly above the slow MA; symmetric exit on the
/// downward cross. Pre-warmup bars (either MA undefined) emit no signal.
pub struct MaCrossGenerator {
    config: MaCrossConfig,
}

impl MaCrossGenerator {
    pub fn new(config: MaCrossConfig) -> Self {
        MaCrossGenerator { config }
    }

    fn moving_average(&self, closes: &[f64], period: usize) -> Vec<Option<f64>> {
        let raw = match self.config.ma_type {
            MaType::Simple => indicators::sma(closes, period),
            MaType::Exponential => indicators::ema(closes, period),
        };
        right_align(closes.len(), &raw)
    }
}

/// Right-align an indicator output (which always ends at the last input
/// bar) to `total_len`, padding missing leading warmup bars with `None`.
fn right_align(total_len: usize, raw: &[f64]) -> Vec<Option<f64>> {
    let pad = total_len.saturating_sub(raw.len());
    let mut out = Vec::with_capacity(total_len);
    out.extend(std::iter::repeat(None).take(pad));
    out.extend(raw.iter().map(|&v| if v.is_finite() { Some(v) } else { None }));
    out
}

impl SignalGenerator for MaCrossGenerator {
    fn name(&self) -> &str {
        "ma_cross"
    }

    fn generate_signals(&self, prices: &OhlcvSeries) -> Result<SignalFrame, ResearchError> {
        let closes = prices.closes();
        let n = closes.len();
        let fast = self.moving_average(&closes, self.config.fast_period);
        let slow = self.moving_average(&closes, self.config.slow_period);

        let mut entries = vec![false; n];
        let mut exits = vec![false; n];

        for t in 1..n {
            let (prev_fast, prev_slow, cur_fast, cur_slow) =
                match (fast[t - 1], slow[t - 1], fast[t], slow[t]) {
                    (Some(pf), Some(ps), Some(cf), Some(cs)) => (pf, ps, cf, cs),
                    _ => continue,
                };
            if prev_fast <= prev_slow && cur_fast > cur_slow {
                entries[t] = true;
            } else if prev_fast >= prev_slow && cur_fast < cur_slow {
                exits[t] = true;
            }
        }

        Ok(SignalFrame::new(prices.timestamps(), entries, exits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use core_types::Bar;

    fn series(closes: &[f64]) -> OhlcvSeries {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(i as i64),
                open: c,
                high: c + 0.5,
                low: c - 0.5,
                close: c,
                volume: 1_000.0,
            })
            .collect();
        OhlcvSeries::new(bars, "test").unwrap()
    }

    #[test]
    fn rejects_fast_not_less_than_slow() {
        assert!(MaCrossConfig::new(20, 10, MaType::Simple).is_err());
        assert!(MaCrossConfig::new(10, 10, MaType::Simple).is_err());
    }

    #[test]
    fn golden_cross_fires_entry() {
        // A V-shaped series: falling then sharply rising forces a fast-over-slow cross.
        let mut closes = Vec::new();
        for i in 0..20 {
            closes.push(100.0 - i as f64);
        }
        for i in 0..20 {
            closes.push(81.0 + i as f64 * 3.0);
        }
        let s = series(&closes);
        let config = MaCrossConfig::new(3, 10, MaType::Simple).unwrap();
        let gen = MaCrossGenerator::new(config);
        let frame = gen.generate_signals(&s).unwrap();
        assert!(frame.entries.iter().any(|&e| e));
    }

    #[test]
    fn no_signal_before_warmup() {
        let closes: Vec<f64> = (0..5).map(|i| 100.0 + i as f64).collect();
        let s = series(&closes);
        let config = MaCrossConfig::new(3, 4, MaType::Simple).unwrap();
        let gen = MaCrossGenerator::new(config);
        let frame = gen.generate_signals(&s).unwrap();
        assert!(frame.entries.iter().take(3).all(|&e| !e));
    }
}
