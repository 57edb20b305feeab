use std::sync::Arc;

use core_types::{OhlcvSeries, ResearchError, ResearchLogger};
use features::{build_features, FeatureConfig};
use serde::{Deserialize, Serialize};

use crate::classifier::LogisticClassifier;
use crate::frame::SignalFrame;
use crate::generator::SignalGenerator;

const COMPONENT: &str = "model_signal_generator";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelSignalConfig {
    pub entry_threshold: f64,
    pub exit_threshold: f64,
}

impl ModelSignalConfig {
    /// Enforces hysteresis (`exit_threshold < entry_threshold`) at
    /// construction time, per §9 — never as a runtime check the caller
    /// could accidentally skip.
    pub fn new(entry_threshold: f64, exit_threshold: f64) -> Result<Self, ResearchError> {
        if !(exit_threshold < entry_threshold) {
            return Err(ResearchError::invalid_parameter(
                COMPONENT,
                "exit_threshold/entry_threshold",
                format!("{exit_threshold}/{entry_threshold}"),
                "exit_threshold must be strictly less than entry_threshold",
            ));
        }
        Ok(ModelSignalConfig {
            entry_threshold,
            exit_threshold,
        })
    }
}

/// Classifier-probability signal generator (§4.3). Owns a trained
/// classifier and the feature builder it was trained against; it does not
/// retrain on the fly (§9).
pub struct ModelSignalGenerator {
    config: ModelSignalConfig,
    feature_config: FeatureConfig,
    classifier: LogisticClassifier,
    logger: Arc<dyn ResearchLogger>,
}

impl ModelSignalGenerator {
    pub fn new(
        config: ModelSignalConfig,
        feature_config: FeatureConfig,
        classifier: LogisticClassifier,
        logger: Arc<dyn ResearchLogger>,
    ) -> Self {
        ModelSignalGenerator {
            config,
            feature_config,
            classifier,
            logger,
        }
    }
}

impl SignalGenerator for ModelSignalGenerator {
    fn name(&self) -> &str {
        "model_based"
    }

    fn generate_signals(&self, prices: &OhlcvSeries) -> Result<SignalFrame, ResearchError> {
        if !self.classifier.is_fitted() {
            return Err(ResearchError::UnfitModel {
                component: COMPONENT,
                detail: "generate_signals called with an unfit classifier".into(),
            });
        }

        let (table, _target) = build_features(prices, &self.feature_config)?;
        let n = table.len();
        let mut probabilities: Vec<Option<f64>> = vec![None; n];

        for t in 0..n {
            let row: Option<Vec<f64>> = table.values[t].iter().copied().collect();
            let Some(row) = row else {
                continue; // any missing required feature → no signal, not an error
            };
            match self.classifier.predict_proba(&row) {
                Ok(p) => probabilities[t] = Some(p),
                Err(e) => {
                    self.logger.warn(COMPONENT, &format!("probability undefined at row {t}: {e}"));
                }
            }
        }

        let (entries, exits) = apply_hysteresis(&probabilities, self.config.entry_threshold, self.config.exit_threshold);
        Ok(SignalFrame::new(table.timestamps.clone(), entries, exits))
    }
}

/// Threshold each probability into entry/exit flags. `θ_exit < θ_entry`
/// (enforced by [`ModelSignalConfig::new`]) damps chatter near the
/// boundary: once a probability has crossed above `θ_entry`, it has to
/// fall all the way below `θ_exit` — not merely back under `θ_entry` — to
/// exit. A bar with no probability (missing feature) emits neither flag.
fn apply_hysteresis(probabilities: &[Option<f64>], entry_threshold: f64, exit_threshold: f64) -> (Vec<bool>, Vec<bool>) {
    let n = probabilities.len();
    let mut entries = vec![false; n];
    let mut exits = vec![false; n];
    for (t, p) in probabilities.iter().enumerate() {
        let Some(p) = p else { continue };
        if *p > entry_threshold {
            entries[t] = true;
        } else if *p < exit_threshold {
            exits[t] = true;
        }
    }
    (entries, exits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use core_types::{Bar, NullLogger};

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
    fn hysteresis_config_rejects_inverted_thresholds() {
        assert!(ModelSignalConfig::new(0.4, 0.6).is_err());
        assert!(ModelSignalConfig::new(0.5, 0.5).is_err());
        assert!(ModelSignalConfig::new(0.6, 0.4).is_ok());
    }

    #[test]
    fn hysteresis_suppresses_chatter_near_boundary() {
        let probs = vec![Some(0.5), Some(0.7), Some(0.55), Some(0.45)];
        let (entries, exits) = apply_hysteresis(&probs, 0.6, 0.4);
        assert_eq!(entries, vec![false, true, false, false]);
        assert_eq!(exits, vec![false, false, false, true]);
    }

    #[test]
    fn unfit_classifier_errors_on_generate() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let s = series(&closes);
        let gen = ModelSignalGenerator::new(
            ModelSignalConfig::new(0.6, 0.4).unwrap(),
            FeatureConfig::default(),
            LogisticClassifier::new(1),
            Arc::new(NullLogger),
        );
        assert!(gen.generate_signals(&s).is_err());
    }
}
