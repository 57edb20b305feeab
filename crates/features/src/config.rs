use serde::{Deserialize, Serialize};

/// Configuration for [`crate::build_features`].
///
/// `sma_periods` is also used to derive the fast/slow cross feature: the
/// smallest period is "fast", the largest is "slow". Two entries is the
/// useful minimum; a single entry disables the cross feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub sma_periods: Vec<usize>,
    pub rsi_period: usize,
    pub atr_period: usize,
    pub lookback_periods: Vec<usize>,
    pub horizon: usize,
    pub threshold: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            sma_periods: vec![10, 20, 50],
            rsi_period: 14,
            atr_period: 14,
            lookback_periods: vec![1, 5, 10],
            horizon: 5,
            threshold: 0.0,
        }
    }
}
