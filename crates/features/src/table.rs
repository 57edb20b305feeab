use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A feature matrix aligned to a timestamp index: `values[row][col]`.
///
/// Missing values (warmup periods, lagged first bar, non-finite ratios) are
/// `None`, never `NaN` — so a caller can't accidentally let a missing value
/// poison a sum without noticing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureTable {
    pub timestamps: Vec<DateTime<Utc>>,
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.values.iter().map(|row| row[idx]).collect())
    }

    /// Row indices with no missing value in any column.
    pub fn complete_rows(&self) -> Vec<usize> {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, row)| row.iter().all(|v| v.is_some()))
            .map(|(i, _)| i)
            .collect()
    }

    /// A copy containing only rows with no missing feature value.
    pub fn drop_na(&self) -> FeatureTable {
        let keep = self.complete_rows();
        FeatureTable {
            timestamps: keep.iter().map(|&i| self.timestamps[i]).collect(),
            columns: self.columns.clone(),
            values: keep.iter().map(|&i| self.values[i].clone()).collect(),
        }
    }
}

/// A binary label per timestamp, `None` where undefined (the trailing
/// `horizon` rows, per §4.2).
pub type TargetVector = Vec<Option<u8>>;
