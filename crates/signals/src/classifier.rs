use core_types::{mean, std_dev, ResearchError};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

const COMPONENT: &str = "logistic_classifier";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    pub learning_rate: f64,
    pub iterations: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        FitConfig {
            learning_rate: 0.1,
            iterations: 500,
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Binary logistic regression fit by batch gradient descent on standardized
/// features. This is the model-based signal generator's classifier (§4.3,
/// §9): an immutable artefact fit offline, then only ever queried via
/// [`LogisticClassifier::predict_proba`] on the request path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticClassifier {
    weights: Vec<f64>,
    bias: f64,
    feature_means: Vec<f64>,
    feature_stds: Vec<f64>,
    fitted: bool,
}

impl LogisticClassifier {
    pub fn new(n_features: usize) -> Self {
        LogisticClassifier {
            weights: vec![0.0; n_features],
            bias: 0.0,
            feature_means: vec![0.0; n_features],
            feature_stds: vec![1.0; n_features],
            fitted: false,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    /// Fit on a dense design matrix (`rows[i]` is the `i`-th training
    /// example, all rows the same length) and binary labels.
    pub fn fit(&mut self, rows: &[Vec<f64>], labels: &[u8], config: &FitConfig) -> Result<(), ResearchError> {
        let n = rows.len();
        if n == 0 || rows[0].is_empty() {
            return Err(ResearchError::InsufficientData {
                component: COMPONENT,
                detail: "fitting requires at least one row and at least one feature column".into(),
            });
        }
        if n != labels.len() {
            return Err(ResearchError::invalid_parameter(
                COMPONENT,
                "rows/labels",
                format!("{n}/{}", labels.len()),
                "row count must match label count",
            ));
        }
        let p = rows[0].len();

        let mut means = vec![0.0; p];
        let mut stds = vec![1.0; p];
        for j in 0..p {
            let column: Vec<f64> = rows.iter().map(|r| r[j]).collect();
            means[j] = mean(&column);
            let sd = std_dev(&column);
            stds[j] = if sd > f64::EPSILON { sd } else { 1.0 };
        }

        let mut standardized = vec![0.0; n * p];
        for (i, row) in rows.iter().enumerate() {
            for j in 0..p {
                standardized[i * p + j] = (row[j] - means[j]) / stds[j];
            }
        }
        let x = DMatrix::from_row_slice(n, p, &standardized);
        let y = DVector::from_vec(labels.iter().map(|&l| l as f64).collect());

        let mut w = DVector::from_element(p, 0.0);
        let mut b = 0.0;
        for _ in 0..config.iterations {
            let z = &x * &w + DVector::from_element(n, b);
            let p_hat = z.map(sigmoid);
            let error = &p_hat - &y;
            let grad_w = x.transpose() * &error / n as f64;
            let grad_b = error.sum() / n as f64;
            w -= grad_w * config.learning_rate;
            b -= grad_b * config.learning_rate;
        }

        self.weights = w.iter().copied().collect();
        self.bias = b;
        self.feature_means = means;
        self.feature_stds = stds;
        self.fitted = true;
        Ok(())
    }

    /// Predicted positive-class probability for one standardized feature
    /// row. Errors if the classifier has not been fit (§4.3: "unfit
    /// classifier → error on first call").
    pub fn predict_proba(&self, features: &[f64]) -> Result<f64, ResearchError> {
        if !self.fitted {
            return Err(ResearchError::UnfitModel {
                component: COMPONENT,
                detail: "predict_proba called before fit".into(),
            });
        }
        if features.len() != self.weights.len() {
            return Err(ResearchError::invalid_parameter(
                COMPONENT,
                "features.len()",
                features.len(),
                format!("expected {} feature columns", self.weights.len()),
            ));
        }
        let z: f64 = features
            .iter()
            .zip(self.weights.iter())
            .zip(self.feature_means.iter())
            .zip(self.feature_stds.iter())
            .map(|(((&x, &w), &m), &s)| w * ((x - m) / s))
            .sum::<f64>()
            + self.bias;
        Ok(sigmoid(z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfit_classifier_errors_on_predict() {
        let clf = LogisticClassifier::new(2);
        assert!(clf.predict_proba(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn separable_data_fits_to_near_deterministic_predictions() {
        let rows = vec![
            vec![-3.0],
            vec![-2.0],
            vec![-1.0],
            vec![1.0],
            vec![2.0],
            vec![3.0],
        ];
        let labels = vec![0, 0, 0, 1, 1, 1];
        let mut clf = LogisticClassifier::new(1);
        clf.fit(&rows, &labels, &FitConfig::default()).unwrap();
        assert!(clf.predict_proba(&[3.0]).unwrap() > 0.7);
        assert!(clf.predict_proba(&[-3.0]).unwrap() < 0.3);
    }
}
