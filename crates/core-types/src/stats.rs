/// General-purpose distribution statistics shared by the feature builder,
/// the walk-forward optimiser, and the Monte-Carlo simulator.

/// Compute the mean of a data slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Compute sample standard deviation.
pub fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    let variance = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    variance.sqrt()
}

/// Compute the percentile rank of `value` within `data` (returns 0.0 to 1.0).
/// Uses midpoint interpolation: ties count as half.
pub fn percentile_rank(value: f64, data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.5;
    }
    let count_below = data.iter().filter(|&&x| x < value).count();
    let count_equal = data.iter().filter(|&&x| (x - value).abs() < f64::EPSILON).count();
    (count_below as f64 + 0.5 * count_equal as f64) / data.len() as f64
}

/// Compute the z-score of `value` relative to `data`.
/// Returns 0.0 if data has insufficient variance.
pub fn z_score_of(value: f64, data: &[f64]) -> f64 {
    let sd = std_dev(data);
    if sd < f64::EPSILON {
        return 0.0;
    }
    (value - mean(data)) / sd
}

/// Compute a specific percentile value from data (0-100 scale).
/// Sorts data internally (clones).
pub fn percentile_value(data: &[f64], pct: f64) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((pct / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_rank() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((percentile_rank(3.0, &data) - 0.5).abs() < 0.01);
        assert!(percentile_rank(5.0, &data) > 0.8);
        assert!(percentile_rank(1.0, &data) < 0.2);
    }

    #[test]
    fn test_z_score() {
        let data = vec![10.0, 20.0, 30.0, 40.0, 50.0];
        let z = z_score_of(30.0, &data);
        assert!(z.abs() < 0.01); // mean value should have z ≈ 0
    }

    #[test]
    fn test_std_dev_constant_series() {
        let data = vec![5.0, 5.0, 5.0, 5.0];
        assert_eq!(std_dev(&data), 0.0);
        assert_eq!(z_score_of(5.0, &data), 0.0);
    }

    #[test]
    fn test_percentile_value_bounds() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile_value(&data, 0.0), 1.0);
        assert_eq!(percentile_value(&data, 100.0), 5.0);
    }
}
