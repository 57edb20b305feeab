use std::sync::Arc;

use backtest_engine::{BacktestConfig, BacktestEngine};
use core_types::{mean, std_dev, OhlcvSeries, ResearchError, ResearchLogger};
use rayon::prelude::*;
use signals::{MaCrossConfig, MaCrossGenerator, MaType, SignalGenerator};

use crate::models::{
    generate_param_grid, OptimizationMetric, ParamPoint, WalkForwardConfig, WalkForwardFold,
    WalkForwardResult,
};

const COMPONENT: &str = "walk_forward";

/// Read the configured optimisation target off a completed backtest's stats
/// bundle (§4.5.1: "Sharpe by default", but nothing in the search loop
/// depends on which risk-adjusted metric is being maximised).
fn target_metric(stats: &backtest_engine::BacktestStats, metric: OptimizationMetric) -> f64 {
    match metric {
        OptimizationMetric::Sharpe => stats.sharpe,
        OptimizationMetric::Sortino => stats.sortino,
        OptimizationMetric::Calmar => stats.calmar,
        OptimizationMetric::TotalReturn => stats.total_return,
    }
}

/// Log a trial failure and fold it into a [`ResearchError::SearchTrialFailed`]
/// naming the grid point and the underlying cause, per §4.5.1: "the trial
/// returns a large negative score and the search continues. The error is
/// logged with trial parameters." Returns `f64::NEG_INFINITY` so the caller
/// can use this as the tail expression of each failing branch in [`score`].
fn trial_failed(point: &ParamPoint, cause: impl std::fmt::Display, logger: &Arc<dyn ResearchLogger>) -> f64 {
    let detail = format!(
        "fast={}, slow={}, sl={:?}, tp={:?}: {cause}",
        point.fast_period, point.slow_period, point.sl_pct, point.tp_pct
    );
    let err = ResearchError::SearchTrialFailed {
        component: COMPONENT,
        detail,
    };
    logger.warn(COMPONENT, &err.to_string());
    f64::NEG_INFINITY
}

/// Score a single grid point on one price slice. Constructor violations
/// (e.g. `fast >= slow`, or a rejected `execution_delay=0` + SL/TP
/// combination) and empty-signal or empty-overlap runs are all penalised
/// with `f64::NEG_INFINITY` rather than propagated, per §4.5.1: a bad
/// combination loses the grid search, it does not abort it.
fn score(
    prices: &OhlcvSeries,
    base: &BacktestConfig,
    point: &ParamPoint,
    metric: OptimizationMetric,
    logger: &Arc<dyn ResearchLogger>,
) -> f64 {
    let ma_config = match MaCrossConfig::new(point.fast_period, point.slow_period, MaType::Simple) {
        Ok(c) => c,
        Err(e) => return trial_failed(point, e, logger),
    };
    let config = match BacktestConfig::new(
        base.initial_capital,
        base.costs,
        base.execution_delay,
        base.size_fraction,
        point.sl_pct,
        point.tp_pct,
        base.frequency_override,
    ) {
        Ok(c) => c,
        Err(e) => return trial_failed(point, e, logger),
    };
    let generator = MaCrossGenerator::new(ma_config);
    let frame = match generator.generate_signals(prices) {
        Ok(f) => f,
        Err(e) => return trial_failed(point, e, logger),
    };
    let engine = BacktestEngine::new(config, logger.clone());
    match engine.run(prices, &frame) {
        Ok(result) => target_metric(&result.stats, metric),
        Err(e) => trial_failed(point, e, logger),
    }
}

fn run_with_params(
    prices: &OhlcvSeries,
    base: &BacktestConfig,
    point: &ParamPoint,
    logger: &Arc<dyn ResearchLogger>,
) -> Result<backtest_engine::BacktestResult, ResearchError> {
    let ma_config = MaCrossConfig::new(point.fast_period, point.slow_period, MaType::Simple)?;
    let config = BacktestConfig::new(
        base.initial_capital,
        base.costs,
        base.execution_delay,
        base.size_fraction,
        point.sl_pct,
        point.tp_pct,
        base.frequency_override,
    )?;
    let generator = MaCrossGenerator::new(ma_config);
    let frame = generator.generate_signals(prices)?;
    let engine = BacktestEngine::new(config, logger.clone());
    engine.run(prices, &frame)
}

/// Rolling-origin train/test fold bounds over `[0, n)`, chunked into
/// `n_splits` contiguous pieces and split `train_fraction`/`1-train_fraction`
/// within each chunk. Folds with too little data are silently skipped
/// (§4.5.1) — the caller sees them simply absent from the result.
fn fold_ranges(n: usize, n_splits: usize, train_fraction: f64) -> Vec<(usize, usize, usize, usize)> {
    let chunk_size = n / n_splits;
    let mut ranges = Vec::new();
    for i in 0..n_splits {
        let chunk_start = i * chunk_size;
        let chunk_end = if i == n_splits - 1 { n } else { (i + 1) * chunk_size };
        let chunk_len = chunk_end.saturating_sub(chunk_start);
        let train_len = (chunk_len as f64 * train_fraction) as usize;
        let test_len = chunk_len.saturating_sub(train_len);
        ranges.push((chunk_start, chunk_start + train_len, chunk_start + train_len, chunk_end));
        let _ = test_len;
    }
    ranges
}

const MIN_TRAIN_BARS: usize = 50;
const MIN_TEST_BARS: usize = 10;
const MIN_VALID_FOLDS: usize = 2;

/// Run the walk-forward optimiser (§4.5.1): for each rolling fold, grid
/// search parameters on the train slice in parallel via `rayon`, then
/// evaluate the winner out-of-sample on the disjoint, chronologically-later
/// test slice.
pub fn run_walk_forward(
    prices: &OhlcvSeries,
    base_config: &BacktestConfig,
    wf_config: &WalkForwardConfig,
    logger: Arc<dyn ResearchLogger>,
) -> Result<WalkForwardResult, ResearchError> {
    let mut grid = generate_param_grid(&wf_config.search_space);
    if let Some(cap) = wf_config.n_trials {
        grid.truncate(cap);
    }
    let n = prices.len();
    let ranges = fold_ranges(n, wf_config.n_splits, wf_config.train_fraction);

    let mut folds = Vec::new();
    for (fold_number, (train_start, train_end, test_start, test_end)) in ranges.into_iter().enumerate() {
        let train_len = train_end - train_start;
        let test_len = test_end - test_start;
        if train_len < MIN_TRAIN_BARS || test_len < MIN_TEST_BARS {
            logger.warn(
                COMPONENT,
                &format!("fold {fold_number} skipped: train_len={train_len}, test_len={test_len}"),
            );
            continue;
        }

        let train_slice = prices.slice(train_start, train_end);
        let test_slice = prices.slice(test_start, test_end);

        let grid_scores: Vec<(usize, f64)> = grid
            .par_iter()
            .enumerate()
            .map(|(i, point)| (i, score(&train_slice, base_config, point, wf_config.metric, &logger)))
            .collect();

        let Some(&(best_idx, best_score)) = grid_scores
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        else {
            continue;
        };
        if best_score == f64::NEG_INFINITY {
            logger.warn(COMPONENT, &format!("fold {fold_number}: every grid point failed in-sample"));
            continue;
        }
        let best_params = grid[best_idx];

        let is_result = run_with_params(&train_slice, base_config, &best_params, &logger)?;
        let oos_result = run_with_params(&test_slice, base_config, &best_params, &logger)?;

        let wins = oos_result.trades.iter().filter(|t| t.pnl.is_sign_positive() && !t.pnl.is_zero()).count();
        folds.push(WalkForwardFold {
            fold_number,
            train_range: (train_start, train_end),
            test_range: (test_start, test_end),
            best_params,
            in_sample_sharpe: is_result.stats.sharpe,
            out_of_sample_sharpe: oos_result.stats.sharpe,
            in_sample_score: target_metric(&is_result.stats, wf_config.metric),
            out_of_sample_score: target_metric(&oos_result.stats, wf_config.metric),
            in_sample_return: is_result.stats.total_return,
            out_of_sample_return: oos_result.stats.total_return,
            out_of_sample_trades: oos_result.trades.len(),
            out_of_sample_wins: wins,
        });
    }

    if folds.len() < MIN_VALID_FOLDS {
        return Err(ResearchError::InsufficientData {
            component: COMPONENT,
            detail: format!("only {} valid fold(s), need at least {MIN_VALID_FOLDS}", folds.len()),
        });
    }

    let avg_in_sample_sharpe = mean(&folds.iter().map(|f| f.in_sample_sharpe).collect::<Vec<_>>());
    let avg_out_of_sample_sharpe = mean(&folds.iter().map(|f| f.out_of_sample_sharpe).collect::<Vec<_>>());
    let avg_in_sample_return = mean(&folds.iter().map(|f| f.in_sample_return).collect::<Vec<_>>());
    let avg_out_of_sample_return = mean(&folds.iter().map(|f| f.out_of_sample_return).collect::<Vec<_>>());

    let total_oos_trades: usize = folds.iter().map(|f| f.out_of_sample_trades).sum();
    let total_oos_wins: usize = folds.iter().map(|f| f.out_of_sample_wins).sum();
    let out_of_sample_win_rate = if total_oos_trades > 0 {
        total_oos_wins as f64 / total_oos_trades as f64
    } else {
        0.0
    };

    let parameter_stability = compute_parameter_stability(&folds);

    let overfit_flagged = (avg_in_sample_sharpe - avg_out_of_sample_sharpe) > 0.5
        || (avg_in_sample_sharpe > 1.0 && avg_out_of_sample_sharpe < 0.3);
    if overfit_flagged {
        logger.warn(
            COMPONENT,
            &format!(
                "overfitting heuristic triggered: avg_is_sharpe={avg_in_sample_sharpe:.3}, \
                 avg_oos_sharpe={avg_out_of_sample_sharpe:.3}"
            ),
        );
    }

    Ok(WalkForwardResult {
        folds,
        avg_in_sample_sharpe,
        avg_out_of_sample_sharpe,
        avg_in_sample_return,
        avg_out_of_sample_return,
        out_of_sample_win_rate,
        parameter_stability,
        overfit_flagged,
    })
}

/// Coefficient of variation per parameter axis, averaged and folded into
/// `1 / (1 + mean_cv)` (§4.5.1). `eps` guards a zero-mean axis (e.g. every
/// fold picked `fast_period=0`, which can't happen here but costs nothing
/// to guard).
fn compute_parameter_stability(folds: &[WalkForwardFold]) -> f64 {
    const EPS: f64 = 1e-9;
    let fast: Vec<f64> = folds.iter().map(|f| f.best_params.fast_period as f64).collect();
    let slow: Vec<f64> = folds.iter().map(|f| f.best_params.slow_period as f64).collect();

    let cv = |data: &[f64]| -> f64 {
        let m = mean(data);
        std_dev(data) / (m.abs() + EPS)
    };
    let mean_cv = (cv(&fast) + cv(&slow)) / 2.0;
    1.0 / (1.0 + mean_cv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParamSearchSpace;
    use backtest_engine::Costs;
    use chrono::{Duration, TimeZone, Utc};
    use core_types::{Bar, NullLogger};
    use rust_decimal_macros::dec;

    fn trending_series(n: usize) -> OhlcvSeries {
        let bars: Vec<Bar> = (0..n)
            .map(|i| {
                let c = 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.05;
                Bar {
                    timestamp: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap() + Duration::days(i as i64),
                    open: c,
                    high: c + 1.0,
                    low: c - 1.0,
                    close: c,
                    volume: 1_000.0,
                }
            })
            .collect();
        OhlcvSeries::new(bars, "test").unwrap()
    }

    fn base_config() -> BacktestConfig {
        BacktestConfig::new(
            dec!(10000),
            Costs { commission_rate: 0.001, slippage_rate: 0.0005 },
            1,
            1.0,
            None,
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn folds_are_chronologically_disjoint() {
        let n = 1000;
        let ranges = fold_ranges(n, 4, 0.7);
        for (train_start, train_end, test_start, test_end) in &ranges {
            assert!(train_end <= test_start);
            assert!(test_start < test_end || test_start == test_end);
            let _ = (train_start, train_end);
        }
    }

    #[test]
    fn too_few_valid_folds_is_an_error() {
        let prices = trending_series(80);
        let wf_config = WalkForwardConfig::new(4, 0.7, ParamSearchSpace::default()).unwrap();
        let result = run_walk_forward(&prices, &base_config(), &wf_config, Arc::new(NullLogger));
        assert!(result.is_err());
    }

    #[test]
    fn sufficient_data_yields_disjoint_folds_with_stats() {
        let prices = trending_series(1000);
        let space = ParamSearchSpace {
            fast_periods: vec![5, 10],
            slow_periods: vec![20, 30],
            sl_pcts: vec![None],
            tp_pcts: vec![None],
        };
        let wf_config = WalkForwardConfig::new(4, 0.7, space).unwrap();
        let result = run_walk_forward(&prices, &base_config(), &wf_config, Arc::new(NullLogger)).unwrap();
        assert!(result.folds.len() >= 2);
        assert!((0.0..=1.0).contains(&result.parameter_stability));
        for fold in &result.folds {
            assert_eq!(fold.in_sample_score, fold.in_sample_sharpe);
            assert_eq!(fold.out_of_sample_score, fold.out_of_sample_sharpe);
            assert!(fold.train_range.1 <= fold.test_range.0, "train_range must end at or before test_range starts");
            assert!(fold.test_range.0 < fold.test_range.1);
        }
    }

    #[test]
    fn n_trials_caps_grid_points_evaluated_and_metric_selects_target() {
        let prices = trending_series(1000);
        let space = ParamSearchSpace {
            fast_periods: vec![5, 10, 15],
            slow_periods: vec![20, 30, 40],
            sl_pcts: vec![None],
            tp_pcts: vec![None],
        };
        let wf_config = WalkForwardConfig::with_metric(
            4,
            0.7,
            space,
            OptimizationMetric::TotalReturn,
            Some(2),
        )
        .unwrap();
        let result = run_walk_forward(&prices, &base_config(), &wf_config, Arc::new(NullLogger)).unwrap();
        assert!(result.folds.len() >= 2);
        for fold in &result.folds {
            assert_eq!(fold.in_sample_score, fold.in_sample_return);
            assert_eq!(fold.out_of_sample_score, fold.out_of_sample_return);
            // only the first two grid points (5/20, 5/30) could have been tried
            assert!(fold.best_params.fast_period == 5);
            assert!(fold.best_params.slow_period == 20 || fold.best_params.slow_period == 30);
        }
    }

    #[test]
    fn n_trials_zero_is_rejected() {
        assert!(WalkForwardConfig::with_metric(
            4,
            0.7,
            ParamSearchSpace::default(),
            OptimizationMetric::Sharpe,
            Some(0),
        )
        .is_err());
    }
}
