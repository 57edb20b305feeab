use core_types::ResearchError;
use serde::{Deserialize, Serialize};

const COMPONENT: &str = "walk_forward";

/// Discretised hyperparameter grid for the MA-cross strategy (§4.5.1). Each
/// axis left empty falls back to a single-value default, mirroring the
/// corpus's `generate_param_grid` behaviour for an unspecified axis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamSearchSpace {
    pub fast_periods: Vec<usize>,
    pub slow_periods: Vec<usize>,
    pub sl_pcts: Vec<Option<f64>>,
    pub tp_pcts: Vec<Option<f64>>,
}

/// One point of the grid. `fast_period >= slow_period` is a legal point of
/// the grid (constructors reject it with a large negative score rather than
/// the trial raising) — generation itself does not filter it out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamPoint {
    pub fast_period: usize,
    pub slow_period: usize,
    pub sl_pct: Option<f64>,
    pub tp_pct: Option<f64>,
}

/// Grid search is exhaustive up to this many combinations; beyond it the
/// grid is truncated (first N in iteration order), same cap the corpus used.
const MAX_GRID_COMBOS: usize = 200;

pub fn generate_param_grid(space: &ParamSearchSpace) -> Vec<ParamPoint> {
    let fast = if space.fast_periods.is_empty() { vec![10] } else { space.fast_periods.clone() };
    let slow = if space.slow_periods.is_empty() { vec![30] } else { space.slow_periods.clone() };
    let sl = if space.sl_pcts.is_empty() { vec![None] } else { space.sl_pcts.clone() };
    let tp = if space.tp_pcts.is_empty() { vec![None] } else { space.tp_pcts.clone() };

    let mut grid = Vec::new();
    for &f in &fast {
        for &s in &slow {
            for &sp in &sl {
                for &tp_ in &tp {
                    grid.push(ParamPoint { fast_period: f, slow_period: s, sl_pct: sp, tp_pct: tp_ });
                    if grid.len() >= MAX_GRID_COMBOS {
                        return grid;
                    }
                }
            }
        }
    }
    grid
}

/// The metric a walk-forward grid search maximises in-sample (§4.5.1 names
/// Sharpe as the default; the others are the rest of §4.4's risk-adjusted
/// metrics bundle, offered since nothing about the search loop is
/// Sharpe-specific).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OptimizationMetric {
    #[default]
    Sharpe,
    Sortino,
    Calmar,
    TotalReturn,
}

/// Walk-forward configuration (§4.5.1, §6). No `Default` — every field
/// materially changes what the optimiser measures, so there is no
/// customary default worth encoding.
#[derive(Debug, Clone)]
pub struct WalkForwardConfig {
    pub n_splits: usize,
    pub train_fraction: f64,
    pub search_space: ParamSearchSpace,
    /// The in-sample metric the grid search maximises (§4.5.1).
    pub metric: OptimizationMetric,
    /// Caps the number of grid points evaluated per fold: `None` evaluates
    /// the full (capped-at-200) grid; `Some(k)` evaluates only its first `k`
    /// points. The corpus searches by exhaustive grid rather than
    /// Bayesian/TPE sampling (§9's rewrite keeps that shape), so `n_trials`
    /// here bounds grid evaluations rather than guiding a sampler — deterministic
    /// by construction, no RNG plumbing required.
    pub n_trials: Option<usize>,
}

impl WalkForwardConfig {
    pub fn new(n_splits: usize, train_fraction: f64, search_space: ParamSearchSpace) -> Result<Self, ResearchError> {
        Self::with_metric(n_splits, train_fraction, search_space, OptimizationMetric::Sharpe, None)
    }

    pub fn with_metric(
        n_splits: usize,
        train_fraction: f64,
        search_space: ParamSearchSpace,
        metric: OptimizationMetric,
        n_trials: Option<usize>,
    ) -> Result<Self, ResearchError> {
        if n_splits < 2 {
            return Err(ResearchError::invalid_parameter(
                COMPONENT,
                "n_splits",
                n_splits,
                "must be >= 2",
            ));
        }
        if !(train_fraction > 0.0 && train_fraction < 1.0) {
            return Err(ResearchError::invalid_parameter(
                COMPONENT,
                "train_fraction",
                train_fraction,
                "must be in (0, 1)",
            ));
        }
        if let Some(k) = n_trials {
            if k == 0 {
                return Err(ResearchError::invalid_parameter(
                    COMPONENT,
                    "n_trials",
                    k,
                    "must be >= 1 when set",
                ));
            }
        }
        Ok(WalkForwardConfig { n_splits, train_fraction, search_space, metric, n_trials })
    }
}

/// One fold's train/test evaluation, with the parameters the in-sample
/// search selected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardFold {
    pub fold_number: usize,
    /// `[start, end)` bar indices of this fold's training slice (§3:
    /// `train_range`). Always strictly before `test_range` (§8's
    /// disjointness property).
    pub train_range: (usize, usize),
    /// `[start, end)` bar indices of this fold's test slice (§3: `test_range`).
    pub test_range: (usize, usize),
    pub best_params: ParamPoint,
    /// Sharpe ratio, always computed regardless of the configured
    /// optimisation metric — the overfitting heuristic (§4.5.1) is defined
    /// in terms of Sharpe specifically.
    pub in_sample_sharpe: f64,
    pub out_of_sample_sharpe: f64,
    /// Value of `WalkForwardConfig::metric` the grid search actually
    /// maximised — equal to `in_sample_sharpe`/`out_of_sample_sharpe` when
    /// that metric is `Sharpe` (the default).
    pub in_sample_score: f64,
    pub out_of_sample_score: f64,
    pub in_sample_return: f64,
    pub out_of_sample_return: f64,
    pub out_of_sample_trades: usize,
    pub out_of_sample_wins: usize,
}

/// Aggregate walk-forward result (§4.5.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub folds: Vec<WalkForwardFold>,
    pub avg_in_sample_sharpe: f64,
    pub avg_out_of_sample_sharpe: f64,
    pub avg_in_sample_return: f64,
    pub avg_out_of_sample_return: f64,
    pub out_of_sample_win_rate: f64,
    /// `1 / (1 + mean(coefficient_of_variation))` across folds, per parameter,
    /// averaged; `1.0` means every fold picked identical parameters.
    pub parameter_stability: f64,
    /// Set when the overfitting heuristic (§4.5.1) fires. Always a warning,
    /// never a hard failure — the caller decides what to do with it.
    pub overfit_flagged: bool,
}

/// Monte-Carlo configuration (§4.5.2, §6).
#[derive(Debug, Clone, Copy)]
pub struct MonteCarloConfig {
    pub n_simulations: usize,
    pub seed: u64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        MonteCarloConfig { n_simulations: 1000, seed: 42 }
    }
}

/// Percentile band of simulated final returns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReturnPercentiles {
    pub p5: f64,
    pub p25: f64,
    pub p75: f64,
    pub p95: f64,
}

/// Monte-Carlo simulation output (§3, §4.5.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub n_paths: usize,
    /// One equity path per simulation, `n+1` points each (starting at
    /// `initial_capital`), in the order the paths were generated. `O(n_bars *
    /// n_paths)` per §5 — acceptable at the contract's `n=10^4, paths=10^3`.
    pub equity_paths: Vec<Vec<f64>>,
    /// Final return of every simulated path, unsorted, in generation order.
    pub final_return_distribution: Vec<f64>,
    /// Per-path max drawdown (a negative fraction), unsorted, in generation order.
    pub drawdown_distribution: Vec<f64>,
    pub mean_final_return: f64,
    pub median_final_return: f64,
    pub std_final_return: f64,
    pub percentiles: ReturnPercentiles,
    /// 5th percentile of final returns; negative means a loss at the 95%
    /// confidence level.
    pub var_95: f64,
    /// 1st percentile of final returns.
    pub var_99: f64,
    /// Mean of the final returns at or below `var_95`.
    pub cvar_95: f64,
    pub mean_max_drawdown: f64,
    /// 1st percentile of the per-path max-drawdown distribution (worst-case).
    pub worst_max_drawdown: f64,
    pub prob_positive: f64,
    pub prob_doubling: f64,
    pub prob_loss_50: f64,
}
