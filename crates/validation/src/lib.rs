pub mod models;
pub mod monte_carlo;
pub mod walk_forward;

pub use models::{
    generate_param_grid, MonteCarloConfig, MonteCarloResult, OptimizationMetric, ParamPoint,
    ParamSearchSpace, ReturnPercentiles, WalkForwardConfig, WalkForwardFold, WalkForwardResult,
};
pub use monte_carlo::run_monte_carlo;
pub use walk_forward::run_walk_forward;
