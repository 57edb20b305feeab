pub mod engine;
pub mod metrics;
pub mod models;

#[cfg(test)]
mod tests;

pub use engine::BacktestEngine;
pub use metrics::compute_stats;
pub use models::{
    BacktestConfig, BacktestResult, BacktestStats, Costs, EquityPoint, ExitReason, TradeRecord,
};
