pub mod builder;
pub mod config;
pub mod table;

pub use builder::build_features;
pub use config::FeatureConfig;
pub use table::{FeatureTable, TargetVector};
