pub mod classifier;
pub mod frame;
pub mod generator;
pub mod model_based;
pub mod rule_based;

pub use classifier::{FitConfig, LogisticClassifier};
pub use frame::SignalFrame;
pub use generator::SignalGenerator;
pub use model_based::{ModelSignalConfig, ModelSignalGenerator};
pub use rule_based::{MaCrossConfig, MaCrossGenerator, MaType};
