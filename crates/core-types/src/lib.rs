pub mod error;
pub mod logger;
pub mod stats;
pub mod types;

pub use error::*;
pub use logger::*;
pub use stats::*;
pub use types::*;
