use core_types::{OhlcvSeries, ResearchError};

use crate::frame::SignalFrame;

/// A signal generator is a pure function of a price series: `name`,
/// `params` (carried by the concrete type, not this trait), and
/// `generate_signals`. Implemented synchronously — the core has no
/// suspension points (§5) — as tagged variants behind this trait rather
/// than an inheritance chain (§9).
pub trait SignalGenerator {
    fn name(&self) -> &str;
    fn generate_signals(&self, prices: &OhlcvSeries) -> Result<SignalFrame, ResearchError>;
}
