/// The signal frame type lives in `core-types` (§2: the engine depends on
/// its shape, not on how `signals` produces one) — re-exported here so
/// existing callers can keep writing `signals::SignalFrame`.
pub use core_types::SignalFrame;
