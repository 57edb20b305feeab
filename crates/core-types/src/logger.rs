use std::sync::Arc;

/// The one permitted side effect inside the core: diagnostic logging.
///
/// Every component takes its logger as an explicit constructor argument —
/// never a module-level static — so the pipeline stays free of hidden
/// singletons and is safe to run concurrently with different sinks per call.
pub trait ResearchLogger: Send + Sync {
    fn warn(&self, component: &str, message: &str);
    fn error(&self, component: &str, message: &str);
    fn debug(&self, component: &str, message: &str);
}

/// Default logger: forwards to the process-wide `tracing` subscriber.
///
/// This is still "the ambient logging stack", it's just reached through a
/// trait object instead of a bare `tracing::warn!` call at the use site, so
/// callers can swap in a test logger or a buffering logger without touching
/// any component's internals.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl ResearchLogger for TracingLogger {
    fn warn(&self, component: &str, message: &str) {
        tracing::warn!(component, "{message}");
    }

    fn error(&self, component: &str, message: &str) {
        tracing::error!(component, "{message}");
    }

    fn debug(&self, component: &str, message: &str) {
        tracing::debug!(component, "{message}");
    }
}

/// A logger that swallows everything. Useful for pure unit tests where the
/// assertions only care about the returned value.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl ResearchLogger for NullLogger {
    fn warn(&self, _component: &str, _message: &str) {}
    fn error(&self, _component: &str, _message: &str) {}
    fn debug(&self, _component: &str, _message: &str) {}
}

pub fn default_logger() -> Arc<dyn ResearchLogger> {
    Arc::new(TracingLogger)
}
