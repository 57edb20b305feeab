use thiserror::Error;

/// Coarse classification of a [`ResearchError`], used by caller layers to decide
/// whether to retry, surface a 4xx, or page someone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input: empty series, non-monotone index, missing columns, out-of-range
    /// fractions, inconsistent thresholds, insufficient data.
    ContractViolation,
    /// A single walk-forward trial failed internally; the search continues.
    SearchFailure,
    /// An unexpected failure during metric extraction or trade reconstruction.
    Implementation,
}

/// The single error type returned across the signal-to-equity pipeline.
///
/// Every variant names the offending component and field so the message is
/// actionable without a debugger. Numerical edge cases (zero variance, empty
/// trades, zero gross losses) are deliberately *not* errors here — those are
/// handled locally with sentinel values per §4.4 and never reach this type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResearchError {
    #[error("[{component}] empty input: {detail}")]
    EmptyInput { component: &'static str, detail: String },

    #[error("[{component}] non-monotone index: {detail}")]
    NonMonotoneIndex { component: &'static str, detail: String },

    #[error("[{component}] invalid parameter {field}={value}: {detail}")]
    InvalidParameter {
        component: &'static str,
        field: &'static str,
        value: String,
        detail: String,
    },

    #[error("[{component}] missing column: {detail}")]
    MissingColumn { component: &'static str, detail: String },

    #[error("[{component}] insufficient data: {detail}")]
    InsufficientData { component: &'static str, detail: String },

    #[error("[{component}] unfit model: {detail}")]
    UnfitModel { component: &'static str, detail: String },

    #[error("[{component}] trial failed: {detail}")]
    SearchTrialFailed { component: &'static str, detail: String },

    #[error("[{component}] internal error: {detail}")]
    Internal { component: &'static str, detail: String },
}

impl ResearchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResearchError::SearchTrialFailed { .. } => ErrorKind::SearchFailure,
            ResearchError::Internal { .. } => ErrorKind::Implementation,
            _ => ErrorKind::ContractViolation,
        }
    }

    pub fn component(&self) -> &'static str {
        match self {
            ResearchError::EmptyInput { component, .. }
            | ResearchError::NonMonotoneIndex { component, .. }
            | ResearchError::InvalidParameter { component, .. }
            | ResearchError::MissingColumn { component, .. }
            | ResearchError::InsufficientData { component, .. }
            | ResearchError::UnfitModel { component, .. }
            | ResearchError::SearchTrialFailed { component, .. }
            | ResearchError::Internal { component, .. } => component,
        }
    }

    /// The offending field value, when the variant carries one. Exposed for
    /// callers translating this into structured UI messages or HTTP bodies.
    pub fn offending_value(&self) -> Option<&str> {
        match self {
            ResearchError::InvalidParameter { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn invalid_parameter(
        component: &'static str,
        field: &'static str,
        value: impl ToString,
        detail: impl Into<String>,
    ) -> Self {
        ResearchError::InvalidParameter {
            component,
            field,
            value: value.to_string(),
            detail: detail.into(),
        }
    }
}
