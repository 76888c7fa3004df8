use thiserror::Error;

use crate::state::StateError;

/// The source inventory cannot be trusted. Fatal for the whole run.
#[derive(Debug, Error)]
pub enum EnumerationError {
    #[error("Source organization {org} unavailable: {reason}")]
    SourceUnavailable { org: String, reason: String },
}

impl EnumerationError {
    pub(crate) fn unavailable(org: &str, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            org: org.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors that abort a run before or after execution.
///
/// Per-pair failures are never reported here; they are recorded on the pair
/// and counted in the run summary.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Enumeration(#[from] EnumerationError),

    #[error("State store unavailable: {0}")]
    State(#[from] StateError),
}

impl RunError {
    /// Whether the run failed because the source listing was untrustworthy.
    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, Self::Enumeration(_))
    }
}
