//! Persisted classification of the last failure of a pair.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Error taxonomy shared by the store, the executor and the run summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[sea_orm(string_value = "source_unavailable")]
    SourceUnavailable,
    #[sea_orm(string_value = "permission_denied")]
    PermissionDenied,
    #[sea_orm(string_value = "rate_limited")]
    RateLimited,
    #[sea_orm(string_value = "network_error")]
    NetworkError,
    #[sea_orm(string_value = "timeout")]
    Timeout,
    #[sea_orm(string_value = "not_found")]
    NotFound,
    #[sea_orm(string_value = "conflicting_state")]
    ConflictingState,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "internal")]
    Internal,
}

impl ErrorKind {
    /// Whether a later attempt may succeed without operator action.
    #[inline]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited
                | ErrorKind::NetworkError
                | ErrorKind::Timeout
                | ErrorKind::ConflictingState
                | ErrorKind::Cancelled
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_is_not_retryable() {
        assert!(!ErrorKind::PermissionDenied.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
    }

    #[test]
    fn display_uses_snake_case() {
        assert_eq!(ErrorKind::NetworkError.to_string(), "network_error");
        assert_eq!(ErrorKind::SourceUnavailable.to_string(), "source_unavailable");
    }
}
