use sea_orm::DbErr;
use thiserror::Error;

use crate::entity::sync_status::SyncStatus;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    /// Database error from sea-orm.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// Optimistic concurrency check failed: the record changed underneath us.
    #[error("Sync state for {repo} -> {destination} changed concurrently")]
    Conflict { repo: String, destination: String },

    /// The requested status change is not an edge of the state machine.
    #[error("Invalid transition for {repo} -> {destination}: {from} -> {to}")]
    InvalidTransition {
        repo: String,
        destination: String,
        from: SyncStatus,
        to: SyncStatus,
    },

    /// No record exists for the pair.
    #[error("No sync state for {repo} -> {destination}")]
    NotFound { repo: String, destination: String },

    /// Invalid input data.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl StateError {
    pub(crate) fn conflict(repo: &str, destination: &str) -> Self {
        Self::Conflict {
            repo: repo.to_string(),
            destination: destination.to_string(),
        }
    }

    pub(crate) fn not_found(repo: &str, destination: &str) -> Self {
        Self::NotFound {
            repo: repo.to_string(),
            destination: destination.to_string(),
        }
    }

    /// Whether re-reading and re-planning the pair may resolve the error.
    #[inline]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Result type alias for state store operations.
pub type Result<T> = std::result::Result<T, StateError>;
