use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::entity::error_kind::ErrorKind;

/// Errors that can occur when talking to a host API or git transport.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// API error from the host that fits no narrower variant.
    #[error("API error: {message}")]
    Api {
        /// HTTP status, if the host answered at all.
        status: Option<u16>,
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded{}", reset_suffix(.reset_at))]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    /// Credential missing, rejected, or lacking scope.
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    /// Resource not found (org, repo, etc.).
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Network or connection error.
    #[error("Network error: {message}")]
    Network { message: String },

    /// A single call exceeded its deadline.
    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout { operation: String, after: Duration },

    /// Unexpected/internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn reset_suffix(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(at) => format!(". Resets at {at}"),
        None => String::new(),
    }
}

impl PlatformError {
    /// Create an API error.
    #[inline]
    pub fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a permission error.
    #[inline]
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Create a not found error.
    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a network error.
    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Create an internal error.
    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is a rate limit error.
    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Classify the error for the state store.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Api { status: None, .. } => ErrorKind::NetworkError,
            Self::Api {
                status: Some(status),
                ..
            } if *status >= 500 => ErrorKind::NetworkError,
            Self::Api { .. } => ErrorKind::Internal,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Network { .. } => ErrorKind::NetworkError,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same call later may succeed.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of an error message, which is useful for errors
/// that carry multi-line process output.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for platform operations.
pub type Result<T> = std::result::Result<T, PlatformError>;
