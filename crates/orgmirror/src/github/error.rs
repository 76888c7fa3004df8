//! Mapping from octocrab errors to platform errors.

use crate::platform::PlatformError;

/// HTTP status of a GitHub API error, if the error came from the API.
pub(crate) fn status_of(e: &octocrab::Error) -> Option<u16> {
    match e {
        octocrab::Error::GitHub { source, .. } => Some(source.status_code.as_u16()),
        _ => None,
    }
}

/// Convert an octocrab error into a `PlatformError`.
///
/// `resource` names what was being accessed, for `NotFound`.
pub(crate) fn map_octocrab_error(e: octocrab::Error, resource: &str) -> PlatformError {
    match &e {
        octocrab::Error::GitHub { source, .. } => {
            let message = source.message.clone();
            match source.status_code.as_u16() {
                401 => PlatformError::permission_denied(message),
                403 | 429 if is_rate_limit_message(&message) => {
                    PlatformError::RateLimited { reset_at: None }
                }
                429 => PlatformError::RateLimited { reset_at: None },
                403 => PlatformError::permission_denied(message),
                404 => PlatformError::not_found(resource),
                status => PlatformError::api(Some(status), message),
            }
        }
        // Empty or truncated bodies show up as decode errors.
        octocrab::Error::Json { .. } | octocrab::Error::Serde { .. } => {
            PlatformError::api(None, e.to_string())
        }
        _ => PlatformError::network(e.to_string()),
    }
}

fn is_rate_limit_message(message: &str) -> bool {
    message.to_lowercase().contains("rate limit")
}
