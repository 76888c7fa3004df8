use std::future::Future;
use std::time::Duration;

use super::errors::{PlatformError, Result};

/// Run one network call under a deadline.
///
/// Expiry drops the call and yields `PlatformError::Timeout`, which is
/// retryable.
pub async fn with_timeout<T, F>(operation: &str, after: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::debug!(operation, after_secs = after.as_secs(), "Call timed out");
            Err(PlatformError::timeout(operation, after))
        }
    }
}
