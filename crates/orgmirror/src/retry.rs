//! Retry and backoff policy.
//!
//! In-run retries (rate-limited page fetches) use [`with_retry`]. Cross-run
//! retries are scheduled by storing `next_attempt_at`, computed with
//! [`backoff_for_attempt`] from the same exponential policy.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder, Retryable};

use crate::mirror::{MirrorProgress, ProgressCallback};

/// Initial in-run backoff delay.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;
/// Ceiling for a single in-run backoff delay.
pub const MAX_BACKOFF_MS: u64 = 60_000;
/// In-run retries before giving up on a call.
pub const MAX_RETRIES: usize = 5;

/// Configuration for retry operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Minimum delay between retries.
    pub min_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Maximum number of retry attempts.
    pub max_retries: usize,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            max_retries: MAX_RETRIES,
            with_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with custom values.
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration, max_retries: usize) -> Self {
        Self {
            min_delay,
            max_delay,
            max_retries,
            with_jitter: true,
        }
    }

    /// Set whether to use jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    /// Build an exponential backoff strategy from this configuration.
    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }
}

/// Build the default exponential backoff strategy for host calls.
///
/// - Initial delay: 1 second
/// - Maximum delay: 60 seconds
/// - Maximum retries: 5
/// - Jitter: enabled
#[must_use]
pub fn default_backoff() -> ExponentialBuilder {
    RetryConfig::default().into_backoff()
}

/// Delay before the next automatic attempt of a pair that failed
/// `failures` consecutive times.
///
/// Doubles from `base` per failure, capped at `max`, with jitter. Used for
/// `next_attempt_at` so retries spread out across runs.
#[must_use]
pub fn backoff_for_attempt(base: Duration, max: Duration, failures: u32) -> Duration {
    let times = failures.max(1) as usize;
    RetryConfig::new(base, max, times)
        .into_backoff()
        .build()
        .last()
        .unwrap_or(base)
}

/// Execute an operation, retrying while `should_retry` says so.
///
/// - Tracks retry attempts with an atomic counter
/// - Uses exponential backoff with jitter
/// - Reports `RateLimitBackoff` progress on each retry
pub async fn with_retry<T, E, F, Fut, ShouldRetry, ShortMsg>(
    mut operation: F,
    should_retry: ShouldRetry,
    short_message: ShortMsg,
    target: &str,
    on_progress: Option<&ProgressCallback>,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
    ShouldRetry: Fn(&E) -> bool + Send + Sync + 'static,
    ShortMsg: Fn(&E) -> String + Send + Sync + 'static,
{
    let attempt = AtomicU32::new(0);

    let retry_op = || {
        attempt.fetch_add(1, Ordering::SeqCst);
        operation()
    };

    retry_op
        .retry(default_backoff())
        .notify(|err, dur| {
            let current_attempt = attempt.load(Ordering::SeqCst);
            if let Some(cb) = on_progress {
                cb(MirrorProgress::RateLimitBackoff {
                    target: target.to_string(),
                    retry_after_ms: dur.as_millis() as u64,
                    attempt: current_attempt,
                });
            }
            tracing::debug!(
                target_name = target,
                attempt = current_attempt,
                delay_ms = dur.as_millis() as u64,
                error = %short_message(err),
                "Retrying host call"
            );
        })
        .when(should_retry)
        .await
}
