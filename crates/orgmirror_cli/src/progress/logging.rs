use std::sync::atomic::{AtomicUsize, Ordering};

use orgmirror::mirror::MirrorProgress;

/// Logging reporter using tracing for structured output.
#[derive(Debug, Default)]
pub struct LoggingReporter {
    total: AtomicUsize,
    finished: AtomicUsize,
}

impl LoggingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items finished so far, out of the worklist size.
    pub fn position(&self) -> (usize, usize) {
        (
            self.finished.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }

    fn advance(&self) -> (usize, usize) {
        let done = self.finished.fetch_add(1, Ordering::Relaxed) + 1;
        (done, self.total.load(Ordering::Relaxed))
    }

    pub fn handle(&self, event: MirrorProgress) {
        match event {
            MirrorProgress::EnumeratingSource {
                org,
                expected_total,
            } => {
                tracing::info!(org = %org, expected_total = ?expected_total, "Listing source organization");
            }

            MirrorProgress::FetchedPage {
                org,
                page,
                count,
                total_so_far,
            } => {
                tracing::debug!(org = %org, page, count, total_so_far, "Fetched page");
            }

            MirrorProgress::PageFetchRetry {
                page,
                retry_after_ms,
                attempt,
            } => {
                tracing::warn!(page, retry_after_ms, attempt, "Retrying page fetch");
            }

            MirrorProgress::EnumerationComplete {
                org,
                total,
                unmarked,
            } => {
                tracing::info!(org = %org, total, unmarked, "Source inventory complete");
            }

            MirrorProgress::RateLimitBackoff {
                target,
                retry_after_ms,
                attempt,
            } => {
                tracing::warn!(target = %target, retry_after_ms, attempt, "Rate limited, backing off");
            }

            MirrorProgress::WorklistReady {
                items,
                up_to_date,
                deferred,
                suspended,
                in_flight,
                orphaned,
                tombstoned_reappeared,
            } => {
                self.total.store(items, Ordering::Relaxed);
                self.finished.store(0, Ordering::Relaxed);
                tracing::info!(
                    items,
                    up_to_date,
                    deferred,
                    suspended,
                    in_flight,
                    orphaned,
                    tombstoned_reappeared,
                    "Reconciled"
                );
            }

            MirrorProgress::PairStarted {
                repo,
                destination,
                transition,
            } => {
                tracing::debug!(repo = %repo, destination = %destination, transition = %transition, "Started");
            }

            MirrorProgress::PairSucceeded {
                repo,
                destination,
                transition,
                status,
                changed,
            } => {
                let (done, total) = self.advance();
                tracing::info!(
                    repo = %repo,
                    destination = %destination,
                    transition = %transition,
                    status = %status,
                    changed,
                    progress = %format!("{done}/{total}"),
                    "Done"
                );
            }

            MirrorProgress::PairFailed {
                repo,
                destination,
                transition,
                status,
                kind,
                error,
            } => {
                let (done, total) = self.advance();
                tracing::warn!(
                    repo = %repo,
                    destination = %destination,
                    transition = %transition,
                    status = %status,
                    error_kind = %kind,
                    error = %error,
                    progress = %format!("{done}/{total}"),
                    "Failed"
                );
            }

            MirrorProgress::DispatchStopped { remaining } => {
                tracing::warn!(remaining, "Stopped before dispatching every item");
            }

            MirrorProgress::Warning { message } => {
                tracing::warn!(message = %message, "Warning");
            }

            _ => {}
        }
    }
}
