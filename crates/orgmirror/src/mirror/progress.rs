//! Progress events emitted while a run enumerates, reconciles and executes.
//!
//! Events are informational. The state store remains the record of what
//! happened; a reporter that drops events loses nothing durable.

use crate::entity::error_kind::ErrorKind;
use crate::entity::sync_status::SyncStatus;
use crate::entity::transition::Transition;

/// Progress events emitted during a mirror run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum MirrorProgress {
    /// Starting to list the source organization.
    EnumeratingSource {
        /// Source organization.
        org: String,
        /// Total repositories the host reports, if known.
        expected_total: Option<usize>,
    },

    /// Fetched a page of source repositories.
    FetchedPage {
        /// Source organization.
        org: String,
        /// Page number (1-indexed).
        page: u32,
        /// Repositories on this page.
        count: usize,
        /// Distinct repositories seen so far.
        total_so_far: usize,
    },

    /// Page fetch rate limited or failed transiently, retrying.
    PageFetchRetry {
        /// Page number being retried.
        page: u32,
        /// Time to wait before retry (ms).
        retry_after_ms: u64,
        /// Current attempt number.
        attempt: u32,
    },

    /// Source listing complete and verified.
    EnumerationComplete {
        /// Source organization.
        org: String,
        /// Repositories in the inventory.
        total: usize,
        /// Repositories whose ref marker could not be computed.
        unmarked: usize,
    },

    /// Rate limited on a host call, backing off before retry.
    RateLimitBackoff {
        /// What was being called (`org/repo` or an operation label).
        target: String,
        /// Time to wait before retry (ms).
        retry_after_ms: u64,
        /// Current attempt number.
        attempt: u32,
    },

    /// Reconciliation produced a worklist.
    WorklistReady {
        /// Items to execute.
        items: usize,
        /// Pairs already matching the source.
        up_to_date: usize,
        /// Pairs waiting out a backoff.
        deferred: usize,
        /// Degraded pairs awaiting operator attention.
        suspended: usize,
        /// Pairs with a recent creation attempt still in flight.
        in_flight: usize,
        /// Records whose source is gone while soft delete is disabled.
        orphaned: usize,
        /// Tombstoned pairs whose source repository exists again.
        tombstoned_reappeared: usize,
    },

    /// Executing a worklist item.
    PairStarted {
        repo: String,
        destination: String,
        transition: Transition,
    },

    /// A worklist item completed successfully.
    PairSucceeded {
        repo: String,
        destination: String,
        transition: Transition,
        /// Status written by the executor.
        status: SyncStatus,
        /// Whether anything was created, pushed or archived.
        changed: bool,
    },

    /// A worklist item failed; the failure is recorded on the pair.
    PairFailed {
        repo: String,
        destination: String,
        transition: Transition,
        /// Status written by the executor.
        status: SyncStatus,
        /// Classified error.
        kind: ErrorKind,
        /// Short error message.
        error: String,
    },

    /// Cancellation stopped dispatch with items left.
    DispatchStopped {
        /// Items never started.
        remaining: usize,
    },

    /// Warning message (non-fatal).
    Warning {
        /// Warning message.
        message: String,
    },
}

/// Callback for progress updates during a run.
pub type ProgressCallback = Box<dyn Fn(MirrorProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: MirrorProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
