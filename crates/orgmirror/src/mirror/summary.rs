use serde::Serialize;

use crate::entity::error_kind::ErrorKind;
use crate::entity::sync_state::Model as SyncStateModel;
use crate::entity::sync_status::SyncStatus;
use crate::entity::transition::Transition;

use super::types::{PairRef, Worklist};

/// How a worklist item ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeKind {
    /// `create-and-sync` completed.
    Created,
    /// `sync` pushed new refs.
    SyncedChanged,
    /// `sync` found nothing to push.
    SyncedNoop,
    /// `soft-delete` completed.
    Tombstoned,
    /// The attempt failed; the failure is recorded on the pair.
    Failed {
        kind: ErrorKind,
        message: String,
        /// Status written for the pair.
        status: SyncStatus,
    },
    /// Re-planning after a concurrent write found nothing to do.
    Skipped,
    /// Cancellation stopped the item before or during its work.
    Cancelled,
}

/// Result of one worklist item.
#[derive(Debug, Clone)]
pub struct PairOutcome {
    pub pair: PairRef,
    pub transition: Transition,
    pub kind: OutcomeKind,
}

impl PairOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.kind, OutcomeKind::Failed { .. })
    }
}

/// A pair currently in `degraded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedPair {
    pub repo: String,
    pub destination: String,
    pub error_kind: Option<ErrorKind>,
    pub message: Option<String>,
    pub failure_count: i32,
}

impl From<&SyncStateModel> for DegradedPair {
    fn from(model: &SyncStateModel) -> Self {
        Self {
            repo: model.repo_name.clone(),
            destination: model.destination.clone(),
            error_kind: model.last_error_kind,
            message: model.last_error_message.clone(),
            failure_count: model.failure_count,
        }
    }
}

/// End-of-run report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub created: usize,
    /// Up-to-date pairs plus syncs that found nothing to push.
    pub synced_noop: usize,
    pub synced_changed: usize,
    pub tombstoned: usize,
    /// Pairs in `degraded` after the run, including earlier runs' failures.
    pub degraded: usize,
    pub failed_this_run: usize,
    pub deferred: usize,
    pub suspended: usize,
    pub in_flight: usize,
    pub orphaned: usize,
    pub tombstoned_reappeared: usize,
    /// Items not started or interrupted by cancellation.
    pub skipped_cancelled: usize,
    pub dry_run: bool,
    /// Planned transitions, filled for dry runs.
    pub planned: Vec<PlannedItem>,
    pub degraded_pairs: Vec<DegradedPair>,
}

/// A transition a dry run would have executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedItem {
    pub repo: String,
    pub destination: String,
    pub transition: Transition,
}

impl RunSummary {
    /// Start a summary from reconciliation counts.
    pub fn from_worklist(worklist: &Worklist) -> Self {
        Self {
            synced_noop: worklist.up_to_date.len(),
            deferred: worklist.deferred.len(),
            suspended: worklist.suspended.len(),
            in_flight: worklist.in_flight.len(),
            orphaned: worklist.orphaned.len(),
            tombstoned_reappeared: worklist.tombstoned_reappeared.len(),
            ..Self::default()
        }
    }

    /// Fold one pair outcome in.
    pub fn record(&mut self, outcome: &PairOutcome) {
        match &outcome.kind {
            OutcomeKind::Created => self.created += 1,
            OutcomeKind::SyncedChanged => self.synced_changed += 1,
            OutcomeKind::SyncedNoop | OutcomeKind::Skipped => self.synced_noop += 1,
            OutcomeKind::Tombstoned => self.tombstoned += 1,
            OutcomeKind::Failed { .. } => self.failed_this_run += 1,
            OutcomeKind::Cancelled => self.skipped_cancelled += 1,
        }
    }

    /// Replace the degraded list with the store's current view.
    pub fn set_degraded(&mut self, degraded: &[SyncStateModel]) {
        self.degraded_pairs = degraded.iter().map(DegradedPair::from).collect();
        self.degraded = self.degraded_pairs.len();
    }

    /// Whether every executed item succeeded and nothing is degraded.
    pub fn is_clean(&self) -> bool {
        self.failed_this_run == 0 && self.degraded == 0
    }
}
