//! Reconciliation: diff the source inventory against stored state.
//!
//! Pure functions over their inputs. Nothing here performs I/O, so the
//! executor can re-plan a single pair after a concurrent write with exactly
//! the rules used for the whole run.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::entity::sync_state::Model as SyncStateModel;
use crate::entity::sync_status::SyncStatus;
use crate::entity::transition::Transition;

use super::types::{MirrorOptions, PairRef, RepositoryRecord, Worklist, WorklistItem};

/// Settings the rules depend on.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    pub soft_delete_enabled: bool,
    /// Age after which an unfinished claim may be retried.
    pub creating_retry_after: Duration,
}

impl From<&MirrorOptions> for ReconcileOptions {
    fn from(options: &MirrorOptions) -> Self {
        Self {
            soft_delete_enabled: options.soft_delete_enabled,
            creating_retry_after: options.creating_retry_after,
        }
    }
}

/// What to do with one pair this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Execute(Transition),
    UpToDate,
    Deferred,
    Suspended,
    InFlight,
    Orphaned,
    TombstonedReappeared,
    /// Tombstoned and still gone from the source.
    Settled,
}

/// Whether a previous attempt claimed the pair and never finalized.
///
/// Claims clear `next_attempt_at`; every finalize of a failed or cancelled
/// attempt sets it, and a success clears the pending transition.
fn has_open_claim(state: &SyncStateModel) -> bool {
    state.pending_transition.is_some() && state.next_attempt_at.is_none()
}

fn claim_is_fresh(state: &SyncStateModel, options: &ReconcileOptions, now: DateTime<Utc>) -> bool {
    let Some(attempted) = state.last_attempt_at else {
        return false;
    };
    let age = now.signed_duration_since(attempted.with_timezone(&Utc));
    age.to_std()
        .map(|age| age < options.creating_retry_after)
        .unwrap_or(true)
}

/// Respect backoff and in-flight claims before executing `transition`.
fn gate(
    transition: Transition,
    state: &SyncStateModel,
    options: &ReconcileOptions,
    now: DateTime<Utc>,
) -> Plan {
    if has_open_claim(state) && claim_is_fresh(state, options, now) {
        Plan::InFlight
    } else if !state.is_due(now) {
        Plan::Deferred
    } else {
        Plan::Execute(transition)
    }
}

/// The content transition a pair needs while its source exists.
fn content_transition(state: &SyncStateModel) -> Transition {
    if state.has_succeeded() {
        Transition::Sync
    } else {
        Transition::CreateAndSync
    }
}

/// Decide the plan for one pair.
///
/// `evidence` is the source record (or `None` when the repository is absent
/// from the inventory); `state` the stored record, if any.
pub fn plan_pair(
    evidence: Option<&RepositoryRecord>,
    state: Option<&SyncStateModel>,
    options: &ReconcileOptions,
    now: DateTime<Utc>,
) -> Plan {
    let source = evidence.filter(|record| record.exists);

    let Some(state) = state else {
        return match source {
            Some(_) => Plan::Execute(Transition::CreateAndSync),
            None => Plan::Settled,
        };
    };

    if state.status.is_terminal_for_automation() {
        return match source {
            Some(_) => Plan::TombstonedReappeared,
            None => Plan::Settled,
        };
    }

    let Some(source) = source else {
        return if options.soft_delete_enabled {
            gate(Transition::SoftDelete, state, options, now)
        } else {
            Plan::Orphaned
        };
    };

    match state.status {
        SyncStatus::Absent | SyncStatus::Creating => {
            gate(Transition::CreateAndSync, state, options, now)
        }
        SyncStatus::Synced => {
            let unchanged = matches!(
                (&source.source_marker, &state.last_source_commit_marker),
                (Some(current), Some(last)) if current == last
            );
            // A leftover transition (an interrupted soft delete, say) may have
            // changed the destination after the marker was recorded.
            if unchanged && state.pending_transition.is_none() {
                Plan::UpToDate
            } else {
                gate(Transition::Sync, state, options, now)
            }
        }
        SyncStatus::Drifted => gate(Transition::Sync, state, options, now),
        SyncStatus::Degraded => {
            let required = content_transition(state);
            let suspended = state
                .pending_transition
                .is_none_or(Transition::is_content_sync);
            if suspended {
                Plan::Suspended
            } else {
                gate(required, state, options, now)
            }
        }
        SyncStatus::Tombstoned => Plan::Settled,
    }
}

/// Build the worklist for every configured destination.
///
/// Stored records for destinations not in `destinations` are ignored.
pub fn reconcile(
    inventory: &[RepositoryRecord],
    states: &[SyncStateModel],
    destinations: &[String],
    options: &ReconcileOptions,
    now: DateTime<Utc>,
) -> Worklist {
    let sources: HashMap<&str, &RepositoryRecord> = inventory
        .iter()
        .filter(|record| record.exists)
        .map(|record| (record.name.as_str(), record))
        .collect();

    let mut worklist = Worklist::default();

    for destination in destinations {
        // Every repository named by the source or by a stored record.
        let mut pairs: BTreeMap<&str, Option<&SyncStateModel>> =
            sources.keys().map(|name| (*name, None)).collect();
        for state in states.iter().filter(|s| &s.destination == destination) {
            pairs.insert(state.repo_name.as_str(), Some(state));
        }

        for (repo, state) in pairs {
            let evidence = sources.get(repo).copied();
            let pair = PairRef::new(repo, destination.as_str());

            match plan_pair(evidence, state, options, now) {
                Plan::Execute(transition) => worklist.items.push(WorklistItem {
                    repo_name: repo.to_string(),
                    destination: destination.clone(),
                    transition,
                    evidence: evidence.cloned(),
                    prior: state.cloned(),
                }),
                Plan::UpToDate => worklist.up_to_date.push(pair),
                Plan::Deferred => worklist.deferred.push(pair),
                Plan::Suspended => worklist.suspended.push(pair),
                Plan::InFlight => worklist.in_flight.push(pair),
                Plan::Orphaned => worklist.orphaned.push(pair),
                Plan::TombstonedReappeared => worklist.tombstoned_reappeared.push(pair),
                Plan::Settled => {}
            }
        }
    }

    worklist
}
