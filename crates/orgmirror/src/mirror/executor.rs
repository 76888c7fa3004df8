//! Mirror executor: applies one worklist item to one pair.
//!
//! Each item runs in two versioned writes around the network work:
//!
//! 1. **Claim** records the attempt and the pending transition, moving
//!    `absent → creating` or `synced → drifted`. A crash after the claim
//!    leaves a recorded attempt, never a false `synced`.
//! 2. **Finalize** records success (`synced` / `tombstoned`) or the failure
//!    with its backoff.
//!
//! If the claim finds the record changed since planning, the pair is
//! re-planned from the fresh record and claimed once more.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use tracing::Instrument;

use crate::entity::error_kind::ErrorKind;
use crate::entity::sync_state::Model as SyncStateModel;
use crate::entity::sync_status::SyncStatus;
use crate::entity::transition::Transition;
use crate::git::RefSet;
use crate::platform::{CreateOutcome, PlatformError, short_error_message};
use crate::retry::backoff_for_attempt;
use crate::state::{self, StateError};

use super::adapter::{DestinationAdapter, SourceAccess};
use super::reconcile::{Plan, ReconcileOptions, plan_pair};
use super::summary::{OutcomeKind, PairOutcome};
use super::tombstone::Tombstone;
use super::types::{MirrorOptions, RepositoryRecord, WorklistItem};

/// Everything one executor needs. Cheap to clone into a task.
#[derive(Clone)]
pub struct PairContext {
    pub db: DatabaseConnection,
    pub source: Arc<SourceAccess>,
    pub adapter: Arc<DestinationAdapter>,
    pub options: Arc<MirrorOptions>,
    pub cancel: Arc<AtomicBool>,
}

impl PairContext {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Stop at a network-call boundary once cancellation was requested.
    fn checkpoint(&self) -> Result<(), StepError> {
        if self.cancelled() {
            Err(StepError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug)]
enum StepError {
    Cancelled,
    Platform(PlatformError),
}

impl From<PlatformError> for StepError {
    fn from(e: PlatformError) -> Self {
        Self::Platform(e)
    }
}

/// A pair claimed for one transition.
struct Claimed {
    model: SyncStateModel,
    transition: Transition,
    /// The last attempt did not end in a clean `synced`, so the destination
    /// may be archived or hold refs this engine never pushed.
    after_unfinished: bool,
}

/// Whether `expected` records anything but a finished sync.
fn after_unfinished(expected: &SyncStateModel) -> bool {
    expected.status != SyncStatus::Synced || expected.pending_transition.is_some()
}

/// What the network work achieved.
#[derive(Debug, Default)]
struct WorkDone {
    changed: bool,
    marker: Option<String>,
    protection_attempted: bool,
}

/// Execute one worklist item. Never fails: the result is data.
pub async fn execute_item(ctx: &PairContext, item: WorklistItem) -> PairOutcome {
    let span = tracing::info_span!(
        "pair",
        repo = %item.repo_name,
        destination = %item.destination,
    );
    execute_in_span(ctx, item).instrument(span).await
}

async fn execute_in_span(ctx: &PairContext, item: WorklistItem) -> PairOutcome {
    let pair = item.pair();
    let outcome = |transition, kind| PairOutcome {
        pair: pair.clone(),
        transition,
        kind,
    };

    if ctx.cancelled() {
        return outcome(item.transition, OutcomeKind::Cancelled);
    }

    let claim = match claim(ctx, &item).await {
        Ok(Some(claim)) => claim,
        Ok(None) => return outcome(item.transition, OutcomeKind::Skipped),
        Err(e) => {
            let kind = if e.is_conflict() {
                ErrorKind::ConflictingState
            } else {
                ErrorKind::Internal
            };
            tracing::warn!(error = %e, error_kind = %kind, "Could not claim pair");
            let status = item
                .prior
                .as_ref()
                .map(|p| p.status)
                .unwrap_or(SyncStatus::Absent);
            return outcome(
                item.transition,
                OutcomeKind::Failed {
                    kind,
                    message: e.to_string(),
                    status,
                },
            );
        }
    };

    let transition = claim.transition;
    tracing::debug!(%transition, status = %claim.model.status, "Pair claimed");

    let work = perform(ctx, &claim, item.evidence.as_ref()).await;
    let kind = finalize(ctx, &claim.model, transition, work).await;
    outcome(transition, kind)
}

// ─── Claim ───────────────────────────────────────────────────────────────────

async fn claim(
    ctx: &PairContext,
    item: &WorklistItem,
) -> Result<Option<Claimed>, StateError> {
    let expected = match &item.prior {
        Some(prior) => prior.clone(),
        None => match observe(ctx, item).await {
            Ok(Some(model)) => model,
            Ok(None) => return Ok(None),
            Err(e) if e.is_conflict() => return replan_and_claim(ctx, item).await,
            Err(e) => return Err(e),
        },
    };

    match try_claim(ctx, &expected, item.transition, item.evidence.as_ref()).await {
        Ok(claim) => Ok(Some(claim)),
        Err(e) if e.is_conflict() => replan_and_claim(ctx, item).await,
        Err(e) => Err(e),
    }
}

/// Insert the first record of a newly observed pair.
async fn observe(
    ctx: &PairContext,
    item: &WorklistItem,
) -> Result<Option<SyncStateModel>, StateError> {
    let Some(evidence) = &item.evidence else {
        return Ok(None);
    };
    let fresh = SyncStateModel::first_observation(
        &item.repo_name,
        &item.destination,
        &evidence.default_branch,
        evidence.visibility,
    );
    state::insert_new(&ctx.db, fresh, "observe").await.map(Some)
}

async fn replan_and_claim(
    ctx: &PairContext,
    item: &WorklistItem,
) -> Result<Option<Claimed>, StateError> {
    tracing::debug!("Stored state changed since planning, re-planning pair");

    let Some(fresh) = state::find(&ctx.db, &item.repo_name, &item.destination).await? else {
        return Ok(None);
    };
    let plan = plan_pair(
        item.evidence.as_ref(),
        Some(&fresh),
        &ReconcileOptions::from(ctx.options.as_ref()),
        Utc::now(),
    );
    let Plan::Execute(transition) = plan else {
        tracing::debug!(?plan, "Nothing to do after re-planning");
        return Ok(None);
    };

    try_claim(ctx, &fresh, transition, item.evidence.as_ref())
        .await
        .map(Some)
}

async fn try_claim(
    ctx: &PairContext,
    expected: &SyncStateModel,
    transition: Transition,
    evidence: Option<&RepositoryRecord>,
) -> Result<Claimed, StateError> {
    let next = claimed_model(expected, transition, evidence, Utc::now());
    let model = state::compare_and_swap(&ctx.db, expected, next, &transition.to_string()).await?;
    Ok(Claimed {
        model,
        transition,
        after_unfinished: after_unfinished(expected),
    })
}

fn claimed_model(
    expected: &SyncStateModel,
    transition: Transition,
    evidence: Option<&RepositoryRecord>,
    now: DateTime<Utc>,
) -> SyncStateModel {
    let mut next = expected.clone();
    next.status = match (expected.status, transition) {
        (SyncStatus::Absent, Transition::CreateAndSync) => SyncStatus::Creating,
        (SyncStatus::Synced, Transition::Sync) => SyncStatus::Drifted,
        (status, _) => status,
    };
    next.pending_transition = Some(transition);
    next.last_attempt_at = Some(now.fixed_offset());
    next.next_attempt_at = None;
    if let Some(evidence) = evidence {
        next.default_branch = evidence.default_branch.clone();
        next.visibility = evidence.visibility;
    }
    next
}

// ─── Network work ────────────────────────────────────────────────────────────

async fn perform(
    ctx: &PairContext,
    claim: &Claimed,
    evidence: Option<&RepositoryRecord>,
) -> Result<WorkDone, StepError> {
    let claimed = &claim.model;
    match claim.transition {
        Transition::CreateAndSync => {
            let evidence = evidence.ok_or_else(|| {
                PlatformError::internal("create-and-sync planned without a source record")
            })?;
            ensure_destination(ctx, &claimed.repo_name, evidence).await?;
            sync_refs(ctx, claimed, PushMode::Always).await
        }
        Transition::Sync if claim.after_unfinished => {
            sync_refs(ctx, claimed, PushMode::Reopen).await
        }
        Transition::Sync => sync_refs(ctx, claimed, PushMode::WhenDiverged).await,
        Transition::SoftDelete => soft_delete(ctx, claimed).await,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushMode {
    /// Freshly created or unarchived destination.
    Always,
    /// Push unless the destination already matches the source.
    WhenDiverged,
    /// Like `WhenDiverged`, but an interrupted soft delete may have archived
    /// the destination, so unarchive before pushing.
    Reopen,
}

async fn ensure_destination(
    ctx: &PairContext,
    name: &str,
    evidence: &RepositoryRecord,
) -> Result<(), StepError> {
    ctx.checkpoint()?;
    if ctx.adapter.exists(name).await? {
        // A revived pair finds its destination archived by the tombstone.
        ctx.checkpoint()?;
        ctx.adapter.unarchive(name).await?;
        return Ok(());
    }

    ctx.checkpoint()?;
    let description = format!("Mirror of {}", ctx.source.remote(name).url());
    match ctx
        .adapter
        .create(name, evidence.visibility, &description)
        .await?
    {
        CreateOutcome::Created => {
            tracing::info!(visibility = %evidence.visibility, "Destination repository created")
        }
        CreateOutcome::AlreadyExists => tracing::debug!("Destination repository already exists"),
    }
    Ok(())
}

/// Fetch the source and force the destination to match it.
///
/// Outside [`PushMode::Always`], nothing is pushed when the destination
/// already advertises exactly the fetched refs. The stored marker is never
/// trusted for that decision: the destination may have moved since.
async fn sync_refs(
    ctx: &PairContext,
    claimed: &SyncStateModel,
    mode: PushMode,
) -> Result<WorkDone, StepError> {
    let name = claimed.repo_name.as_str();

    ctx.checkpoint()?;
    let refs = ctx
        .adapter
        .fetch_from_source(&ctx.source.remote(name), name)
        .await?;
    let marker = refs.marker();

    let wants_audit = ctx.options.audit_drift && claimed.last_source_commit_marker.is_some();
    let current = if mode != PushMode::Always || wants_audit {
        ctx.checkpoint()?;
        match ctx.adapter.advertised_refs(name).await {
            Ok(current) => Some(current),
            Err(e) => {
                tracing::debug!(error = %e, "Could not read destination refs");
                None
            }
        }
    } else {
        None
    };

    if mode != PushMode::Always && current.as_ref().is_some_and(|c| c.marker() == marker) {
        tracing::debug!("Destination already matches the source");
        return Ok(WorkDone {
            changed: false,
            marker: Some(marker),
            protection_attempted: false,
        });
    }

    if wants_audit && let Some(current) = &current {
        audit_drift(claimed, current);
    }

    if mode == PushMode::Reopen {
        ctx.checkpoint()?;
        ctx.adapter.unarchive(name).await?;
    }

    ctx.checkpoint()?;
    ctx.adapter.push_mirror(name).await?;
    tracing::info!(refs = refs.len(), "Mirrored refs to destination");

    let protection_attempted = if ctx.options.enforce_branch_protection {
        ctx.checkpoint()?;
        if let Err(e) = ctx.adapter.protect(name, &claimed.default_branch).await {
            tracing::warn!(branch = %claimed.default_branch, error = %e, "Branch protection failed");
        }
        true
    } else {
        false
    };

    Ok(WorkDone {
        changed: true,
        marker: Some(marker),
        protection_attempted,
    })
}

/// Warn when the destination moved since the last push. The push overwrites
/// it regardless.
fn audit_drift(claimed: &SyncStateModel, current: &RefSet) {
    let Some(last) = claimed.last_source_commit_marker.as_deref() else {
        return;
    };
    if current.marker() != last {
        tracing::warn!(
            branch = %claimed.default_branch,
            prior_head = current.branch_head(&claimed.default_branch).unwrap_or("<none>"),
            "Destination diverged from the last mirrored state; overwriting"
        );
    }
}

async fn soft_delete(ctx: &PairContext, claimed: &SyncStateModel) -> Result<WorkDone, StepError> {
    let name = claimed.repo_name.as_str();
    let kept_marker = claimed.last_source_commit_marker.clone();

    ctx.checkpoint()?;
    if !ctx.adapter.exists(name).await? {
        tracing::info!("Destination repository absent; tombstoning record only");
        return Ok(WorkDone {
            changed: false,
            marker: kept_marker,
            protection_attempted: false,
        });
    }

    // An interrupted earlier attempt may have archived already, and archived
    // repositories reject pushes.
    ctx.checkpoint()?;
    ctx.adapter.unarchive(name).await?;

    let source_url = ctx.source.remote(name).url().to_string();
    let tombstone = Tombstone {
        repo: name,
        source_url: &source_url,
        source_org: ctx.source.org(),
        removed_at: Utc::now(),
        last_marker: kept_marker.as_deref(),
    };

    ctx.checkpoint()?;
    ctx.adapter
        .push_tombstone(name, &tombstone.commit(&claimed.default_branch))
        .await?;

    ctx.checkpoint()?;
    ctx.adapter.archive(name).await?;
    tracing::info!("Destination repository tombstoned and archived");

    Ok(WorkDone {
        changed: true,
        marker: kept_marker,
        protection_attempted: false,
    })
}

// ─── Finalize ────────────────────────────────────────────────────────────────

async fn finalize(
    ctx: &PairContext,
    claimed: &SyncStateModel,
    transition: Transition,
    work: Result<WorkDone, StepError>,
) -> OutcomeKind {
    let now = Utc::now();
    let (next, kind) = match work {
        Ok(done) => succeeded(claimed, transition, done, now),
        Err(StepError::Cancelled) => cancelled(claimed, now),
        Err(StepError::Platform(e)) => failed(claimed, transition, &e, &ctx.options, now),
    };

    match state::compare_and_swap(&ctx.db, claimed, next, &transition.to_string()).await {
        Ok(written) => {
            match &kind {
                OutcomeKind::Failed { kind, message, .. } => tracing::warn!(
                    %transition,
                    status = %written.status,
                    error_kind = %kind,
                    failure_count = written.failure_count,
                    error = %message,
                    "Transition failed"
                ),
                OutcomeKind::Cancelled => {
                    tracing::info!(%transition, "Transition interrupted by cancellation")
                }
                _ => tracing::info!(%transition, status = %written.status, "Transition complete"),
            }
            kind
        }
        Err(e) => {
            let error_kind = if e.is_conflict() {
                ErrorKind::ConflictingState
            } else {
                ErrorKind::Internal
            };
            tracing::warn!(%transition, error = %e, %error_kind, "Could not record outcome");
            OutcomeKind::Failed {
                kind: error_kind,
                message: e.to_string(),
                status: claimed.status,
            }
        }
    }
}

fn succeeded(
    claimed: &SyncStateModel,
    transition: Transition,
    done: WorkDone,
    now: DateTime<Utc>,
) -> (SyncStateModel, OutcomeKind) {
    let mut next = claimed.clone();
    next.status = match transition {
        Transition::SoftDelete => SyncStatus::Tombstoned,
        Transition::CreateAndSync | Transition::Sync => SyncStatus::Synced,
    };
    if done.marker.is_some() {
        next.last_source_commit_marker = done.marker;
    }
    if done.protection_attempted {
        next.protection_attempted_at = Some(now.fixed_offset());
    }
    next.pending_transition = None;
    next.last_success_at = Some(now.fixed_offset());
    next.failure_count = 0;
    next.last_error_kind = None;
    next.last_error_message = None;
    next.next_attempt_at = None;

    let kind = match transition {
        Transition::CreateAndSync => OutcomeKind::Created,
        Transition::Sync if done.changed => OutcomeKind::SyncedChanged,
        Transition::Sync => OutcomeKind::SyncedNoop,
        Transition::SoftDelete => OutcomeKind::Tombstoned,
    };
    (next, kind)
}

/// Interrupted attempts keep their status and failure count and are due
/// again immediately.
fn cancelled(claimed: &SyncStateModel, now: DateTime<Utc>) -> (SyncStateModel, OutcomeKind) {
    let mut next = claimed.clone();
    next.last_error_kind = Some(ErrorKind::Cancelled);
    next.last_error_message = Some("interrupted by cancellation".to_string());
    next.next_attempt_at = Some(now.fixed_offset());
    (next, OutcomeKind::Cancelled)
}

fn failed(
    claimed: &SyncStateModel,
    transition: Transition,
    error: &PlatformError,
    options: &MirrorOptions,
    now: DateTime<Utc>,
) -> (SyncStateModel, OutcomeKind) {
    let kind = error.kind();
    let failures = claimed.failure_count.saturating_add(1);
    let over_threshold = u32::try_from(failures).unwrap_or(u32::MAX) > options.retry_threshold;
    let degrade = kind == ErrorKind::PermissionDenied
        || transition == Transition::SoftDelete
        || over_threshold;

    let delay = backoff_for_attempt(
        options.retry_base_delay,
        options.retry_max_delay,
        u32::try_from(failures).unwrap_or(u32::MAX),
    );
    let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

    let mut next = claimed.clone();
    next.status = if degrade {
        SyncStatus::Degraded
    } else {
        claimed.status
    };
    next.failure_count = failures;
    next.last_error_kind = Some(kind);
    next.last_error_message = Some(short_error_message(error));
    next.next_attempt_at = Some((now + delay).fixed_offset());

    let outcome = OutcomeKind::Failed {
        kind,
        message: short_error_message(error),
        status: next.status,
    };
    (next, outcome)
}
