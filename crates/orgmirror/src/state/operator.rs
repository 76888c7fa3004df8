//! Operator-only transitions. Automation never calls these.

use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use crate::entity::sync_state::{Column, Entity as SyncState, Model};
use crate::entity::sync_status::SyncStatus;

use super::errors::{Result, StateError};
use super::single::{find, swap};

/// Clear attempt bookkeeping so the next run starts from a clean slate.
fn cleared(mut model: Model, status: SyncStatus) -> Model {
    model.status = status;
    model.pending_transition = None;
    model.failure_count = 0;
    model.last_error_kind = None;
    model.last_error_message = None;
    model.next_attempt_at = None;
    model
}

async fn operator_swap(
    db: &DatabaseConnection,
    current: &Model,
    next: Model,
    action: &str,
) -> Result<Model> {
    if !current.status.operator_can_transition_to(next.status) {
        return Err(StateError::InvalidTransition {
            repo: current.repo_name.clone(),
            destination: current.destination.clone(),
            from: current.status,
            to: next.status,
        });
    }
    let written = swap(db, current, next, action).await?;
    tracing::info!(
        repo = %written.repo_name,
        destination = %written.destination,
        from = %current.status,
        to = %written.status,
        action,
        "Operator transition applied"
    );
    Ok(written)
}

/// Bring a tombstoned pair back to `absent` so the next run recreates it.
///
/// The stored marker is dropped: the destination now carries the tombstone
/// commit and must be pushed again even if the source did not change.
pub async fn revive(db: &DatabaseConnection, repo: &str, destination: &str) -> Result<Model> {
    let current = find(db, repo, destination)
        .await?
        .ok_or_else(|| StateError::not_found(repo, destination))?;
    if current.status != SyncStatus::Tombstoned {
        return Err(StateError::InvalidTransition {
            repo: current.repo_name.clone(),
            destination: current.destination.clone(),
            from: current.status,
            to: SyncStatus::Absent,
        });
    }

    let mut next = cleared(current.clone(), SyncStatus::Absent);
    next.last_source_commit_marker = None;
    operator_swap(db, &current, next, "revive").await
}

/// Release a degraded pair for automatic retries.
///
/// Pairs that were pushed at least once go to `drifted`, others to `absent`.
pub async fn reset(db: &DatabaseConnection, repo: &str, destination: &str) -> Result<Model> {
    let current = find(db, repo, destination)
        .await?
        .ok_or_else(|| StateError::not_found(repo, destination))?;

    let target = if current.has_succeeded() {
        SyncStatus::Drifted
    } else {
        SyncStatus::Absent
    };
    let next = cleared(current.clone(), target);
    operator_swap(db, &current, next, "reset").await
}

/// Delete tombstoned records whose tombstone is older than `cutoff`.
///
/// History rows are kept. Returns the number of records removed.
pub async fn prune_tombstoned(db: &DatabaseConnection, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = SyncState::delete_many()
        .filter(Column::Status.eq(SyncStatus::Tombstoned))
        .filter(Column::LastSuccessAt.lt(cutoff.fixed_offset()))
        .exec(db)
        .await?;

    if result.rows_affected > 0 {
        tracing::info!(count = result.rows_affected, %cutoff, "Pruned tombstoned records");
    }
    Ok(result.rows_affected)
}
