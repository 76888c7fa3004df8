use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, Set, SqlErr, TransactionTrait,
};
use uuid::Uuid;

use crate::entity::sync_state::{Column, Entity as SyncState, Model};
use crate::entity::sync_status::SyncStatus;
use crate::entity::sync_transition::{ActiveModel as TransitionActiveModel, Entity as SyncTransition};

use super::errors::{Result, StateError};

// ─── Single Record Operations ────────────────────────────────────────────────

/// Find the record for a pair.
pub async fn find(db: &DatabaseConnection, repo: &str, destination: &str) -> Result<Option<Model>> {
    SyncState::find_by_id((repo.to_string(), destination.to_string()))
        .one(db)
        .await
        .map_err(StateError::from)
}

/// Insert the record of a pair observed for the first time.
///
/// The stored version starts at 1. A record that already exists for the pair
/// yields `StateError::Conflict`: another writer observed it first.
pub async fn insert_new(db: &DatabaseConnection, model: Model, action: &str) -> Result<Model> {
    let mut model = model;
    model.version = 1;

    let txn = db.begin().await?;
    let inserted = SyncState::insert(model.clone().into_active_model().reset_all())
        .exec_without_returning(&txn)
        .await;

    if let Err(err) = inserted {
        txn.rollback().await?;
        return match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                Err(StateError::conflict(&model.repo_name, &model.destination))
            }
            _ => Err(StateError::Database(err)),
        };
    }

    record_history(&txn, None, &model, action).await?;
    txn.commit().await?;

    tracing::debug!(
        repo = %model.repo_name,
        destination = %model.destination,
        status = %model.status,
        "Sync state created"
    );
    Ok(model)
}

/// Replace `expected` with `next` if nobody wrote the pair in between.
///
/// The write is rejected with `StateError::InvalidTransition` if the status
/// change is not an automatic edge, and with `StateError::Conflict` if the
/// stored version no longer matches `expected.version`.
pub async fn compare_and_swap(
    db: &DatabaseConnection,
    expected: &Model,
    next: Model,
    action: &str,
) -> Result<Model> {
    if !expected.status.can_transition_to(next.status) {
        return Err(StateError::InvalidTransition {
            repo: expected.repo_name.clone(),
            destination: expected.destination.clone(),
            from: expected.status,
            to: next.status,
        });
    }
    swap(db, expected, next, action).await
}

/// Versioned write without edge validation. Callers validate the edge.
pub(super) async fn swap(
    db: &DatabaseConnection,
    expected: &Model,
    next: Model,
    action: &str,
) -> Result<Model> {
    if expected.repo_name != next.repo_name || expected.destination != next.destination {
        return Err(StateError::InvalidInput {
            message: format!(
                "cannot swap {} for {}",
                expected.pair_label(),
                next.pair_label()
            ),
        });
    }

    let mut next = next;
    next.version = expected.version + 1;

    let txn = db.begin().await?;
    let result = SyncState::update_many()
        .set(next.clone().into_active_model().reset_all())
        .filter(Column::RepoName.eq(expected.repo_name.as_str()))
        .filter(Column::Destination.eq(expected.destination.as_str()))
        .filter(Column::Version.eq(expected.version))
        .exec(&txn)
        .await?;

    if result.rows_affected == 0 {
        txn.rollback().await?;
        return Err(StateError::conflict(&expected.repo_name, &expected.destination));
    }

    record_history(&txn, Some(expected.status), &next, action).await?;
    txn.commit().await?;

    tracing::debug!(
        repo = %next.repo_name,
        destination = %next.destination,
        from = %expected.status,
        to = %next.status,
        version = next.version,
        "Sync state updated"
    );
    Ok(next)
}

async fn record_history<C: ConnectionTrait>(
    conn: &C,
    from: Option<SyncStatus>,
    written: &Model,
    action: &str,
) -> Result<()> {
    let row = TransitionActiveModel {
        id: Set(Uuid::new_v4()),
        repo_name: Set(written.repo_name.clone()),
        destination: Set(written.destination.clone()),
        action: Set(action.to_string()),
        from_status: Set(from),
        to_status: Set(written.status),
        error_kind: Set(written.last_error_kind),
        message: Set(written.last_error_message.clone()),
        recorded_at: Set(Utc::now().fixed_offset()),
    };
    SyncTransition::insert(row).exec_without_returning(conn).await?;
    Ok(())
}
