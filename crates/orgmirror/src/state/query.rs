use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};

use crate::entity::sync_state::{Column, Entity as SyncState, Model};
use crate::entity::sync_status::SyncStatus;
use crate::entity::sync_transition::{
    Column as TransitionColumn, Entity as SyncTransition, Model as TransitionModel,
};

use super::errors::Result;

// ─── Query Operations ────────────────────────────────────────────────────────

/// Every record, ordered by destination then repository.
pub async fn list_all(db: &DatabaseConnection) -> Result<Vec<Model>> {
    Ok(SyncState::find()
        .order_by_asc(Column::Destination)
        .order_by_asc(Column::RepoName)
        .all(db)
        .await?)
}

/// Records for one destination.
pub async fn list_by_destination(db: &DatabaseConnection, destination: &str) -> Result<Vec<Model>> {
    Ok(SyncState::find()
        .filter(Column::Destination.eq(destination))
        .order_by_asc(Column::RepoName)
        .all(db)
        .await?)
}

/// Records in a given status.
pub async fn list_by_status(db: &DatabaseConnection, status: SyncStatus) -> Result<Vec<Model>> {
    Ok(SyncState::find()
        .filter(Column::Status.eq(status))
        .order_by_asc(Column::Destination)
        .order_by_asc(Column::RepoName)
        .all(db)
        .await?)
}

/// Records of one repository across all destinations.
pub async fn find_by_repo(db: &DatabaseConnection, repo: &str) -> Result<Vec<Model>> {
    Ok(SyncState::find()
        .filter(Column::RepoName.eq(repo))
        .order_by_asc(Column::Destination)
        .all(db)
        .await?)
}

/// Recorded writes of a pair, oldest first.
pub async fn history(
    db: &DatabaseConnection,
    repo: &str,
    destination: &str,
) -> Result<Vec<TransitionModel>> {
    Ok(SyncTransition::find()
        .filter(TransitionColumn::RepoName.eq(repo))
        .filter(TransitionColumn::Destination.eq(destination))
        .order_by_asc(TransitionColumn::RecordedAt)
        .all(db)
        .await?)
}
