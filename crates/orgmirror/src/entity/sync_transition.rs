//! SyncTransition entity - append-only history of state writes.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::entity::error_kind::ErrorKind;
use crate::entity::sync_status::SyncStatus;

/// One recorded state write for a pair.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_transitions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub repo_name: String,
    pub destination: String,
    /// Transition name (`create-and-sync`, `sync`, `soft-delete`) or operator
    /// action (`revive`, `reset`).
    pub action: String,
    /// Status before the write; `None` for the first observation.
    pub from_status: Option<SyncStatus>,
    pub to_status: SyncStatus,
    pub error_kind: Option<ErrorKind>,
    #[sea_orm(column_type = "Text", nullable)]
    pub message: Option<String>,
    pub recorded_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
