//! SyncState entity - durable record for one (repository, destination) pair.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::entity::code_visibility::CodeVisibility;
use crate::entity::error_kind::ErrorKind;
use crate::entity::sync_status::SyncStatus;
use crate::entity::transition::Transition;

/// SyncState model. The composite primary key is the durable identity of a pair.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_states")]
pub struct Model {
    // ─── Identity ────────────────────────────────────────────────────────────
    /// Repository name in the source organization.
    #[sea_orm(primary_key, auto_increment = false)]
    pub repo_name: String,
    /// Destination identifier from the configuration.
    #[sea_orm(primary_key, auto_increment = false)]
    pub destination: String,

    // ─── Lifecycle ───────────────────────────────────────────────────────────
    pub status: SyncStatus,
    /// Digest of the ref set that was last pushed successfully.
    #[sea_orm(column_type = "Text", nullable)]
    pub last_source_commit_marker: Option<String>,
    /// Transition claimed by the last attempt that has not completed yet.
    pub pending_transition: Option<Transition>,

    // ─── Attempts ────────────────────────────────────────────────────────────
    pub last_attempt_at: Option<DateTimeWithTimeZone>,
    pub last_success_at: Option<DateTimeWithTimeZone>,
    /// Consecutive failures, reset on success.
    pub failure_count: i32,
    pub last_error_kind: Option<ErrorKind>,
    #[sea_orm(column_type = "Text", nullable)]
    pub last_error_message: Option<String>,
    /// Earliest time the next automatic attempt may start.
    pub next_attempt_at: Option<DateTimeWithTimeZone>,

    // ─── Source facts needed after the source is gone ────────────────────────
    pub default_branch: String,
    pub visibility: CodeVisibility,

    /// When branch protection was last attempted on the destination.
    pub protection_attempted_at: Option<DateTimeWithTimeZone>,

    /// Optimistic concurrency token, bumped on every write.
    pub version: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// A fresh record for a pair observed for the first time.
    pub fn first_observation(
        repo_name: impl Into<String>,
        destination: impl Into<String>,
        default_branch: impl Into<String>,
        visibility: CodeVisibility,
    ) -> Self {
        Self {
            repo_name: repo_name.into(),
            destination: destination.into(),
            status: SyncStatus::Absent,
            last_source_commit_marker: None,
            pending_transition: None,
            last_attempt_at: None,
            last_success_at: None,
            failure_count: 0,
            last_error_kind: None,
            last_error_message: None,
            next_attempt_at: None,
            default_branch: default_branch.into(),
            visibility,
            protection_attempted_at: None,
            version: 0,
        }
    }

    /// Whether backoff allows an automatic attempt at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at
            .map(|at| at.with_timezone(&Utc) <= now)
            .unwrap_or(true)
    }

    /// Whether the pair has ever been pushed successfully.
    #[inline]
    pub fn has_succeeded(&self) -> bool {
        self.last_success_at.is_some()
    }

    /// Display key `repo -> destination`.
    pub fn pair_label(&self) -> String {
        format!("{} -> {}", self.repo_name, self.destination)
    }
}
