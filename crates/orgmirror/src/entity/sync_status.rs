//! Lifecycle status of a (repository, destination) pair.
//!
//! ```text
//! absent ──> creating ──> synced <──> drifted
//!    │           │          │            │
//!    └───────────┴────┬─────┴────────────┘
//!                     v
//!          degraded / tombstoned
//! ```
//!
//! `tombstoned` is terminal for automation. Leaving it, or leaving
//! `degraded` without a successful transition, is an operator action.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Synchronization status of one (repository, destination) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Known pair with nothing on the destination yet.
    #[sea_orm(string_value = "absent")]
    Absent,
    /// Creation claimed; destination repository may or may not exist yet.
    #[sea_orm(string_value = "creating")]
    Creating,
    /// Destination matches the last observed source state.
    #[sea_orm(string_value = "synced")]
    Synced,
    /// Source moved since the last successful push; a sync is pending.
    #[sea_orm(string_value = "drifted")]
    Drifted,
    /// Source removed; destination archived and marked with a tombstone.
    #[sea_orm(string_value = "tombstoned")]
    Tombstoned,
    /// Repeated or non-retryable failures; suspended pending attention.
    #[sea_orm(string_value = "degraded")]
    Degraded,
}

impl SyncStatus {
    /// Whether automatic execution may move a record from `self` to `next`.
    ///
    /// Self-edges are allowed for every non-terminal status so that an attempt
    /// can be recorded without changing the status.
    pub fn can_transition_to(self, next: SyncStatus) -> bool {
        use SyncStatus::*;

        if self == Tombstoned {
            return false;
        }
        if self == next {
            return true;
        }

        matches!(
            (self, next),
            (Absent, Creating)
                | (Creating, Synced)
                | (Synced, Drifted)
                | (Drifted, Synced)
                | (Degraded, Synced)
                | (_, Degraded)
                | (_, Tombstoned)
        )
    }

    /// Whether an operator command may move a record from `self` to `next`.
    ///
    /// These edges are never taken by the automatic path.
    pub fn operator_can_transition_to(self, next: SyncStatus) -> bool {
        use SyncStatus::*;
        matches!(
            (self, next),
            (Tombstoned, Absent) | (Degraded, Absent) | (Degraded, Drifted)
        )
    }

    /// Whether automation must leave this record alone.
    #[inline]
    pub fn is_terminal_for_automation(self) -> bool {
        matches!(self, SyncStatus::Tombstoned)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncStatus::Absent => "absent",
            SyncStatus::Creating => "creating",
            SyncStatus::Synced => "synced",
            SyncStatus::Drifted => "drifted",
            SyncStatus::Tombstoned => "tombstoned",
            SyncStatus::Degraded => "degraded",
        };
        f.write_str(s)
    }
}
