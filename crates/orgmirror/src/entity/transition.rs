//! Transitions the reconciler can require of a pair.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A required state transition for one (repository, destination) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Ensure the destination repository exists, then mirror refs.
    #[sea_orm(string_value = "create_and_sync")]
    CreateAndSync,
    /// Mirror refs into an existing destination repository.
    #[sea_orm(string_value = "sync")]
    Sync,
    /// Tombstone and archive the destination repository.
    #[sea_orm(string_value = "soft_delete")]
    SoftDelete,
}

impl Transition {
    /// Whether this transition creates or pushes repository content.
    #[inline]
    pub fn is_content_sync(self) -> bool {
        matches!(self, Transition::CreateAndSync | Transition::Sync)
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Transition::CreateAndSync => "create-and-sync",
            Transition::Sync => "sync",
            Transition::SoftDelete => "soft-delete",
        };
        f.write_str(s)
    }
}
