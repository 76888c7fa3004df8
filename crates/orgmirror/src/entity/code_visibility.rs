//! Visibility enum for repository access levels.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Repository visibility levels (normalized across hosts).
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum CodeVisibility {
    #[sea_orm(string_value = "public")]
    Public,
    #[sea_orm(string_value = "private")]
    #[default]
    Private,
    /// Enterprise-only: visible to every member of the enterprise.
    #[sea_orm(string_value = "internal")]
    Internal,
}

impl CodeVisibility {
    /// Whether the repository must be created as private on a destination.
    ///
    /// Internal repositories are mirrored as private so that they never widen
    /// their audience when the destination lives outside the enterprise.
    #[inline]
    pub fn is_private(self) -> bool {
        !matches!(self, CodeVisibility::Public)
    }
}

impl std::fmt::Display for CodeVisibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeVisibility::Public => write!(f, "public"),
            CodeVisibility::Private => write!(f, "private"),
            CodeVisibility::Internal => write!(f, "internal"),
        }
    }
}
