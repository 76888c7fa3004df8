//! Common re-exports for convenient entity usage.

pub use super::code_visibility::CodeVisibility;
pub use super::error_kind::ErrorKind;
pub use super::sync_state::{
    ActiveModel as SyncStateActiveModel, Column as SyncStateColumn, Entity as SyncState,
    Model as SyncStateModel,
};
pub use super::sync_status::SyncStatus;
pub use super::sync_transition::{
    ActiveModel as SyncTransitionActiveModel, Column as SyncTransitionColumn,
    Entity as SyncTransition, Model as SyncTransitionModel,
};
pub use super::transition::Transition;
