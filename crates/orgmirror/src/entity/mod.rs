//! SeaORM entity definitions for the mirror state schema.

pub mod code_visibility;
pub mod error_kind;
pub mod prelude;
pub mod sync_state;
pub mod sync_status;
pub mod sync_transition;
pub mod transition;
