//! State store: durable SyncState records keyed by (repository, destination).
//!
//! Every write is a compare-and-swap on the record's `version` column and is
//! committed together with an append-only history row, so a reader never
//! observes half of a transition and two writers can never both win.

mod errors;
mod operator;
mod query;
mod single;

pub use errors::{Result, StateError};
pub use operator::{prune_tombstoned, reset, revive};
pub use query::{find_by_repo, history, list_all, list_by_destination, list_by_status};
pub use single::{compare_and_swap, find, insert_new};
