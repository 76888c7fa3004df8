//! The mirror engine.
//!
//! A run flows through four stages:
//!
//! 1. [`enumerate_source`] lists the source organization and fails closed.
//! 2. [`reconcile`] compares the inventory with stored state and produces a
//!    [`Worklist`] of required transitions.
//! 3. [`execute_item`] applies one transition to one pair, claiming and
//!    finalizing it with versioned writes.
//! 4. [`RunCoordinator`] drives the stages with bounded concurrency and
//!    folds outcomes into a [`RunSummary`].

mod adapter;
mod coordinator;
mod enumerate;
mod errors;
mod executor;
mod progress;
mod reconcile;
mod summary;
mod tombstone;
mod types;

pub use adapter::{DestinationAdapter, SourceAccess};
pub use coordinator::RunCoordinator;
pub use enumerate::enumerate_source;
pub use errors::{EnumerationError, RunError};
pub use executor::{PairContext, execute_item};
pub use progress::{MirrorProgress, ProgressCallback, emit};
pub use reconcile::{Plan, ReconcileOptions, plan_pair, reconcile};
pub use summary::{DegradedPair, OutcomeKind, PairOutcome, PlannedItem, RunSummary};
pub use tombstone::{TOMBSTONE_PATH, Tombstone};
pub use types::{
    DEFAULT_CALL_TIMEOUT, DEFAULT_CONCURRENCY, DEFAULT_CREATING_RETRY_AFTER,
    DEFAULT_MARKER_CONCURRENCY, DEFAULT_RETRY_BASE_DELAY, DEFAULT_RETRY_MAX_DELAY,
    DEFAULT_RETRY_THRESHOLD, Destination, MirrorOptions, PairRef, RepositoryRecord, Worklist,
    WorklistItem,
};
