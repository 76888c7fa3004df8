//! Orgmirror - replicate a source organization into destination organizations.
//!
//! Every repository of the source organization is mirrored into each
//! configured destination organization. Per-pair progress lives in a durable
//! state store, so runs are idempotent and resumable, and a crash never leaves
//! a pair looking more complete than it is.
//!
//! # Features
//!
//! - `github` - GitHub host client built on octocrab.
//! - `sqlite` / `postgres` - State store backends.
//! - `migrate` - Schema migrations. Enables [`connect_and_migrate`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use orgmirror::{connect_and_migrate, git::GitCli, github::GitHubClient, mirror::*};
//!
//! let db = connect_and_migrate("sqlite://orgmirror.db?mode=rwc").await?;
//! let transport = Arc::new(GitCli::new(DEFAULT_CALL_TIMEOUT));
//! let source = SourceAccess::new("acme", Arc::new(source_client), transport.clone(), Some(token), DEFAULT_CALL_TIMEOUT);
//!
//! let coordinator = RunCoordinator::new(db, source, destinations, MirrorOptions::new("acme", "/var/lib/orgmirror"));
//! let summary = coordinator.run(None).await?;
//! println!("{} created, {} degraded", summary.created, summary.degraded);
//! ```

pub mod db;
pub mod entity;
pub mod git;
pub mod mirror;
pub mod platform;
pub mod retry;
pub mod state;

#[cfg(feature = "github")]
pub mod github;

#[cfg(feature = "migrate")]
pub mod migration;

pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use entity::prelude::*;
pub use mirror::{MirrorOptions, RunCoordinator, RunError, RunSummary};
pub use platform::{
    ApiRateLimiter, Credential, HostClient, PlatformError, RateLimitedClient, rate_limits,
};
pub use state::StateError;
