//! Host-agnostic capabilities the engine consumes.
//!
//! `HostClient` covers the organization-level API of a version-control host
//! (listing, existence, creation, archival). Ref transport lives in
//! [`crate::git`].
//!
//! # Example
//!
//! ```ignore
//! use orgmirror::platform::{HostClient, PlatformError};
//!
//! async fn names<C: HostClient>(client: &C, org: &str) -> Result<Vec<String>, PlatformError> {
//!     let listing = client.list_org_repos(org, None).await?;
//!     Ok(listing.repos.into_iter().map(|r| r.name).collect())
//! }
//! ```

mod deadline;
mod errors;
mod rate_limit;
mod types;

pub use deadline::with_timeout;
pub use errors::{PlatformError, Result, short_error_message};
pub use rate_limit::{ApiRateLimiter, RateLimitedClient, rate_limits};
pub use types::{CreateOutcome, Credential, HostClient, HostRepo, RepoListing};
