//! GitHub host client.
//!
//! # Module Structure
//!
//! - [`client`] - Client creation and the `HostClient` implementation
//! - [`repo`] - Organization listing
//! - `convert` - Conversion to host-agnostic records
//! - `error` - Mapping of octocrab errors
//!
//! ```ignore
//! use orgmirror::github::GitHubClient;
//! use orgmirror::platform::{Credential, HostClient};
//!
//! let client = GitHubClient::new(&Credential::new(token), None)?;
//! let listing = client.list_org_repos("source-org", None).await?;
//! ```

mod client;
mod convert;
mod error;
mod repo;

pub use client::{DEFAULT_CALL_TIMEOUT, GITHUB_API_URL, GITHUB_WEB_URL, GitHubClient, create_client, web_url_for};
pub use convert::to_host_repo;
pub use repo::{PAGE_SIZE, expected_repo_count, list_org_repos};
