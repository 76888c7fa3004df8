use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::entity::code_visibility::CodeVisibility;
use crate::mirror::ProgressCallback;

use super::errors::Result;
use super::types::{CreateOutcome, HostClient, RepoListing};

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default rate limits (requests per second).
pub mod rate_limits {
    /// GitHub: 5000 requests/hour = ~1.4/sec, we use 10/sec to allow bursts.
    pub const GITHUB_DEFAULT_RPS: u32 = 10;
}

fn quota(requests_per_second: u32) -> Quota {
    Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN))
}

/// A shareable request budget using the governor crate.
///
/// One limiter exists per destination identifier. Clones share the budget,
/// so the coordinator can throttle dispatch and the destination's client can
/// throttle its calls against the same quota.
///
/// # Example
///
/// ```ignore
/// use orgmirror::platform::ApiRateLimiter;
///
/// let limiter = ApiRateLimiter::new(10); // 10 requests per second
///
/// // Before each API call:
/// limiter.wait().await;
/// client.repo_exists("org", "repo").await?;
/// ```
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl ApiRateLimiter {
    /// Create a new rate limiter with the specified requests per second.
    ///
    /// A value of 0 is treated as 1.
    pub fn new(requests_per_second: u32) -> Self {
        Self {
            inner: Arc::new(RateLimiter::direct(quota(requests_per_second))),
        }
    }

    /// Wait until a request is allowed by the rate limiter.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

impl std::fmt::Debug for ApiRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRateLimiter").finish_non_exhaustive()
    }
}

/// A rate-limited wrapper around any `HostClient`.
///
/// All network methods wait for the limiter before delegating to the inner
/// client.
///
/// # Example
///
/// ```ignore
/// use orgmirror::platform::{RateLimitedClient, rate_limits};
/// use orgmirror::github::GitHubClient;
///
/// let client = GitHubClient::new(&credential, None)?;
/// let client = RateLimitedClient::new(client, rate_limits::GITHUB_DEFAULT_RPS);
///
/// // All operations are now rate-limited
/// let listing = client.list_org_repos("source-org", None).await?;
/// ```
pub struct RateLimitedClient<C> {
    inner: C,
    limiter: ApiRateLimiter,
}

impl<C> RateLimitedClient<C> {
    /// Wrap a client with its own limiter.
    pub fn new(inner: C, requests_per_second: u32) -> Self {
        Self::with_limiter(inner, ApiRateLimiter::new(requests_per_second))
    }

    /// Wrap a client with an existing, possibly shared, limiter.
    pub fn with_limiter(inner: C, limiter: ApiRateLimiter) -> Self {
        Self { inner, limiter }
    }

    /// Get a reference to the inner client.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// The limiter this client waits on.
    pub fn limiter(&self) -> &ApiRateLimiter {
        &self.limiter
    }

    async fn wait(&self) {
        self.limiter.wait().await;
    }
}

impl<C: Clone> Clone for RateLimitedClient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: self.limiter.clone(),
        }
    }
}

#[async_trait]
impl<C: HostClient> HostClient for RateLimitedClient<C> {
    fn host(&self) -> &str {
        self.inner.host()
    }

    fn clone_url(&self, org: &str, name: &str) -> String {
        self.inner.clone_url(org, name)
    }

    async fn list_org_repos(
        &self,
        org: &str,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<RepoListing> {
        self.wait().await;
        self.inner.list_org_repos(org, on_progress).await
    }

    async fn repo_exists(&self, org: &str, name: &str) -> Result<bool> {
        self.wait().await;
        self.inner.repo_exists(org, name).await
    }

    async fn create_repo(
        &self,
        org: &str,
        name: &str,
        visibility: CodeVisibility,
        description: &str,
    ) -> Result<CreateOutcome> {
        self.wait().await;
        self.inner
            .create_repo(org, name, visibility, description)
            .await
    }

    async fn set_archived(&self, org: &str, name: &str, archived: bool) -> Result<()> {
        self.wait().await;
        self.inner.set_archived(org, name, archived).await
    }

    async fn protect_branch(&self, org: &str, name: &str, branch: &str) -> Result<()> {
        self.wait().await;
        self.inner.protect_branch(org, name, branch).await
    }
}
