//! Capability wrappers the executor talks to.
//!
//! [`DestinationAdapter`] binds one destination organization to its host
//! client, credential, request budget and working-mirror root. [`SourceAccess`]
//! does the same for the source organization. Every network call made through
//! them carries the configured per-call deadline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::entity::code_visibility::CodeVisibility;
use crate::git::{RefSet, RefTransport, Remote, TombstoneCommit};
use crate::platform::{
    self, ApiRateLimiter, CreateOutcome, Credential, HostClient, RateLimitedClient, with_timeout,
};

use super::types::Destination;

/// Read access to the source organization.
#[derive(Clone)]
pub struct SourceAccess {
    org: String,
    client: Arc<dyn HostClient>,
    transport: Arc<dyn RefTransport>,
    credential: Option<Credential>,
    call_timeout: Duration,
}

impl SourceAccess {
    pub fn new(
        org: impl Into<String>,
        client: Arc<dyn HostClient>,
        transport: Arc<dyn RefTransport>,
        credential: Option<Credential>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            org: org.into(),
            client,
            transport,
            credential,
            call_timeout,
        }
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    pub fn client(&self) -> &dyn HostClient {
        self.client.as_ref()
    }

    pub(crate) fn transport(&self) -> Arc<dyn RefTransport> {
        Arc::clone(&self.transport)
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Remote for a source repository.
    pub fn remote(&self, name: &str) -> Remote {
        Remote::new(self.client.clone_url(&self.org, name), self.credential.clone())
    }
}

impl std::fmt::Debug for SourceAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceAccess")
            .field("org", &self.org)
            .field("host", &self.client.host())
            .finish_non_exhaustive()
    }
}

/// Capabilities of one destination organization.
///
/// All operations are safe to call twice with the same arguments.
pub struct DestinationAdapter {
    destination: Destination,
    client: RateLimitedClient<Arc<dyn HostClient>>,
    transport: Arc<dyn RefTransport>,
    credential: Option<Credential>,
    work_root: PathBuf,
    call_timeout: Duration,
}

impl DestinationAdapter {
    /// Build an adapter with its own request budget.
    pub fn new(
        destination: Destination,
        client: Arc<dyn HostClient>,
        transport: Arc<dyn RefTransport>,
        credential: Option<Credential>,
        work_root: impl Into<PathBuf>,
        call_timeout: Duration,
        requests_per_second: u32,
    ) -> Self {
        Self {
            destination,
            client: RateLimitedClient::new(client, requests_per_second),
            transport,
            credential,
            work_root: work_root.into(),
            call_timeout,
        }
    }

    pub fn id(&self) -> &str {
        &self.destination.id
    }

    pub fn org(&self) -> &str {
        &self.destination.org
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Request budget shared by every worker of this destination.
    pub fn limiter(&self) -> &ApiRateLimiter {
        self.client.limiter()
    }

    /// Working mirror of a repository: `<work_root>/<destination>/<repo>.git`.
    pub fn work_dir(&self, name: &str) -> PathBuf {
        self.work_root
            .join(&self.destination.id)
            .join(format!("{name}.git"))
    }

    /// Remote for the destination copy of a repository.
    pub fn remote(&self, name: &str) -> Remote {
        Remote::new(
            self.client.clone_url(&self.destination.org, name),
            self.credential.clone(),
        )
    }

    pub async fn exists(&self, name: &str) -> platform::Result<bool> {
        with_timeout(
            "exists",
            self.call_timeout,
            self.client.repo_exists(&self.destination.org, name),
        )
        .await
    }

    /// Create the repository. `AlreadyExists` is a success.
    pub async fn create(
        &self,
        name: &str,
        visibility: CodeVisibility,
        description: &str,
    ) -> platform::Result<CreateOutcome> {
        with_timeout(
            "create",
            self.call_timeout,
            self.client
                .create_repo(&self.destination.org, name, visibility, description),
        )
        .await
    }

    pub async fn archive(&self, name: &str) -> platform::Result<()> {
        with_timeout(
            "archive",
            self.call_timeout,
            self.client.set_archived(&self.destination.org, name, true),
        )
        .await
    }

    pub async fn unarchive(&self, name: &str) -> platform::Result<()> {
        with_timeout(
            "unarchive",
            self.call_timeout,
            self.client.set_archived(&self.destination.org, name, false),
        )
        .await
    }

    pub async fn protect(&self, name: &str, branch: &str) -> platform::Result<()> {
        with_timeout(
            "protect_branch",
            self.call_timeout,
            self.client
                .protect_branch(&self.destination.org, name, branch),
        )
        .await
    }

    /// Fetch the source into this destination's working mirror.
    pub async fn fetch_from_source(&self, source: &Remote, name: &str) -> platform::Result<RefSet> {
        let work_dir = self.work_dir(name);
        with_timeout(
            "fetch_mirror",
            self.call_timeout,
            self.transport.fetch_mirror(source, &work_dir),
        )
        .await
    }

    /// Force the destination to the working mirror's branches and tags.
    pub async fn push_mirror(&self, name: &str) -> platform::Result<()> {
        let work_dir = self.work_dir(name);
        let remote = self.remote(name);
        with_timeout(
            "push_mirror",
            self.call_timeout,
            self.transport.push_mirror(&work_dir, &remote),
        )
        .await
    }

    /// Branches and tags the destination currently advertises.
    pub async fn advertised_refs(&self, name: &str) -> platform::Result<RefSet> {
        let remote = self.remote(name);
        with_timeout(
            "ls_remote",
            self.call_timeout,
            self.transport.ls_remote(&remote),
        )
        .await
    }

    pub async fn push_tombstone(
        &self,
        name: &str,
        commit: &TombstoneCommit,
    ) -> platform::Result<()> {
        let work_dir = self.work_dir(name);
        let remote = self.remote(name);
        with_timeout(
            "push_tombstone",
            self.call_timeout,
            self.transport.push_tombstone(&work_dir, &remote, commit),
        )
        .await
    }
}

impl std::fmt::Debug for DestinationAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationAdapter")
            .field("destination", &self.destination)
            .field("work_root", &self.work_root)
            .finish_non_exhaustive()
    }
}
