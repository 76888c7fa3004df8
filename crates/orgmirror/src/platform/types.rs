use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::entity::code_visibility::CodeVisibility;
use crate::mirror::ProgressCallback;

use super::errors::Result;

/// A repository as the host reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRepo {
    /// Repository name, unique within the organization.
    pub name: String,
    /// Default branch name.
    pub default_branch: String,
    /// Repository visibility.
    pub visibility: CodeVisibility,
    /// Whether the repository is archived.
    pub is_archived: bool,
}

/// Result of listing an organization.
#[derive(Debug, Clone, Default)]
pub struct RepoListing {
    /// Every repository, each exactly once.
    pub repos: Vec<HostRepo>,
    /// Repository count the host advertises for the organization, when it
    /// exposes one. Used to detect truncated listings.
    pub expected_total: Option<usize>,
}

/// Outcome of a create call. Both variants mean the repository exists now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// An access token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for handing to a transport.
    #[inline]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Organization-scoped operations on a version-control host.
///
/// A client is bound to one credential at construction. Every operation must
/// be safe to repeat with the same arguments.
///
/// Implementors should:
/// - Handle pagination internally for list operations
/// - Return each repository exactly once, even if a page was retried
/// - Convert host-specific errors to `PlatformError`
#[async_trait]
pub trait HostClient: Send + Sync {
    /// Host label for logs, e.g. `github.com`.
    fn host(&self) -> &str;

    /// HTTPS clone URL of a repository, without credentials.
    fn clone_url(&self, org: &str, name: &str) -> String;

    /// List every repository of an organization.
    async fn list_org_repos(
        &self,
        org: &str,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<RepoListing>;

    /// Whether the repository exists.
    async fn repo_exists(&self, org: &str, name: &str) -> Result<bool>;

    /// Create an empty repository with the given visibility.
    async fn create_repo(
        &self,
        org: &str,
        name: &str,
        visibility: CodeVisibility,
        description: &str,
    ) -> Result<CreateOutcome>;

    /// Archive or unarchive a repository.
    async fn set_archived(&self, org: &str, name: &str, archived: bool) -> Result<()>;

    /// Require pull-request review on a branch. Best effort.
    async fn protect_branch(&self, org: &str, name: &str, branch: &str) -> Result<()>;
}

#[async_trait]
impl<T: HostClient + ?Sized> HostClient for Arc<T> {
    fn host(&self) -> &str {
        (**self).host()
    }

    fn clone_url(&self, org: &str, name: &str) -> String {
        (**self).clone_url(org, name)
    }

    async fn list_org_repos(
        &self,
        org: &str,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<RepoListing> {
        (**self).list_org_repos(org, on_progress).await
    }

    async fn repo_exists(&self, org: &str, name: &str) -> Result<bool> {
        (**self).repo_exists(org, name).await
    }

    async fn create_repo(
        &self,
        org: &str,
        name: &str,
        visibility: CodeVisibility,
        description: &str,
    ) -> Result<CreateOutcome> {
        (**self)
            .create_repo(org, name, visibility, description)
            .await
    }

    async fn set_archived(&self, org: &str, name: &str, archived: bool) -> Result<()> {
        (**self).set_archived(org, name, archived).await
    }

    async fn protect_branch(&self, org: &str, name: &str, branch: &str) -> Result<()> {
        (**self).protect_branch(org, name, branch).await
    }
}
