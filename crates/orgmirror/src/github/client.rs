//! GitHub client creation and the `HostClient` implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use octocrab::Octocrab;
use url::Url;

use super::error::{map_octocrab_error, status_of};
use super::repo::list_org_repos;
use crate::entity::code_visibility::CodeVisibility;
use crate::mirror::ProgressCallback;
use crate::platform::{self, CreateOutcome, Credential, HostClient, PlatformError, RepoListing};

/// Public github.com endpoints.
pub const GITHUB_API_URL: &str = "https://api.github.com";
pub const GITHUB_WEB_URL: &str = "https://github.com";

/// Deadline for each listing request unless overridden.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Create an authenticated Octocrab instance.
///
/// `api_url` selects a GitHub Enterprise Server API root such as
/// `https://ghe.example.com/api/v3`.
pub fn create_client(
    credential: &Credential,
    api_url: Option<&str>,
) -> Result<Octocrab, PlatformError> {
    let mut builder = Octocrab::builder().personal_token(credential.expose().to_string());
    if let Some(api_url) = api_url {
        builder = builder
            .base_uri(api_url)
            .map_err(|e| PlatformError::internal(format!("invalid API URL {api_url}: {e}")))?;
    }
    builder
        .build()
        .map_err(|e| PlatformError::internal(format!("failed to build GitHub client: {e}")))
}

/// Web root for clone URLs, derived from the API root.
///
/// `https://api.github.com` maps to `https://github.com`; an Enterprise root
/// like `https://ghe.example.com/api/v3` maps to `https://ghe.example.com`.
pub fn web_url_for(api_url: Option<&str>) -> Result<String, PlatformError> {
    let Some(api_url) = api_url else {
        return Ok(GITHUB_WEB_URL.to_string());
    };
    if api_url.trim_end_matches('/') == GITHUB_API_URL {
        return Ok(GITHUB_WEB_URL.to_string());
    }
    let url = Url::parse(api_url)
        .map_err(|e| PlatformError::internal(format!("invalid API URL {api_url}: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| PlatformError::internal(format!("API URL {api_url} has no host")))?;
    Ok(match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    })
}

/// GitHub API client implementing the `HostClient` trait.
///
/// Bound to one credential. Clone is cheap.
#[derive(Clone)]
pub struct GitHubClient {
    inner: Arc<Octocrab>,
    web_url: String,
    host: String,
    call_timeout: Duration,
}

impl GitHubClient {
    /// Create a client for github.com or an Enterprise API root.
    pub fn new(credential: &Credential, api_url: Option<&str>) -> Result<Self, PlatformError> {
        let client = create_client(credential, api_url)?;
        let web_url = web_url_for(api_url)?;
        Ok(Self::from_octocrab(client, web_url))
    }

    /// Create a client from an existing Octocrab instance.
    pub fn from_octocrab(client: Octocrab, web_url: impl Into<String>) -> Self {
        let web_url = web_url.into().trim_end_matches('/').to_string();
        let host = Url::parse(&web_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| web_url.clone());
        Self {
            inner: Arc::new(client),
            web_url,
            host,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Set the deadline applied to each listing request.
    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }
}

#[async_trait]
impl HostClient for GitHubClient {
    fn host(&self) -> &str {
        &self.host
    }

    fn clone_url(&self, org: &str, name: &str) -> String {
        format!("{}/{org}/{name}.git", self.web_url)
    }

    async fn list_org_repos(
        &self,
        org: &str,
        on_progress: Option<&ProgressCallback>,
    ) -> platform::Result<RepoListing> {
        list_org_repos(&self.inner, org, self.call_timeout, on_progress).await
    }

    async fn repo_exists(&self, org: &str, name: &str) -> platform::Result<bool> {
        match self.inner.repos(org, name).get().await {
            Ok(_) => Ok(true),
            Err(e) if status_of(&e) == Some(404) => Ok(false),
            Err(e) => Err(map_octocrab_error(e, &format!("{org}/{name}"))),
        }
    }

    async fn create_repo(
        &self,
        org: &str,
        name: &str,
        visibility: CodeVisibility,
        description: &str,
    ) -> platform::Result<CreateOutcome> {
        let body = serde_json::json!({
            "name": name,
            "description": description,
            "visibility": visibility.to_string(),
            "private": visibility.is_private(),
            "has_issues": false,
            "has_wiki": false,
            "has_projects": false,
            "auto_init": false,
        });

        let result: Result<serde_json::Value, octocrab::Error> = self
            .inner
            .post(format!("/orgs/{org}/repos"), Some(&body))
            .await;

        match result {
            Ok(_) => {
                tracing::debug!(org, name, %visibility, "Created repository");
                Ok(CreateOutcome::Created)
            }
            // 422 "name already exists on this account"
            Err(e) if status_of(&e) == Some(422) => {
                tracing::debug!(org, name, "Repository already exists");
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(e) => Err(map_octocrab_error(e, &format!("org {org}"))),
        }
    }

    async fn set_archived(&self, org: &str, name: &str, archived: bool) -> platform::Result<()> {
        let body = serde_json::json!({ "archived": archived });
        let _: serde_json::Value = self
            .inner
            .patch(format!("/repos/{org}/{name}"), Some(&body))
            .await
            .map_err(|e| map_octocrab_error(e, &format!("{org}/{name}")))?;
        Ok(())
    }

    async fn protect_branch(&self, org: &str, name: &str, branch: &str) -> platform::Result<()> {
        let body = serde_json::json!({
            "required_status_checks": null,
            "enforce_admins": false,
            "required_pull_request_reviews": {
                "required_approving_review_count": 1,
            },
            "restrictions": null,
        });
        let _: serde_json::Value = self
            .inner
            .put(
                format!("/repos/{org}/{name}/branches/{branch}/protection"),
                Some(&body),
            )
            .await
            .map_err(|e| map_octocrab_error(e, &format!("{org}/{name}@{branch}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn web_url_defaults_to_github_com() {
        assert_eq!(web_url_for(None).unwrap(), "https://github.com");
        assert_eq!(
            web_url_for(Some("https://api.github.com/")).unwrap(),
            "https://github.com"
        );
    }

    #[test]
    fn web_url_strips_enterprise_api_path() {
        assert_eq!(
            web_url_for(Some("https://ghe.example.com/api/v3")).unwrap(),
            "https://ghe.example.com"
        );
        assert_eq!(
            web_url_for(Some("http://localhost:8080/api/v3")).unwrap(),
            "http://localhost:8080"
        );
    }

    #[test]
    fn web_url_rejects_garbage() {
        assert!(web_url_for(Some("not a url")).is_err());
    }

    #[tokio::test]
    async fn clone_url_uses_web_root() {
        let client = GitHubClient::new(
            &Credential::new("ghp_test"),
            Some("https://ghe.example.com/api/v3"),
        )
        .expect("client should build");
        assert_eq!(
            client.clone_url("dest", "api"),
            "https://ghe.example.com/dest/api.git"
        );
        assert_eq!(client.host(), "ghe.example.com");
    }
}
