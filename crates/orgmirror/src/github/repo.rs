//! Organization listing.

use std::collections::BTreeMap;
use std::time::Duration;

use octocrab::Octocrab;
use octocrab::models::Repository as GitHubRepo;

use super::convert::to_host_repo;
use super::error::map_octocrab_error;
use crate::mirror::{MirrorProgress, ProgressCallback, emit};
use crate::platform::{self, HostRepo, PlatformError, RepoListing, short_error_message, with_timeout};
use crate::retry::with_retry;

/// Repositories per page (GitHub's maximum).
pub const PAGE_SIZE: u8 = 100;

/// Repository count GitHub advertises for an organization.
///
/// `None` when the credential cannot see the private count; a listing can
/// then only be checked page by page.
pub async fn expected_repo_count(client: &Octocrab, org: &str) -> platform::Result<Option<usize>> {
    let org_data: serde_json::Value = client
        .get(format!("/orgs/{org}"), None::<&()>)
        .await
        .map_err(|e| map_octocrab_error(e, &format!("org {org}")))?;

    let public = org_data.get("public_repos").and_then(|v| v.as_u64());
    let private = org_data.get("total_private_repos").and_then(|v| v.as_u64());

    Ok(match (public, private) {
        (Some(public), Some(private)) => Some((public + private) as usize),
        _ => None,
    })
}

/// List every repository of an organization.
///
/// Pages are fetched until a short page. Each page is retried on rate limits
/// and transient failures; repositories are keyed by name, so a retried or
/// shifted page never yields a duplicate.
pub async fn list_org_repos(
    client: &Octocrab,
    org: &str,
    call_timeout: Duration,
    on_progress: Option<&ProgressCallback>,
) -> platform::Result<RepoListing> {
    let expected_total =
        with_timeout("get_org", call_timeout, expected_repo_count(client, org)).await?;

    emit(
        on_progress,
        MirrorProgress::EnumeratingSource {
            org: org.to_string(),
            expected_total,
        },
    );

    let mut seen: BTreeMap<String, HostRepo> = BTreeMap::new();
    let mut page = 1u32;

    loop {
        let target = format!("{org} page {page}");
        let fetched = with_retry(
            move || async move {
                let request = async {
                    client
                        .orgs(org)
                        .list_repos()
                        .per_page(PAGE_SIZE)
                        .page(page)
                        .send()
                        .await
                        .map_err(|e| map_octocrab_error(e, &format!("org {org}")))
                };
                with_timeout("list_org_repos", call_timeout, request).await
            },
            PlatformError::is_retryable,
            |e: &PlatformError| short_error_message(e),
            &target,
            on_progress,
        )
        .await?;

        let repos: Vec<GitHubRepo> = fetched.items;
        let count = repos.len();
        for repo in &repos {
            let host_repo = to_host_repo(repo);
            seen.insert(host_repo.name.clone(), host_repo);
        }

        emit(
            on_progress,
            MirrorProgress::FetchedPage {
                org: org.to_string(),
                page,
                count,
                total_so_far: seen.len(),
            },
        );

        if count < PAGE_SIZE as usize {
            break;
        }
        page += 1;
    }

    tracing::debug!(org, total = seen.len(), ?expected_total, "Listed organization");

    Ok(RepoListing {
        repos: seen.into_values().collect(),
        expected_total,
    })
}
