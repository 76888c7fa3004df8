//! Conversion from GitHub API types to host-agnostic records.

use octocrab::models::Repository as GitHubRepo;

use crate::entity::code_visibility::CodeVisibility;
use crate::platform::HostRepo;

/// Fallback when GitHub omits the default branch (empty repositories).
const FALLBACK_BRANCH: &str = "main";

/// Determine visibility from a GitHub repository.
///
/// GitHub can return "public", "private", or "internal" (Enterprise only).
fn github_visibility(repo: &GitHubRepo) -> CodeVisibility {
    match repo.visibility.as_deref() {
        Some("internal") => CodeVisibility::Internal,
        Some("public") => CodeVisibility::Public,
        Some("private") => CodeVisibility::Private,
        _ if repo.private.unwrap_or(true) => CodeVisibility::Private,
        _ => CodeVisibility::Public,
    }
}

/// Convert a GitHub repository to a `HostRepo`.
pub fn to_host_repo(repo: &GitHubRepo) -> HostRepo {
    HostRepo {
        name: repo.name.clone(),
        default_branch: repo
            .default_branch
            .clone()
            .unwrap_or_else(|| FALLBACK_BRANCH.to_string()),
        visibility: github_visibility(repo),
        is_archived: repo.archived.unwrap_or(false),
    }
}
