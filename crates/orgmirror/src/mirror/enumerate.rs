//! Source enumeration. Fails closed.
//!
//! A listing that errors, or that is shorter than the count the host
//! advertises, is rejected as a whole: downstream, a missing repository means
//! "soft-delete it", so a partial inventory must never reach the reconciler.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::platform::{HostRepo, short_error_message, with_timeout};

use super::adapter::SourceAccess;
use super::errors::EnumerationError;
use super::progress::{MirrorProgress, ProgressCallback, emit};
use super::types::RepositoryRecord;

/// List the source organization and compute ref markers.
///
/// Returns each repository exactly once, sorted by name. Marker failures
/// leave `source_marker` empty and never fail the enumeration.
pub async fn enumerate_source(
    source: &SourceAccess,
    marker_concurrency: usize,
    on_progress: Option<&ProgressCallback>,
) -> Result<Vec<RepositoryRecord>, EnumerationError> {
    let org = source.org();

    let listing = source
        .client()
        .list_org_repos(org, on_progress)
        .await
        .map_err(|e| {
            tracing::error!(org, error = %e, "Source listing failed");
            EnumerationError::unavailable(org, short_error_message(&e))
        })?;

    let listed = listing.repos.len();
    let mut unique: BTreeMap<String, HostRepo> = BTreeMap::new();
    for repo in listing.repos {
        unique.insert(repo.name.clone(), repo);
    }
    if unique.len() != listed {
        tracing::debug!(org, listed, unique = unique.len(), "Dropped duplicate listing entries");
    }

    if let Some(expected) = listing.expected_total
        && unique.len() < expected
    {
        tracing::error!(org, listed = unique.len(), expected, "Source listing truncated");
        return Err(EnumerationError::unavailable(
            org,
            format!("listing returned {} of {expected} repositories", unique.len()),
        ));
    }

    let markers = compute_markers(source, unique.keys().cloned().collect(), marker_concurrency).await;
    let unmarked = unique.len() - markers.len();

    let records: Vec<RepositoryRecord> = unique
        .into_values()
        .map(|repo| {
            let marker = markers.get(&repo.name).cloned();
            RepositoryRecord::from_host(repo, marker)
        })
        .collect();

    emit(
        on_progress,
        MirrorProgress::EnumerationComplete {
            org: org.to_string(),
            total: records.len(),
            unmarked,
        },
    );
    tracing::info!(org, total = records.len(), unmarked, "Source enumerated");

    Ok(records)
}

/// `ls-remote` every repository with bounded concurrency.
///
/// Only successful digests are returned.
async fn compute_markers(
    source: &SourceAccess,
    names: Vec<String>,
    concurrency: usize,
) -> BTreeMap<String, String> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for name in names {
        let semaphore = Arc::clone(&semaphore);
        let transport = source.transport();
        let remote = source.remote(&name);
        let timeout = source.call_timeout();

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return (name, None);
            };
            match with_timeout("ls_remote", timeout, transport.ls_remote(&remote)).await {
                Ok(refs) => (name, Some(refs.marker())),
                Err(e) => {
                    tracing::warn!(repo = %name, error = %e, "Could not compute source marker");
                    (name, None)
                }
            }
        });
    }

    let mut markers = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((name, Some(marker))) => {
                markers.insert(name, marker);
            }
            Ok((_, None)) => {}
            Err(e) => tracing::warn!(error = %e, "Marker task panicked"),
        }
    }
    markers
}
