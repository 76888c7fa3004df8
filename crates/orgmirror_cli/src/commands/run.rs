use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use console::style;
use orgmirror::git::{GitCli, RefTransport};
use orgmirror::github::GitHubClient;
use orgmirror::mirror::{DestinationAdapter, RunCoordinator, RunSummary, SourceAccess};
use orgmirror::platform::{Credential, HostClient};

use crate::config::{Config, MirrorConfig};
use crate::progress::{LoggingReporter, progress_callback};

/// Flags that override configuration for one run.
#[derive(Debug, Clone, Default)]
pub(crate) struct RunOverrides {
    pub dry_run: bool,
    pub concurrency: Option<usize>,
}

fn apply(mut resolved: MirrorConfig, overrides: &RunOverrides) -> MirrorConfig {
    if let Some(concurrency) = overrides.concurrency {
        resolved.options.max_concurrency = concurrency.max(1);
    }
    resolved.options.dry_run = overrides.dry_run;
    resolved
}

fn github_client(
    credential: &Credential,
    resolved: &MirrorConfig,
) -> Result<Arc<dyn HostClient>, Box<dyn std::error::Error>> {
    let client = GitHubClient::new(credential, resolved.api_url.as_deref())?
        .with_call_timeout(resolved.options.call_timeout);
    Ok(Arc::new(client))
}

/// Run one mirror pass and print its summary.
pub(crate) async fn handle_run(
    config: &Config,
    database_url: &str,
    overrides: RunOverrides,
    json: bool,
    shutdown: Arc<AtomicBool>,
) -> Result<RunSummary, Box<dyn std::error::Error>> {
    let resolved = apply(config.resolve()?, &overrides);
    let db = orgmirror::connect_and_migrate(database_url).await?;

    let call_timeout = resolved.options.call_timeout;
    let transport: Arc<dyn RefTransport> = Arc::new(GitCli::new(call_timeout));

    let source = SourceAccess::new(
        resolved.options.source_org.clone(),
        github_client(&resolved.source_credential, &resolved)?,
        Arc::clone(&transport),
        Some(resolved.source_credential.clone()),
        call_timeout,
    );

    let mut destinations = Vec::with_capacity(resolved.destinations.len());
    for dest in &resolved.destinations {
        destinations.push(DestinationAdapter::new(
            dest.destination.clone(),
            github_client(&dest.credential, &resolved)?,
            Arc::clone(&transport),
            Some(dest.credential.clone()),
            &resolved.options.work_root,
            call_timeout,
            resolved.options.requests_per_second,
        ));
    }

    let coordinator =
        RunCoordinator::new(db, source, destinations, resolved.options).with_shutdown(shutdown);

    let callback = progress_callback(Arc::new(LoggingReporter::new()));
    let summary = coordinator.run(Some(&callback)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(summary)
}

#[derive(Debug, Clone, tabled::Tabled)]
struct PlannedRow {
    #[tabled(rename = "Repository")]
    repo: String,
    #[tabled(rename = "Destination")]
    destination: String,
    #[tabled(rename = "Transition")]
    transition: String,
}

#[derive(Debug, Clone, tabled::Tabled)]
struct DegradedRow {
    #[tabled(rename = "Repository")]
    repo: String,
    #[tabled(rename = "Destination")]
    destination: String,
    #[tabled(rename = "Error")]
    error_kind: String,
    #[tabled(rename = "Failures")]
    failures: i32,
    #[tabled(rename = "Message")]
    message: String,
}

fn counts(summary: &RunSummary) -> Vec<(&'static str, usize)> {
    vec![
        ("created", summary.created),
        ("synced (changed)", summary.synced_changed),
        ("synced (no-op)", summary.synced_noop),
        ("tombstoned", summary.tombstoned),
        ("failed this run", summary.failed_this_run),
        ("degraded", summary.degraded),
        ("deferred", summary.deferred),
        ("suspended", summary.suspended),
        ("in flight", summary.in_flight),
        ("orphaned", summary.orphaned),
        ("tombstoned, source back", summary.tombstoned_reappeared),
        ("cancelled", summary.skipped_cancelled),
    ]
}

fn print_summary(summary: &RunSummary) {
    if summary.dry_run {
        println!("{}", style("Dry run: nothing was changed.").yellow().bold());
        if summary.planned.is_empty() {
            println!("No transitions required.");
        } else {
            let rows: Vec<PlannedRow> = summary
                .planned
                .iter()
                .map(|p| PlannedRow {
                    repo: p.repo.clone(),
                    destination: p.destination.clone(),
                    transition: p.transition.to_string(),
                })
                .collect();
            let mut table = tabled::Table::new(rows);
            table.with(tabled::settings::Style::rounded());
            println!("{table}");
        }
    }

    let heading = if summary.is_clean() {
        style("Mirror run complete").green().bold()
    } else {
        style("Mirror run complete with failures").red().bold()
    };
    println!("{heading}");
    for (label, count) in counts(summary).into_iter().filter(|(_, n)| *n > 0) {
        println!("  {label:<24} {count}");
    }

    if !summary.degraded_pairs.is_empty() {
        println!("{}", style("Degraded pairs (need attention):").red());
        let rows: Vec<DegradedRow> = summary
            .degraded_pairs
            .iter()
            .map(|d| DegradedRow {
                repo: d.repo.clone(),
                destination: d.destination.clone(),
                error_kind: d.error_kind.map(|k| k.to_string()).unwrap_or_default(),
                failures: d.failure_count,
                message: d.message.clone().unwrap_or_default(),
            })
            .collect();
        let mut table = tabled::Table::new(rows);
        table.with(tabled::settings::Style::rounded());
        println!("{table}");
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use orgmirror::mirror::{Destination, MirrorOptions};

    use super::*;
    use crate::config::ResolvedDestination;

    fn resolved() -> MirrorConfig {
        MirrorConfig {
            options: MirrorOptions::new("acme", PathBuf::from("/tmp/work")),
            source_credential: Credential::new("ghp_source"),
            destinations: vec![ResolvedDestination {
                destination: Destination::new("x", "acme-x"),
                credential: Credential::new("ghp_x"),
            }],
            api_url: None,
        }
    }

    #[test]
    fn overrides_replace_concurrency_and_dry_run() {
        let out = apply(
            resolved(),
            &RunOverrides {
                dry_run: true,
                concurrency: Some(12),
            },
        );
        assert!(out.options.dry_run);
        assert_eq!(out.options.max_concurrency, 12);
    }

    #[test]
    fn zero_concurrency_override_is_clamped() {
        let out = apply(
            resolved(),
            &RunOverrides {
                dry_run: false,
                concurrency: Some(0),
            },
        );
        assert_eq!(out.options.max_concurrency, 1);
    }

    #[test]
    fn summary_counts_cover_every_bucket() {
        let summary = RunSummary {
            created: 1,
            degraded: 2,
            ..RunSummary::default()
        };
        let counts = counts(&summary);
        assert_eq!(counts.len(), 12);
        assert!(counts.contains(&("created", 1)));
        assert!(counts.contains(&("degraded", 2)));
        print_summary(&summary);
    }
}
