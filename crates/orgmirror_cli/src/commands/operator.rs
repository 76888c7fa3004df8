//! Operator commands: revive, reset and prune.

use chrono::{Duration, Utc};
use console::style;
use orgmirror::entity::sync_status::SyncStatus;
use orgmirror::state;
use sea_orm::DatabaseConnection;

/// Destinations to act on: the one given, or every record of `repo` in
/// `status`.
async fn targets(
    db: &DatabaseConnection,
    repo: &str,
    destination: Option<&str>,
    status: SyncStatus,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    if let Some(dest) = destination {
        return Ok(vec![dest.to_string()]);
    }
    let destinations: Vec<String> = state::find_by_repo(db, repo)
        .await?
        .into_iter()
        .filter(|record| record.status == status)
        .map(|record| record.destination)
        .collect();
    if destinations.is_empty() {
        return Err(format!("No {status} records for repository `{repo}`").into());
    }
    Ok(destinations)
}

/// Return tombstoned pairs to `absent` so the next run recreates them.
pub(crate) async fn handle_revive(
    database_url: &str,
    repo: &str,
    destination: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = orgmirror::connect_and_migrate(database_url).await?;
    for dest in targets(&db, repo, destination, SyncStatus::Tombstoned).await? {
        let record = state::revive(&db, repo, &dest).await?;
        println!(
            "{} {} is now {}",
            style("Revived").green(),
            record.pair_label(),
            record.status
        );
    }
    Ok(())
}

/// Release degraded pairs for automatic retries.
pub(crate) async fn handle_reset(
    database_url: &str,
    repo: &str,
    destination: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = orgmirror::connect_and_migrate(database_url).await?;
    for dest in targets(&db, repo, destination, SyncStatus::Degraded).await? {
        let record = state::reset(&db, repo, &dest).await?;
        println!(
            "{} {} is now {}",
            style("Reset").green(),
            record.pair_label(),
            record.status
        );
    }
    Ok(())
}

/// Delete tombstoned records older than `older_than_days`.
pub(crate) async fn handle_prune(
    database_url: &str,
    older_than_days: u32,
    yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !yes {
        return Err("Refusing to delete records without --yes".into());
    }
    let db = orgmirror::connect_and_migrate(database_url).await?;
    let cutoff = Utc::now() - Duration::days(i64::from(older_than_days));
    let removed = state::prune_tombstoned(&db, cutoff).await?;
    println!(
        "Pruned {} tombstoned record(s) older than {} day(s).",
        style(removed).bold(),
        older_than_days
    );
    Ok(())
}
