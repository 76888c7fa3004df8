use clap::ValueEnum;
use orgmirror::entity::sync_state::Model as SyncStateModel;
use orgmirror::entity::sync_status::SyncStatus;
use orgmirror::state;

/// Output format for status display.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

#[derive(Debug, Clone, tabled::Tabled)]
struct StatusRow {
    #[tabled(rename = "Repository")]
    repo: String,
    #[tabled(rename = "Destination")]
    destination: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Failures")]
    failures: i32,
    #[tabled(rename = "Last Error")]
    last_error: String,
    #[tabled(rename = "Last Success")]
    last_success: String,
    #[tabled(rename = "Next Attempt")]
    next_attempt: String,
}

fn timestamp(at: Option<chrono::DateTime<chrono::FixedOffset>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

impl From<&SyncStateModel> for StatusRow {
    fn from(model: &SyncStateModel) -> Self {
        let last_error = match (&model.last_error_kind, &model.last_error_message) {
            (Some(kind), Some(message)) => format!("{kind}: {message}"),
            (Some(kind), None) => kind.to_string(),
            _ => "-".to_string(),
        };
        Self {
            repo: model.repo_name.clone(),
            destination: model.destination.clone(),
            status: model.status.to_string(),
            failures: model.failure_count,
            last_error,
            last_success: timestamp(model.last_success_at),
            next_attempt: timestamp(model.next_attempt_at),
        }
    }
}

/// Show stored pair state.
pub(crate) async fn handle_status(
    database_url: &str,
    degraded_only: bool,
    destination: Option<&str>,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = orgmirror::connect_and_migrate(database_url).await?;

    let mut records = match (degraded_only, destination) {
        (true, _) => state::list_by_status(&db, SyncStatus::Degraded).await?,
        (false, Some(dest)) => state::list_by_destination(&db, dest).await?,
        (false, None) => state::list_all(&db).await?,
    };
    if let Some(dest) = destination {
        records.retain(|r| r.destination == dest);
    }

    match output {
        OutputFormat::Table => {
            if records.is_empty() {
                println!("No pairs recorded.");
                return Ok(());
            }
            let rows: Vec<StatusRow> = records.iter().map(StatusRow::from).collect();
            let mut table = tabled::Table::new(rows);
            table.with(tabled::settings::Style::rounded());
            println!("{table}");
            println!("{}", status_counts(&records));
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    Ok(())
}

/// One-line tally by status, e.g. `3 synced, 1 degraded`.
fn status_counts(records: &[SyncStateModel]) -> String {
    let mut counts: std::collections::BTreeMap<String, usize> = Default::default();
    for record in records {
        *counts.entry(record.status.to_string()).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(status, n)| format!("{n} {status}"))
        .collect::<Vec<_>>()
        .join(", ")
}
