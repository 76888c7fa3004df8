//! Orgmirror CLI - mirror every repository of an organization.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::commands::status::OutputFormat;

#[derive(Parser)]
#[command(name = "orgmirror")]
#[command(version)]
#[command(about = "Mirror every repository of a source organization into destination organizations")]
#[command(
    long_about = "Orgmirror replicates all repositories of one source organization into \
several destination organizations. Progress is kept per (repository, destination) pair \
in a state store, so runs are idempotent and resumable. Repositories removed from the \
source are archived with a tombstone commit, never deleted."
)]
#[command(after_long_help = r#"EXAMPLES
    Mirror everything once:
        $ orgmirror run

    See what a run would do:
        $ orgmirror run --dry-run

    List pairs that need attention:
        $ orgmirror status --degraded

    Retry a degraded repository after fixing its cause:
        $ orgmirror reset api-gateway -d backup-eu

    Generate shell completions:
        $ orgmirror completions bash > ~/.local/share/bash-completion/completions/orgmirror

CONFIGURATION
    Orgmirror reads configuration from:
      1. ~/.config/orgmirror/config.toml (or $XDG_CONFIG_HOME/orgmirror/config.toml)
      2. ./orgmirror.toml, or the file given with --config
      3. Environment variables (ORGMIRROR__ prefix, e.g. ORGMIRROR__SOURCE_ORG)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    ORGMIRROR__DATABASE__URL             State store URL (default: ~/.local/state/orgmirror/orgmirror.db)
    ORGMIRROR__SOURCE_ORG                Source organization
    ORGMIRROR__CREDENTIALS__<NAME>       Token for the credential named <name>
    RUST_LOG                             Log filter (default: orgmirror=info,orgmirror_cli=info)
"#)]
struct Cli {
    /// Configuration file (default: ./orgmirror.toml)
    #[arg(short = 'C', long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Enumerate, reconcile and mirror every repository
    #[cfg(feature = "github")]
    Run {
        /// Show the worklist without executing it
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Pairs mirrored at once (default from config or 4)
        #[arg(short = 'c', long)]
        concurrency: Option<usize>,
    },
    /// Show stored state for every pair
    Status {
        /// Only show degraded pairs
        #[arg(long)]
        degraded: bool,

        /// Only show one destination
        #[arg(short = 'd', long)]
        destination: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Bring a tombstoned repository back so the next run recreates it
    Revive {
        /// Repository name in the source organization
        repo: String,

        /// Destination id (default: every tombstoned destination)
        #[arg(short = 'd', long)]
        destination: Option<String>,
    },
    /// Release a degraded repository for automatic retries
    Reset {
        /// Repository name in the source organization
        repo: String,

        /// Destination id (default: every degraded destination)
        #[arg(short = 'd', long)]
        destination: Option<String>,
    },
    /// Delete old tombstoned records from the state store
    Prune {
        /// Only records tombstoned more than this many days ago
        #[arg(long)]
        older_than_days: u32,

        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
    /// Fresh install - drop all tables and reapply migrations
    Fresh,
}

fn init_tracing(format: LogFormat) {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("orgmirror=info,orgmirror_cli=info"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Create the parent directory of a file-backed SQLite database.
fn prepare_sqlite_path(database_url: &str) -> std::io::Result<()> {
    let Some(db_path) = database_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    // Strip query parameters (e.g., ?mode=rwc) before path operations
    let db_path = db_path.split('?').next().unwrap_or(db_path);
    let db_path = std::path::Path::new(db_path);

    if db_path.is_relative() && !db_path.as_os_str().is_empty() {
        tracing::warn!(
            "Database path '{}' is relative - behavior depends on current directory. \
             Consider using an absolute path.",
            db_path.display()
        );
    }

    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.log_format);

    if let Commands::Completions { shell } = &cli.command {
        commands::completions::handle_completions(*shell)?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = config::Config::load(cli.config.as_deref())?;
    let database_url = config
        .database_url()
        .ok_or("Could not determine a database URL; set database.url")?;
    prepare_sqlite_path(&database_url)?;

    match cli.command {
        #[cfg(feature = "github")]
        Commands::Run {
            dry_run,
            concurrency,
        } => {
            let shutdown = shutdown::setup_shutdown_handler();
            let summary = commands::run::handle_run(
                &config,
                &database_url,
                commands::run::RunOverrides {
                    dry_run,
                    concurrency,
                },
                cli.log_format == LogFormat::Json,
                shutdown,
            )
            .await?;
            if !summary.dry_run && !summary.is_clean() {
                return Ok(ExitCode::from(2));
            }
        }
        Commands::Status {
            degraded,
            destination,
            output,
        } => {
            commands::status::handle_status(
                &database_url,
                degraded,
                destination.as_deref(),
                output,
            )
            .await?;
        }
        Commands::Revive { repo, destination } => {
            commands::operator::handle_revive(&database_url, &repo, destination.as_deref()).await?;
        }
        Commands::Reset { repo, destination } => {
            commands::operator::handle_reset(&database_url, &repo, destination.as_deref()).await?;
        }
        Commands::Prune {
            older_than_days,
            yes,
        } => {
            commands::operator::handle_prune(&database_url, older_than_days, yes).await?;
        }
        Commands::Migrate { action } => {
            commands::migrate::handle_migrate(action, &database_url).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(ExitCode::SUCCESS)
}
