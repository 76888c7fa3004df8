//! Database connection utilities for the state store.

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};

/// Pragmas applied to file-backed SQLite databases.
///
/// WAL lets status readers run while a mirror run writes; the busy timeout
/// absorbs short lock contention between concurrent executors.
const SQLITE_PRAGMAS: [&str; 3] = [
    "PRAGMA journal_mode=WAL",
    "PRAGMA busy_timeout=5000",
    "PRAGMA synchronous=NORMAL",
];

async fn configure_sqlite(db: &DatabaseConnection) -> Result<(), DbErr> {
    for pragma in SQLITE_PRAGMAS {
        db.execute(Statement::from_string(
            db.get_database_backend(),
            pragma.to_string(),
        ))
        .await?;
    }
    Ok(())
}

fn is_file_sqlite(database_url: &str) -> bool {
    database_url.starts_with("sqlite://")
}

/// Establish a connection to the state database.
///
/// File-backed SQLite databases are switched to WAL mode with a 5 second
/// busy timeout.
///
/// # Arguments
/// * `database_url` - e.g. `sqlite:///var/lib/orgmirror/state.db?mode=rwc` or `postgres:///orgmirror`
///
/// # Errors
/// Returns `DbErr` if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(database_url).await?;

    if is_file_sqlite(database_url) {
        configure_sqlite(&db).await?;
    }

    Ok(db)
}

/// Establish a connection and apply all pending migrations.
///
/// # Errors
/// Returns `DbErr` if the connection cannot be established or migrations fail.
#[cfg(feature = "migrate")]
pub async fn connect_and_migrate(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    use sea_orm_migration::MigratorTrait;

    let db = connect(database_url).await?;
    crate::migration::Migrator::up(&db, None).await?;
    Ok(db)
}
