use console::style;
use orgmirror::db;
use orgmirror::migration::{Migrator, MigratorTrait};

use crate::MigrateAction;

pub(crate) async fn handle_migrate(
    action: MigrateAction,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = db::connect(database_url).await?;

    match action {
        MigrateAction::Up => {
            let pending = Migrator::get_pending_migrations(&db).await?.len();
            Migrator::up(&db, None).await?;
            println!("{} {pending} migration(s) applied.", style("Done:").green());
        }
        MigrateAction::Down => {
            Migrator::down(&db, Some(1)).await?;
            println!("{} rolled back the last migration.", style("Done:").green());
        }
        MigrateAction::Status => {
            for migration in Migrator::get_migration_with_status(&db).await? {
                println!("{:<48} {}", migration.name(), migration.status());
            }
        }
        MigrateAction::Fresh => {
            println!(
                "{} dropping the state store and reapplying migrations",
                style("Warning:").yellow()
            );
            Migrator::fresh(&db).await?;
            println!("{} schema recreated.", style("Done:").green());
        }
    }

    Ok(())
}
