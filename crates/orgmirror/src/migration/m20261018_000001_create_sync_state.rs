//! Initial migration: per-pair sync state and its transition history.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_sync_states(manager).await?;
        self.create_sync_transitions(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncTransitions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SyncStates::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    async fn create_sync_states(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncStates::Table)
                    .if_not_exists()
                    // Identity
                    .col(ColumnDef::new(SyncStates::RepoName).string().not_null())
                    .col(ColumnDef::new(SyncStates::Destination).string().not_null())
                    .primary_key(
                        Index::create()
                            .col(SyncStates::RepoName)
                            .col(SyncStates::Destination),
                    )
                    // Lifecycle
                    .col(
                        ColumnDef::new(SyncStates::Status)
                            .string()
                            .not_null()
                            .default("absent"),
                    )
                    .col(
                        ColumnDef::new(SyncStates::LastSourceCommitMarker)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(SyncStates::PendingTransition).string().null())
                    // Attempts
                    .col(
                        ColumnDef::new(SyncStates::LastAttemptAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncStates::LastSuccessAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncStates::FailureCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(SyncStates::LastErrorKind).string().null())
                    .col(ColumnDef::new(SyncStates::LastErrorMessage).text().null())
                    .col(
                        ColumnDef::new(SyncStates::NextAttemptAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    // Source facts
                    .col(
                        ColumnDef::new(SyncStates::DefaultBranch)
                            .string()
                            .not_null()
                            .default("main"),
                    )
                    .col(
                        ColumnDef::new(SyncStates::Visibility)
                            .string()
                            .not_null()
                            .default("private"),
                    )
                    .col(
                        ColumnDef::new(SyncStates::ProtectionAttemptedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncStates::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_states_destination")
                    .table(SyncStates::Table)
                    .col(SyncStates::Destination)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_states_status")
                    .table(SyncStates::Table)
                    .col(SyncStates::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_sync_transitions(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncTransitions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncTransitions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncTransitions::RepoName).string().not_null())
                    .col(
                        ColumnDef::new(SyncTransitions::Destination)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SyncTransitions::Action).string().not_null())
                    .col(ColumnDef::new(SyncTransitions::FromStatus).string().null())
                    .col(ColumnDef::new(SyncTransitions::ToStatus).string().not_null())
                    .col(ColumnDef::new(SyncTransitions::ErrorKind).string().null())
                    .col(ColumnDef::new(SyncTransitions::Message).text().null())
                    .col(
                        ColumnDef::new(SyncTransitions::RecordedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Composite index on (repo_name, destination) for per-pair history
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_transitions_pair")
                    .table(SyncTransitions::Table)
                    .col(SyncTransitions::RepoName)
                    .col(SyncTransitions::Destination)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
#[sea_orm(iden = "sync_states")]
enum SyncStates {
    Table,
    RepoName,
    Destination,
    Status,
    LastSourceCommitMarker,
    PendingTransition,
    LastAttemptAt,
    LastSuccessAt,
    FailureCount,
    LastErrorKind,
    LastErrorMessage,
    NextAttemptAt,
    DefaultBranch,
    Visibility,
    ProtectionAttemptedAt,
    Version,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "sync_transitions")]
enum SyncTransitions {
    Table,
    Id,
    RepoName,
    Destination,
    Action,
    FromStatus,
    ToStatus,
    ErrorKind,
    Message,
    RecordedAt,
}
