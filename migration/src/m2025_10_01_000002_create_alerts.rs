//! Migration to create the alerts table.
//!
//! Alerts are append-only records written by the ingestion cycle. The unique
//! index on (device_id, trigger_type, sampled_at) backs the deduplication
//! contract at the store layer.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alerts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alerts::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Alerts::EntryId).big_integer().null())
                    .col(ColumnDef::new(Alerts::DeviceId).text().not_null())
                    .col(ColumnDef::new(Alerts::TriggerType).text().not_null())
                    .col(ColumnDef::new(Alerts::Smoke1).double().not_null())
                    .col(ColumnDef::new(Alerts::Smoke2).double().not_null())
                    .col(ColumnDef::new(Alerts::Flame1).double().not_null())
                    .col(ColumnDef::new(Alerts::Flame2).double().not_null())
                    .col(ColumnDef::new(Alerts::Threshold).double().not_null())
                    .col(
                        ColumnDef::new(Alerts::SampledAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alerts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_alerts_dedupe_key")
                    .table(Alerts::Table)
                    .col(Alerts::DeviceId)
                    .col(Alerts::TriggerType)
                    .col(Alerts::SampledAt)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Newest-first listing and the recent-history window both scan by sampled_at DESC
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_alerts_sampled_at ON alerts (sampled_at DESC, id DESC)".to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_alerts_sampled_at").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_alerts_dedupe_key").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Alerts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Alerts {
    Table,
    Id,
    EntryId,
    DeviceId,
    TriggerType,
    Smoke1,
    Smoke2,
    Flame1,
    Flame2,
    Threshold,
    SampledAt,
    CreatedAt,
}
