use sea_orm_migration::{prelude::*, schema::*};

use crate::m20250601_000001_create_account_table::Account;

#[derive(DeriveMigrationName)]
pub struct Migration;

const IDX_ACCOUNT: &str = "idx-scan_state-account_id";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ScanState::Table)
                    .if_not_exists()
                    .col(uuid(ScanState::Id).primary_key())
                    .col(string(ScanState::AccountId).not_null())
                    .col(json_binary(ScanState::Config).not_null())
                    .col(string(ScanState::Status).not_null())
                    .col(integer(ScanState::ProcessedCount).default(0).not_null())
                    .col(integer(ScanState::SkippedCount).default(0).not_null())
                    .col(integer(ScanState::FailedCount).default(0).not_null())
                    .col(integer_null(ScanState::TotalEstimate))
                    .col(string_null(ScanState::LastProcessedEmailId))
                    .col(string_null(ScanState::NextPageToken))
                    .col(
                        integer(ScanState::ConsecutiveTransportFailures)
                            .default(0)
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(ScanState::StartedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(ScanState::LastUpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(text_null(ScanState::Error))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-scan_state-account_id")
                            .from(ScanState::Table, ScanState::AccountId)
                            .to(Account::Table, Account::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name(IDX_ACCOUNT)
                    .table(ScanState::Table)
                    .col(ScanState::AccountId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name(IDX_ACCOUNT).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ScanState::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ScanState {
    Table,
    Id,
    AccountId,
    Config,
    Status,
    ProcessedCount,
    SkippedCount,
    FailedCount,
    TotalEstimate,
    LastProcessedEmailId,
    NextPageToken,
    ConsecutiveTransportFailures,
    StartedAt,
    LastUpdatedAt,
    Error,
}
