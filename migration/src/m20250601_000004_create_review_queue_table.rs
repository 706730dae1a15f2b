use sea_orm_migration::{prelude::*, schema::*};

use crate::m20250601_000002_create_processed_email_table::ProcessedEmail;

#[derive(DeriveMigrationName)]
pub struct Migration;

const IDX_STATUS_ORDER: &str = "idx-review_queue_item-status-importance-added_at";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ReviewQueueItem::Table)
                    .if_not_exists()
                    .col(pk_auto(ReviewQueueItem::Id))
                    .col(string(ReviewQueueItem::AccountId).not_null())
                    .col(string(ReviewQueueItem::EmailId).not_null())
                    .col(integer(ReviewQueueItem::ProcessedEmailId).not_null())
                    .col(string(ReviewQueueItem::SuggestedCategory).not_null())
                    .col(float(ReviewQueueItem::Importance).not_null())
                    .col(float(ReviewQueueItem::Confidence).not_null())
                    .col(text(ReviewQueueItem::Reasoning).not_null())
                    .col(
                        boolean(ReviewQueueItem::LowConfidence)
                            .default(false)
                            .not_null(),
                    )
                    .col(
                        string(ReviewQueueItem::Status)
                            .default("pending")
                            .not_null(),
                    )
                    .col(string_null(ReviewQueueItem::UserCorrectedCategory))
                    .col(text_null(ReviewQueueItem::UserFeedbackText))
                    .col(
                        timestamp_with_time_zone(ReviewQueueItem::AddedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(timestamp_with_time_zone_null(ReviewQueueItem::ReviewedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-review_queue_item-processed_email_id")
                            .from(ReviewQueueItem::Table, ReviewQueueItem::ProcessedEmailId)
                            .to(ProcessedEmail::Table, ProcessedEmail::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name(IDX_STATUS_ORDER)
                    .table(ReviewQueueItem::Table)
                    .col(ReviewQueueItem::AccountId)
                    .col(ReviewQueueItem::Status)
                    .col(ReviewQueueItem::Importance)
                    .col(ReviewQueueItem::AddedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name(IDX_STATUS_ORDER).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ReviewQueueItem::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ReviewQueueItem {
    Table,
    Id,
    AccountId,
    EmailId,
    ProcessedEmailId,
    SuggestedCategory,
    Importance,
    Confidence,
    Reasoning,
    LowConfidence,
    Status,
    UserCorrectedCategory,
    UserFeedbackText,
    AddedAt,
    ReviewedAt,
}
