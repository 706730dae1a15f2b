use sea_orm_migration::{prelude::*, schema::*};

use crate::m20250601_000001_create_account_table::Account;

#[derive(DeriveMigrationName)]
pub struct Migration;

const IDX_ACCOUNT_EMAIL: &str = "idx-processed_email-account_id-email_id";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProcessedEmail::Table)
                    .if_not_exists()
                    .col(pk_auto(ProcessedEmail::Id))
                    .col(string(ProcessedEmail::AccountId).not_null())
                    .col(string(ProcessedEmail::EmailId).not_null())
                    .col(string_null(ProcessedEmail::ThreadId))
                    .col(string(ProcessedEmail::Subject).not_null())
                    .col(string(ProcessedEmail::Sender).not_null())
                    .col(string(ProcessedEmail::SenderDomain).not_null())
                    .col(timestamp_with_time_zone(ProcessedEmail::ReceivedAt).not_null())
                    .col(string(ProcessedEmail::Category).not_null())
                    .col(float(ProcessedEmail::ImportanceScore).not_null())
                    .col(float(ProcessedEmail::ClassificationConfidence).not_null())
                    .col(json_binary(ProcessedEmail::LayerTrace).not_null())
                    .col(string(ProcessedEmail::StorageLevel).not_null())
                    .col(text_null(ProcessedEmail::BodyText))
                    .col(text_null(ProcessedEmail::BodyHtml))
                    .col(text_null(ProcessedEmail::Summary))
                    .col(integer_null(ProcessedEmail::ThreadPosition))
                    .col(boolean(ProcessedEmail::HasAttachments).not_null())
                    .col(json_binary_null(ProcessedEmail::AttachmentMetadata))
                    .col(
                        boolean(ProcessedEmail::UserCorrected)
                            .default(false)
                            .not_null(),
                    )
                    .col(string_null(ProcessedEmail::OriginalCategory))
                    .col(
                        timestamp_with_time_zone(ProcessedEmail::ProcessedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-processed_email-account_id")
                            .from(ProcessedEmail::Table, ProcessedEmail::AccountId)
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
                    .name(IDX_ACCOUNT_EMAIL)
                    .table(ProcessedEmail::Table)
                    .col(ProcessedEmail::AccountId)
                    .col(ProcessedEmail::EmailId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name(IDX_ACCOUNT_EMAIL).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ProcessedEmail::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ProcessedEmail {
    Table,
    Id,
    AccountId,
    EmailId,
    ThreadId,
    Subject,
    Sender,
    SenderDomain,
    ReceivedAt,
    Category,
    ImportanceScore,
    ClassificationConfidence,
    LayerTrace,
    StorageLevel,
    BodyText,
    BodyHtml,
    Summary,
    ThreadPosition,
    HasAttachments,
    AttachmentMetadata,
    UserCorrected,
    OriginalCategory,
    ProcessedAt,
}
