use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

const IDX_SENDER_KEY: &str = "idx-sender_preference-account_id-sender_email";
const IDX_DOMAIN_KEY: &str = "idx-domain_preference-account_id-domain";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SenderPreference::Table)
                    .if_not_exists()
                    .col(pk_auto(SenderPreference::Id))
                    .col(string(SenderPreference::AccountId).not_null())
                    .col(string(SenderPreference::SenderEmail).not_null())
                    .col(integer(SenderPreference::EmailsSeen).default(0).not_null())
                    .col(integer(SenderPreference::Replies).default(0).not_null())
                    .col(integer(SenderPreference::Archives).default(0).not_null())
                    .col(integer(SenderPreference::Deletes).default(0).not_null())
                    .col(integer(SenderPreference::Stars).default(0).not_null())
                    .col(float(SenderPreference::ReplyRate).default(0.0).not_null())
                    .col(float(SenderPreference::ArchiveRate).default(0.0).not_null())
                    .col(float(SenderPreference::DeleteRate).default(0.0).not_null())
                    .col(
                        float(SenderPreference::InferredImportance)
                            .default(0.5)
                            .not_null(),
                    )
                    .col(
                        float(SenderPreference::ConfidenceBase)
                            .default(0.85)
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(SenderPreference::LastUpdated)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name(IDX_SENDER_KEY)
                    .table(SenderPreference::Table)
                    .col(SenderPreference::AccountId)
                    .col(SenderPreference::SenderEmail)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DomainPreference::Table)
                    .if_not_exists()
                    .col(pk_auto(DomainPreference::Id))
                    .col(string(DomainPreference::AccountId).not_null())
                    .col(string(DomainPreference::Domain).not_null())
                    .col(integer(DomainPreference::EmailsSeen).default(0).not_null())
                    .col(integer(DomainPreference::Replies).default(0).not_null())
                    .col(integer(DomainPreference::Archives).default(0).not_null())
                    .col(integer(DomainPreference::Deletes).default(0).not_null())
                    .col(integer(DomainPreference::Stars).default(0).not_null())
                    .col(float(DomainPreference::ReplyRate).default(0.0).not_null())
                    .col(float(DomainPreference::ArchiveRate).default(0.0).not_null())
                    .col(float(DomainPreference::DeleteRate).default(0.0).not_null())
                    .col(
                        float(DomainPreference::InferredImportance)
                            .default(0.5)
                            .not_null(),
                    )
                    .col(
                        float(DomainPreference::ConfidenceBase)
                            .default(0.75)
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(DomainPreference::LastUpdated)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name(IDX_DOMAIN_KEY)
                    .table(DomainPreference::Table)
                    .col(DomainPreference::AccountId)
                    .col(DomainPreference::Domain)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name(IDX_SENDER_KEY).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name(IDX_DOMAIN_KEY).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(SenderPreference::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DomainPreference::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum SenderPreference {
    Table,
    Id,
    AccountId,
    SenderEmail,
    EmailsSeen,
    Replies,
    Archives,
    Deletes,
    Stars,
    ReplyRate,
    ArchiveRate,
    DeleteRate,
    InferredImportance,
    ConfidenceBase,
    LastUpdated,
}

#[derive(DeriveIden)]
pub enum DomainPreference {
    Table,
    Id,
    AccountId,
    Domain,
    EmailsSeen,
    Replies,
    Archives,
    Deletes,
    Stars,
    ReplyRate,
    ArchiveRate,
    DeleteRate,
    InferredImportance,
    ConfidenceBase,
    LastUpdated,
}
