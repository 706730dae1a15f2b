use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

const IDX_ACCOUNT_TS: &str = "idx-event-account_id-timestamp";
const IDX_EMAIL: &str = "idx-event-account_id-email_id";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Event::Table)
                    .if_not_exists()
                    .col(big_integer(Event::Seq).auto_increment().primary_key())
                    .col(uuid_uniq(Event::EventId))
                    .col(string(Event::EventType).not_null())
                    .col(
                        timestamp_with_time_zone(Event::Timestamp)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(string(Event::AccountId).not_null())
                    .col(string_null(Event::EmailId))
                    .col(string_null(Event::UserId))
                    .col(json_binary(Event::Payload).not_null())
                    .col(big_integer_null(Event::ProcessingTimeMs))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name(IDX_ACCOUNT_TS)
                    .table(Event::Table)
                    .col(Event::AccountId)
                    .col(Event::Timestamp)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name(IDX_EMAIL)
                    .table(Event::Table)
                    .col(Event::AccountId)
                    .col(Event::EmailId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name(IDX_ACCOUNT_TS).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name(IDX_EMAIL).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Event::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Event {
    Table,
    Seq,
    EventId,
    EventType,
    Timestamp,
    AccountId,
    EmailId,
    UserId,
    Payload,
    ProcessingTimeMs,
}
