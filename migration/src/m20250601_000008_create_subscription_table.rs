use sea_orm_migration::{prelude::*, schema::*};

use crate::m20250601_000001_create_account_table::Account;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Subscription::Table)
                    .if_not_exists()
                    .col(string(Subscription::AccountId).primary_key())
                    .col(string(Subscription::ProviderTopic).not_null())
                    .col(timestamp_with_time_zone(Subscription::ExpiresAt).not_null())
                    .col(big_integer(Subscription::LastHistoryId).not_null())
                    .col(timestamp_with_time_zone_null(
                        Subscription::LastNotificationAt,
                    ))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-subscription-account_id")
                            .from(Subscription::Table, Subscription::AccountId)
                            .to(Account::Table, Account::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Subscription::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Subscription {
    Table,
    AccountId,
    ProviderTopic,
    ExpiresAt,
    LastHistoryId,
    LastNotificationAt,
}
