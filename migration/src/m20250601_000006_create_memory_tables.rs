use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ExtractedTask::Table)
                    .if_not_exists()
                    .col(pk_auto(ExtractedTask::Id))
                    .col(string(ExtractedTask::AccountId).not_null())
                    .col(string(ExtractedTask::EmailId).not_null())
                    .col(uuid(ExtractedTask::ExtractionEventId).not_null())
                    .col(text(ExtractedTask::Description).not_null())
                    .col(string_null(ExtractedTask::Deadline))
                    .col(string(ExtractedTask::Priority).not_null())
                    .col(boolean(ExtractedTask::RequiresActionFromMe).not_null())
                    .col(string_null(ExtractedTask::Assignee))
                    .col(string(ExtractedTask::Status).default("pending").not_null())
                    .col(text(ExtractedTask::SourceContext).not_null())
                    .col(
                        timestamp_with_time_zone(ExtractedTask::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ExtractedDecision::Table)
                    .if_not_exists()
                    .col(pk_auto(ExtractedDecision::Id))
                    .col(string(ExtractedDecision::AccountId).not_null())
                    .col(string(ExtractedDecision::EmailId).not_null())
                    .col(uuid(ExtractedDecision::ExtractionEventId).not_null())
                    .col(text(ExtractedDecision::Question).not_null())
                    .col(json_binary(ExtractedDecision::Options).not_null())
                    .col(text_null(ExtractedDecision::Recommendation))
                    .col(string(ExtractedDecision::Urgency).not_null())
                    .col(boolean(ExtractedDecision::RequiresMyInput).not_null())
                    .col(
                        string(ExtractedDecision::Status)
                            .default("pending")
                            .not_null(),
                    )
                    .col(string_null(ExtractedDecision::ChosenOption))
                    .col(text(ExtractedDecision::SourceContext).not_null())
                    .col(
                        timestamp_with_time_zone(ExtractedDecision::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ExtractedQuestion::Table)
                    .if_not_exists()
                    .col(pk_auto(ExtractedQuestion::Id))
                    .col(string(ExtractedQuestion::AccountId).not_null())
                    .col(string(ExtractedQuestion::EmailId).not_null())
                    .col(uuid(ExtractedQuestion::ExtractionEventId).not_null())
                    .col(text(ExtractedQuestion::Question).not_null())
                    .col(string(ExtractedQuestion::QuestionType).not_null())
                    .col(string(ExtractedQuestion::Urgency).not_null())
                    .col(boolean(ExtractedQuestion::RequiresResponse).not_null())
                    .col(
                        string(ExtractedQuestion::Status)
                            .default("pending")
                            .not_null(),
                    )
                    .col(text_null(ExtractedQuestion::Answer))
                    .col(text(ExtractedQuestion::SourceContext).not_null())
                    .col(
                        timestamp_with_time_zone(ExtractedQuestion::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ExtractedTask::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ExtractedDecision::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ExtractedQuestion::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ExtractedTask {
    Table,
    Id,
    AccountId,
    EmailId,
    ExtractionEventId,
    Description,
    Deadline,
    Priority,
    RequiresActionFromMe,
    Assignee,
    Status,
    SourceContext,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum ExtractedDecision {
    Table,
    Id,
    AccountId,
    EmailId,
    ExtractionEventId,
    Question,
    Options,
    Recommendation,
    Urgency,
    RequiresMyInput,
    Status,
    ChosenOption,
    SourceContext,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum ExtractedQuestion {
    Table,
    Id,
    AccountId,
    EmailId,
    ExtractionEventId,
    Question,
    QuestionType,
    Urgency,
    RequiresResponse,
    Status,
    Answer,
    SourceContext,
    CreatedAt,
}
