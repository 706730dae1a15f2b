use uuid::Uuid;

use crate::{db_core::prelude::*, error::AppResult, extract::Extraction};

pub struct MemoryCtrl;

impl MemoryCtrl {
    /// Replaces the memory objects derived from one message. Re-extraction
    /// rewrites them wholesale; the extraction events remain the audit trail
    /// of earlier runs.
    pub async fn replace_for_email(
        conn: &DatabaseConnection,
        account_id: &str,
        email_id: &str,
        extraction_event_id: Uuid,
        extraction: &Extraction,
    ) -> AppResult<()> {
        ExtractedTask::delete_many()
            .filter(extracted_task::Column::AccountId.eq(account_id))
            .filter(extracted_task::Column::EmailId.eq(email_id))
            .exec(conn)
            .await?;
        ExtractedDecision::delete_many()
            .filter(extracted_decision::Column::AccountId.eq(account_id))
            .filter(extracted_decision::Column::EmailId.eq(email_id))
            .exec(conn)
            .await?;
        ExtractedQuestion::delete_many()
            .filter(extracted_question::Column::AccountId.eq(account_id))
            .filter(extracted_question::Column::EmailId.eq(email_id))
            .exec(conn)
            .await?;

        if !extraction.tasks.is_empty() {
            let tasks = extraction.tasks.iter().map(|t| extracted_task::ActiveModel {
                id: ActiveValue::NotSet,
                account_id: ActiveValue::Set(account_id.to_string()),
                email_id: ActiveValue::Set(email_id.to_string()),
                extraction_event_id: ActiveValue::Set(extraction_event_id),
                description: ActiveValue::Set(t.description.clone()),
                deadline: ActiveValue::Set(t.deadline.clone()),
                priority: ActiveValue::Set(t.priority),
                requires_action_from_me: ActiveValue::Set(t.requires_action_from_me),
                assignee: ActiveValue::Set(t.assignee.clone()),
                status: ActiveValue::Set(TaskStatus::Pending),
                source_context: ActiveValue::Set(t.source_context.clone()),
                created_at: ActiveValue::NotSet,
            });
            ExtractedTask::insert_many(tasks).exec(conn).await?;
        }

        if !extraction.decisions.is_empty() {
            let decisions = extraction
                .decisions
                .iter()
                .map(|d| extracted_decision::ActiveModel {
                    id: ActiveValue::NotSet,
                    account_id: ActiveValue::Set(account_id.to_string()),
                    email_id: ActiveValue::Set(email_id.to_string()),
                    extraction_event_id: ActiveValue::Set(extraction_event_id),
                    question: ActiveValue::Set(d.question.clone()),
                    options: ActiveValue::Set(serde_json::json!(d.options)),
                    recommendation: ActiveValue::Set(d.recommendation.clone()),
                    urgency: ActiveValue::Set(d.urgency),
                    requires_my_input: ActiveValue::Set(d.requires_my_input),
                    status: ActiveValue::Set(DecisionStatus::Pending),
                    chosen_option: ActiveValue::Set(None),
                    source_context: ActiveValue::Set(d.source_context.clone()),
                    created_at: ActiveValue::NotSet,
                });
            ExtractedDecision::insert_many(decisions).exec(conn).await?;
        }

        if !extraction.questions.is_empty() {
            let questions = extraction
                .questions
                .iter()
                .map(|q| extracted_question::ActiveModel {
                    id: ActiveValue::NotSet,
                    account_id: ActiveValue::Set(account_id.to_string()),
                    email_id: ActiveValue::Set(email_id.to_string()),
                    extraction_event_id: ActiveValue::Set(extraction_event_id),
                    question: ActiveValue::Set(q.question.clone()),
                    question_type: ActiveValue::Set(q.question_type),
                    urgency: ActiveValue::Set(q.urgency),
                    requires_response: ActiveValue::Set(q.requires_response),
                    status: ActiveValue::Set(QuestionStatus::Pending),
                    answer: ActiveValue::Set(None),
                    source_context: ActiveValue::Set(q.source_context.clone()),
                    created_at: ActiveValue::NotSet,
                });
            ExtractedQuestion::insert_many(questions).exec(conn).await?;
        }

        Ok(())
    }

    pub async fn tasks_for_email(
        conn: &DatabaseConnection,
        account_id: &str,
        email_id: &str,
    ) -> AppResult<Vec<extracted_task::Model>> {
        Ok(ExtractedTask::find()
            .filter(extracted_task::Column::AccountId.eq(account_id))
            .filter(extracted_task::Column::EmailId.eq(email_id))
            .all(conn)
            .await?)
    }

    pub async fn decisions_for_email(
        conn: &DatabaseConnection,
        account_id: &str,
        email_id: &str,
    ) -> AppResult<Vec<extracted_decision::Model>> {
        Ok(ExtractedDecision::find()
            .filter(extracted_decision::Column::AccountId.eq(account_id))
            .filter(extracted_decision::Column::EmailId.eq(email_id))
            .all(conn)
            .await?)
    }

    pub async fn questions_for_email(
        conn: &DatabaseConnection,
        account_id: &str,
        email_id: &str,
    ) -> AppResult<Vec<extracted_question::Model>> {
        Ok(ExtractedQuestion::find()
            .filter(extracted_question::Column::AccountId.eq(account_id))
            .filter(extracted_question::Column::EmailId.eq(email_id))
            .all(conn)
            .await?)
    }
}
