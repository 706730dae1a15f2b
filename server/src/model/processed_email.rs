use std::collections::HashSet;

use sea_orm::sea_query::OnConflict;

use crate::{
    db_core::prelude::*,
    error::{AppError, AppResult},
};

pub struct ProcessedEmailCtrl;

#[derive(Debug, Clone, Default)]
pub struct ProcessedEmailListFilter {
    pub category: Option<EmailCategory>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ProcessedEmailCtrl {
    /// Idempotent write keyed on (account_id, email_id). Re-processing
    /// replaces the verdict and extraction columns, but an HITL-corrected
    /// category is the user's decision: it survives re-runs along with the
    /// correction columns themselves.
    pub async fn upsert(
        conn: &DatabaseConnection,
        mut active_model: processed_email::ActiveModel,
    ) -> AppResult<processed_email::Model> {
        let existing = match (&active_model.account_id, &active_model.email_id) {
            (ActiveValue::Set(account_id), ActiveValue::Set(email_id)) => {
                Self::get_by_account_and_email(conn, account_id, email_id).await?
            }
            _ => None,
        };
        if let Some(existing) = existing {
            if existing.user_corrected {
                active_model.category = ActiveValue::Set(existing.category);
            }
        }

        let model = ProcessedEmail::insert(active_model)
            .on_conflict(
                OnConflict::columns([
                    processed_email::Column::AccountId,
                    processed_email::Column::EmailId,
                ])
                .update_columns([
                    processed_email::Column::ThreadId,
                    processed_email::Column::Subject,
                    processed_email::Column::Sender,
                    processed_email::Column::SenderDomain,
                    processed_email::Column::ReceivedAt,
                    processed_email::Column::Category,
                    processed_email::Column::ImportanceScore,
                    processed_email::Column::ClassificationConfidence,
                    processed_email::Column::LayerTrace,
                    processed_email::Column::StorageLevel,
                    processed_email::Column::BodyText,
                    processed_email::Column::BodyHtml,
                    processed_email::Column::Summary,
                    processed_email::Column::ThreadPosition,
                    processed_email::Column::HasAttachments,
                    processed_email::Column::AttachmentMetadata,
                    processed_email::Column::ProcessedAt,
                ])
                .to_owned(),
            )
            .exec_with_returning(conn)
            .await?;

        if model.user_corrected
            && model
                .original_category
                .map_or(true, |orig| orig == model.category)
        {
            return Err(AppError::InvariantViolation(format!(
                "processed email {} is marked corrected but original_category does not differ",
                model.id
            )));
        }

        Ok(model)
    }

    pub async fn get(
        conn: &DatabaseConnection,
        id: i32,
    ) -> AppResult<Option<processed_email::Model>> {
        Ok(ProcessedEmail::find_by_id(id).one(conn).await?)
    }

    pub async fn get_by_account_and_email(
        conn: &DatabaseConnection,
        account_id: &str,
        email_id: &str,
    ) -> AppResult<Option<processed_email::Model>> {
        Ok(ProcessedEmail::find()
            .filter(processed_email::Column::AccountId.eq(account_id))
            .filter(processed_email::Column::EmailId.eq(email_id))
            .one(conn)
            .await?)
    }

    pub async fn count_for_account(conn: &DatabaseConnection, account_id: &str) -> AppResult<u64> {
        Ok(ProcessedEmail::find()
            .filter(processed_email::Column::AccountId.eq(account_id))
            .count(conn)
            .await?)
    }

    pub async fn list(
        conn: &DatabaseConnection,
        account_id: &str,
        filter: ProcessedEmailListFilter,
    ) -> AppResult<Vec<processed_email::Model>> {
        let mut select = ProcessedEmail::find()
            .filter(processed_email::Column::AccountId.eq(account_id))
            .order_by_desc(processed_email::Column::ReceivedAt);

        if let Some(category) = filter.category {
            select = select.filter(processed_email::Column::Category.eq(category));
        }
        if let Some(limit) = filter.limit {
            select = select.limit(limit);
        }
        if let Some(offset) = filter.offset {
            select = select.offset(offset);
        }

        Ok(select.all(conn).await?)
    }

    /// Which of the given provider message ids are already processed for the
    /// account. Used by scans honoring `skip_already_processed`.
    pub async fn find_processed_ids(
        conn: &DatabaseConnection,
        account_id: &str,
        email_ids: &[String],
    ) -> AppResult<HashSet<String>> {
        #[derive(FromQueryResult)]
        struct ProcessedEmailId {
            email_id: String,
        }

        let processed = ProcessedEmail::find()
            .filter(processed_email::Column::AccountId.eq(account_id))
            .filter(processed_email::Column::EmailId.is_in(email_ids.iter().cloned()))
            .select_only()
            .column(processed_email::Column::EmailId)
            .into_model::<ProcessedEmailId>()
            .all(conn)
            .await?
            .into_iter()
            .map(|e| e.email_id)
            .collect::<HashSet<_>>();

        Ok(processed)
    }

    /// Applies an HITL category correction. The engine's own verdict is
    /// preserved in `original_category`; restoring it clears the correction.
    pub async fn apply_user_correction(
        conn: &DatabaseConnection,
        id: i32,
        new_category: EmailCategory,
    ) -> AppResult<processed_email::Model> {
        let email = Self::get(conn, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("processed email {id} not found")))?;

        if email.category == new_category {
            return Ok(email);
        }

        let original = email.original_category.unwrap_or(email.category);
        let (user_corrected, original_category) = if original == new_category {
            (false, None)
        } else {
            (true, Some(original))
        };

        let updated = processed_email::ActiveModel {
            id: ActiveValue::Unchanged(id),
            category: ActiveValue::Set(new_category),
            user_corrected: ActiveValue::Set(user_corrected),
            original_category: ActiveValue::Set(original_category),
            ..Default::default()
        }
        .update(conn)
        .await?;

        Ok(updated)
    }
}
