use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;

use crate::{db_core::prelude::*, error::AppResult};

pub struct SubscriptionCtrl;

impl SubscriptionCtrl {
    pub async fn get(
        conn: &DatabaseConnection,
        account_id: &str,
    ) -> AppResult<Option<subscription::Model>> {
        Ok(Subscription::find_by_id(account_id).one(conn).await?)
    }

    pub async fn upsert(
        conn: &DatabaseConnection,
        account_id: &str,
        provider_topic: &str,
        expires_at: DateTime<Utc>,
        history_id: i64,
    ) -> AppResult<subscription::Model> {
        let model = Subscription::insert(subscription::ActiveModel {
            account_id: ActiveValue::Set(account_id.to_string()),
            provider_topic: ActiveValue::Set(provider_topic.to_string()),
            expires_at: ActiveValue::Set(expires_at.into()),
            last_history_id: ActiveValue::Set(history_id),
            last_notification_at: ActiveValue::Set(None),
        })
        .on_conflict(
            OnConflict::column(subscription::Column::AccountId)
                .update_columns([
                    subscription::Column::ProviderTopic,
                    subscription::Column::ExpiresAt,
                    subscription::Column::LastHistoryId,
                ])
                .to_owned(),
        )
        .exec_with_returning(conn)
        .await?;

        Ok(model)
    }

    /// Advances the history cursor. Only called after every message in the
    /// notification batch has been processed.
    pub async fn record_notification(
        conn: &DatabaseConnection,
        account_id: &str,
        history_id: i64,
    ) -> AppResult<()> {
        subscription::ActiveModel {
            account_id: ActiveValue::Unchanged(account_id.to_string()),
            last_history_id: ActiveValue::Set(history_id),
            last_notification_at: ActiveValue::Set(Some(Utc::now().into())),
            ..Default::default()
        }
        .update(conn)
        .await?;

        Ok(())
    }

    pub async fn delete(conn: &DatabaseConnection, account_id: &str) -> AppResult<bool> {
        let result = Subscription::delete_by_id(account_id).exec(conn).await?;
        Ok(result.rows_affected > 0)
    }
}
