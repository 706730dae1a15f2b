use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::{
    db_core::prelude::*,
    error::{AppError, AppResult},
    events::{EventCtrl, EventType, NewEvent},
    mail::{MailClient, RawMessageRef},
    model::{account::AccountCtrl, subscription::SubscriptionCtrl},
    pipeline::EmailPipeline,
};

#[derive(Debug, Serialize)]
pub struct PushOutcome {
    pub account_id: String,
    pub history_id: i64,
    pub messages_processed: usize,
}

/// Real-time driver: turns a provider push notification into pipeline runs
/// over the messages added since the stored history cursor.
pub struct PushHandler {
    conn: DatabaseConnection,
    pipeline: Arc<EmailPipeline>,
    mail: Arc<dyn MailClient>,
}

impl PushHandler {
    pub fn new(
        conn: DatabaseConnection,
        pipeline: Arc<EmailPipeline>,
        mail: Arc<dyn MailClient>,
    ) -> Self {
        Self {
            conn,
            pipeline,
            mail,
        }
    }

    /// The history cursor only advances after the whole batch processed, so
    /// a failed notification is re-deliverable without losing messages.
    pub async fn handle_notification(
        &self,
        account_id: &str,
        history_id: i64,
    ) -> AppResult<PushOutcome> {
        EventCtrl::append(
            &self.conn,
            NewEvent::new(EventType::WebhookNotificationReceived, account_id)
                .payload(json!({"history_id": history_id})),
        )
        .await?;

        let subscription = SubscriptionCtrl::get(&self.conn, account_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("no subscription for account {account_id}"))
            })?;

        let email_ids = self
            .mail
            .enumerate_history(account_id, subscription.last_history_id)
            .await?;

        let mut messages_processed = 0;
        for email_id in &email_ids {
            self.pipeline
                .process_ref(&RawMessageRef {
                    account_id: account_id.to_string(),
                    email_id: email_id.clone(),
                    thread_id: None,
                })
                .await?;
            messages_processed += 1;
        }

        SubscriptionCtrl::record_notification(&self.conn, account_id, history_id).await?;

        Ok(PushOutcome {
            account_id: account_id.to_string(),
            history_id,
            messages_processed,
        })
    }

    pub async fn create_subscription(
        &self,
        account_id: &str,
        topic: &str,
    ) -> AppResult<subscription::Model> {
        AccountCtrl::get(&self.conn, account_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("account {account_id} not found")))?;

        let info = self.mail.subscribe(account_id, topic).await?;
        let model =
            SubscriptionCtrl::upsert(&self.conn, account_id, topic, info.expires_at, info.history_id)
                .await?;

        EventCtrl::append(
            &self.conn,
            NewEvent::new(EventType::WebhookSubscriptionCreated, account_id).payload(json!({
                "topic": topic,
                "expires_at": info.expires_at,
                "history_id": info.history_id,
            })),
        )
        .await?;

        Ok(model)
    }

    /// Renewal keeps the stored history cursor; only the expiry moves.
    pub async fn renew_subscription(&self, account_id: &str) -> AppResult<subscription::Model> {
        let existing = SubscriptionCtrl::get(&self.conn, account_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("no subscription for account {account_id}"))
            })?;

        let info = self
            .mail
            .renew_subscription(account_id, &existing.provider_topic)
            .await?;
        let model = SubscriptionCtrl::upsert(
            &self.conn,
            account_id,
            &existing.provider_topic,
            info.expires_at,
            existing.last_history_id,
        )
        .await?;

        EventCtrl::append(
            &self.conn,
            NewEvent::new(EventType::WebhookSubscriptionRenewed, account_id).payload(json!({
                "topic": existing.provider_topic,
                "expires_at": info.expires_at,
            })),
        )
        .await?;

        Ok(model)
    }

    pub async fn stop_subscription(&self, account_id: &str) -> AppResult<()> {
        self.mail.stop_subscription(account_id).await?;

        if !SubscriptionCtrl::delete(&self.conn, account_id).await? {
            return Err(AppError::NotFound(format!(
                "no subscription for account {account_id}"
            )));
        }

        EventCtrl::append(
            &self.conn,
            NewEvent::new(EventType::WebhookSubscriptionStopped, account_id).payload(json!({})),
        )
        .await?;

        Ok(())
    }
}
