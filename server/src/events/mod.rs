use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{db_core::prelude::*, error::AppResult};

/// The closed set of domain event types. Stored as the SCREAMING_SNAKE_CASE
/// string form.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    EmailFetched,
    EmailClassified,
    EmailAnalyzed,
    TaskExtracted,
    DecisionExtracted,
    QuestionExtracted,
    ReviewEnqueued,
    ReviewApproved,
    ReviewRejected,
    ReviewModified,
    UserFeedback,
    HistoryScanStarted,
    HistoryScanPaused,
    HistoryScanResumed,
    HistoryScanCompleted,
    HistoryScanCancelled,
    HistoryScanError,
    WebhookSubscriptionCreated,
    WebhookSubscriptionRenewed,
    WebhookSubscriptionStopped,
    WebhookNotificationReceived,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_type: EventType,
    pub account_id: String,
    pub email_id: Option<String>,
    pub user_id: Option<String>,
    pub payload: serde_json::Value,
    pub processing_time_ms: Option<i64>,
}

impl NewEvent {
    pub fn new(event_type: EventType, account_id: impl Into<String>) -> Self {
        Self {
            event_type,
            account_id: account_id.into(),
            email_id: None,
            user_id: None,
            payload: json!({}),
            processing_time_ms: None,
        }
    }

    pub fn email_id(mut self, email_id: impl Into<String>) -> Self {
        self.email_id = Some(email_id.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn processing_time_ms(mut self, ms: i64) -> Self {
        self.processing_time_ms = Some(ms);
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    pub event_type: Option<EventType>,
    pub account_id: Option<String>,
    pub email_id: Option<String>,
    /// Only events strictly after this instant are returned.
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

pub struct EventCtrl;

impl EventCtrl {
    /// Appends one immutable event and returns its id. The row is never
    /// updated or deleted afterwards.
    pub async fn append(conn: &DatabaseConnection, new_event: NewEvent) -> AppResult<Uuid> {
        let event_id = Uuid::new_v4();
        Event::insert(event::ActiveModel {
            seq: ActiveValue::NotSet,
            event_id: ActiveValue::Set(event_id),
            event_type: ActiveValue::Set(new_event.event_type.as_ref().to_string()),
            timestamp: ActiveValue::Set(Utc::now().into()),
            account_id: ActiveValue::Set(new_event.account_id),
            email_id: ActiveValue::Set(new_event.email_id),
            user_id: ActiveValue::Set(new_event.user_id),
            payload: ActiveValue::Set(new_event.payload),
            processing_time_ms: ActiveValue::Set(new_event.processing_time_ms),
        })
        .exec(conn)
        .await?;

        Ok(event_id)
    }

    /// Queries events in append order (per-account the order events were
    /// written in).
    pub async fn query(
        conn: &DatabaseConnection,
        filter: EventFilter,
    ) -> AppResult<Vec<event::Model>> {
        let mut select = Event::find().order_by_asc(event::Column::Seq);

        if let Some(event_type) = filter.event_type {
            select = select.filter(event::Column::EventType.eq(event_type.as_ref()));
        }
        if let Some(account_id) = filter.account_id {
            select = select.filter(event::Column::AccountId.eq(account_id));
        }
        if let Some(email_id) = filter.email_id {
            select = select.filter(event::Column::EmailId.eq(email_id));
        }
        if let Some(start) = filter.start_time {
            select = select.filter(event::Column::Timestamp.gt(start));
        }
        if let Some(end) = filter.end_time {
            select = select.filter(event::Column::Timestamp.lte(end));
        }
        if let Some(limit) = filter.limit {
            select = select.limit(limit);
        }

        Ok(select.all(conn).await?)
    }

    pub async fn get(conn: &DatabaseConnection, event_id: Uuid) -> AppResult<Option<event::Model>> {
        Ok(Event::find()
            .filter(event::Column::EventId.eq(event_id))
            .one(conn)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn event_type_renders_screaming_snake_case() {
        assert_eq!(EventType::EmailClassified.as_ref(), "EMAIL_CLASSIFIED");
        assert_eq!(EventType::HistoryScanPaused.as_ref(), "HISTORY_SCAN_PAUSED");
        assert_eq!(
            EventType::WebhookNotificationReceived.as_ref(),
            "WEBHOOK_NOTIFICATION_RECEIVED"
        );
    }

    #[test]
    fn event_type_parses_back_from_stored_string() {
        assert_eq!(
            EventType::from_str("REVIEW_MODIFIED").unwrap(),
            EventType::ReviewModified
        );
        assert!(EventType::from_str("NOT_AN_EVENT").is_err());
    }

    #[test]
    fn new_event_builder_carries_payload_untouched() {
        let payload = json!({"history_id": 42, "nested": {"a": [1, 2, 3]}});
        let event = NewEvent::new(EventType::WebhookNotificationReceived, "acct-1")
            .email_id("msg-9")
            .payload(payload.clone())
            .processing_time_ms(12);

        assert_eq!(event.payload, payload);
        assert_eq!(event.email_id.as_deref(), Some("msg-9"));
        assert_eq!(event.processing_time_ms, Some(12));
    }
}
