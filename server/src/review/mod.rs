use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::{
    db_core::prelude::*,
    error::{AppError, AppResult},
    events::{EventCtrl, EventType, NewEvent},
    feedback::{FeedbackAction, FeedbackSignal, FeedbackSource, FeedbackTracker},
    model::processed_email::ProcessedEmailCtrl,
};

pub struct ReviewQueueCtrl;

#[derive(Debug, Clone)]
pub struct NewReviewItem {
    pub account_id: String,
    pub email_id: String,
    pub processed_email_id: i32,
    pub suggested_category: EmailCategory,
    pub importance: f32,
    pub confidence: f32,
    pub reasoning: String,
    pub low_confidence: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewListFilter {
    pub account_id: Option<String>,
    pub status: Option<ReviewStatus>,
    pub added_before: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// The HITL decision applied to a pending item.
#[derive(Debug, Clone)]
pub enum ReviewAction {
    Approve,
    Reject,
    Modify {
        corrected_category: EmailCategory,
        feedback: Option<String>,
    },
}

impl ReviewAction {
    fn status(&self) -> ReviewStatus {
        match self {
            ReviewAction::Approve => ReviewStatus::Approved,
            ReviewAction::Reject => ReviewStatus::Rejected,
            ReviewAction::Modify { .. } => ReviewStatus::Modified,
        }
    }

    fn event_type(&self) -> EventType {
        match self {
            ReviewAction::Approve => EventType::ReviewApproved,
            ReviewAction::Reject => EventType::ReviewRejected,
            ReviewAction::Modify { .. } => EventType::ReviewModified,
        }
    }

    fn feedback_action(&self) -> FeedbackAction {
        match self {
            ReviewAction::Approve => FeedbackAction::ReviewApprove,
            ReviewAction::Reject => FeedbackAction::ReviewReject,
            ReviewAction::Modify { .. } => FeedbackAction::ReviewModify,
        }
    }
}

impl ReviewQueueCtrl {
    /// Enqueues a verdict for review. Re-processing a message that already
    /// has a pending item keeps the existing one.
    pub async fn enqueue(
        conn: &DatabaseConnection,
        item: NewReviewItem,
    ) -> AppResult<review_queue_item::Model> {
        if let Some(existing) = ReviewQueueItem::find()
            .filter(review_queue_item::Column::ProcessedEmailId.eq(item.processed_email_id))
            .filter(review_queue_item::Column::Status.eq(ReviewStatus::Pending))
            .one(conn)
            .await?
        {
            return Ok(existing);
        }

        let model = review_queue_item::ActiveModel {
            id: ActiveValue::NotSet,
            account_id: ActiveValue::Set(item.account_id),
            email_id: ActiveValue::Set(item.email_id),
            processed_email_id: ActiveValue::Set(item.processed_email_id),
            suggested_category: ActiveValue::Set(item.suggested_category),
            importance: ActiveValue::Set(item.importance),
            confidence: ActiveValue::Set(item.confidence),
            reasoning: ActiveValue::Set(item.reasoning),
            low_confidence: ActiveValue::Set(item.low_confidence),
            status: ActiveValue::Set(ReviewStatus::Pending),
            user_corrected_category: ActiveValue::Set(None),
            user_feedback_text: ActiveValue::Set(None),
            added_at: ActiveValue::Set(Utc::now().into()),
            reviewed_at: ActiveValue::Set(None),
        }
        .insert(conn)
        .await?;

        Ok(model)
    }

    /// Pending-first queue ordering: most important first, oldest first
    /// within equal importance.
    pub async fn list(
        conn: &DatabaseConnection,
        filter: ReviewListFilter,
    ) -> AppResult<Vec<review_queue_item::Model>> {
        let mut select = ReviewQueueItem::find()
            .order_by_desc(review_queue_item::Column::Importance)
            .order_by_asc(review_queue_item::Column::AddedAt);

        if let Some(account_id) = filter.account_id {
            select = select.filter(review_queue_item::Column::AccountId.eq(account_id));
        }
        if let Some(status) = filter.status {
            select = select.filter(review_queue_item::Column::Status.eq(status));
        }
        if let Some(added_before) = filter.added_before {
            select = select.filter(review_queue_item::Column::AddedAt.lt(added_before));
        }
        if let Some(limit) = filter.limit {
            select = select.limit(limit);
        }
        if let Some(offset) = filter.offset {
            select = select.offset(offset);
        }

        Ok(select.all(conn).await?)
    }

    pub async fn get(
        conn: &DatabaseConnection,
        id: i32,
    ) -> AppResult<Option<review_queue_item::Model>> {
        Ok(ReviewQueueItem::find_by_id(id).one(conn).await?)
    }

    /// Single authoritative transition out of `pending`, guarded by an
    /// optimistic status check. A second transition attempt loses the
    /// rows_affected race and surfaces as a conflict with the item left
    /// unchanged.
    pub async fn transition(
        conn: &DatabaseConnection,
        id: i32,
        action: &ReviewAction,
    ) -> AppResult<review_queue_item::Model> {
        let (corrected_category, feedback_text) = match action {
            ReviewAction::Modify {
                corrected_category,
                feedback,
            } => (Some(*corrected_category), feedback.clone()),
            _ => (None, None),
        };

        let result = ReviewQueueItem::update_many()
            .set(review_queue_item::ActiveModel {
                status: ActiveValue::Set(action.status()),
                user_corrected_category: ActiveValue::Set(corrected_category),
                user_feedback_text: ActiveValue::Set(feedback_text),
                reviewed_at: ActiveValue::Set(Some(Utc::now().into())),
                ..Default::default()
            })
            .filter(review_queue_item::Column::Id.eq(id))
            .filter(review_queue_item::Column::Status.eq(ReviewStatus::Pending))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return match Self::get(conn, id).await? {
                Some(item) => Err(AppError::Conflict(format!(
                    "review item {id} is already {}",
                    serde_json::to_value(item.status)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default()
                ))),
                None => Err(AppError::NotFound(format!("review item {id} not found"))),
            };
        }

        Self::get(conn, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("review item {id} not found")))
    }
}

pub struct ReviewService;

impl ReviewService {
    /// Applies an HITL decision end to end: the queue transition, the
    /// REVIEW_* event, the processed-email correction, and the feedback
    /// update, in that order.
    pub async fn resolve(
        conn: &DatabaseConnection,
        id: i32,
        action: ReviewAction,
    ) -> AppResult<review_queue_item::Model> {
        let item = ReviewQueueCtrl::transition(conn, id, &action).await?;

        let email = ProcessedEmailCtrl::get(conn, item.processed_email_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "processed email {} for review item {id} not found",
                    item.processed_email_id
                ))
            })?;

        EventCtrl::append(
            conn,
            NewEvent::new(action.event_type(), item.account_id.clone())
                .email_id(item.email_id.clone())
                .payload(json!({
                    "review_item_id": item.id,
                    "suggested_category": item.suggested_category,
                    "corrected_category": item.user_corrected_category,
                    "confidence": item.confidence,
                })),
        )
        .await?;

        let new_category = match &action {
            ReviewAction::Modify {
                corrected_category, ..
            } => {
                ProcessedEmailCtrl::apply_user_correction(
                    conn,
                    email.id,
                    *corrected_category,
                )
                .await?;
                Some(*corrected_category)
            }
            _ => None,
        };

        FeedbackTracker::record(
            conn,
            FeedbackSignal {
                action: action.feedback_action(),
                account_id: item.account_id.clone(),
                email_id: item.email_id.clone(),
                sender: email.sender.clone(),
                sender_domain: email.sender_domain.clone(),
                prior_category: item.suggested_category,
                new_category,
                prior_importance: item.importance,
                source: FeedbackSource::ReviewQueue,
            },
        )
        .await?;

        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_map_to_terminal_statuses_and_events() {
        assert_eq!(ReviewAction::Approve.status(), ReviewStatus::Approved);
        assert_eq!(ReviewAction::Reject.status(), ReviewStatus::Rejected);
        let modify = ReviewAction::Modify {
            corrected_category: EmailCategory::Important,
            feedback: None,
        };
        assert_eq!(modify.status(), ReviewStatus::Modified);

        assert_eq!(ReviewAction::Approve.event_type(), EventType::ReviewApproved);
        assert_eq!(ReviewAction::Reject.event_type(), EventType::ReviewRejected);
        assert_eq!(modify.event_type(), EventType::ReviewModified);

        assert_eq!(
            modify.feedback_action(),
            crate::feedback::FeedbackAction::ReviewModify
        );
    }
}
