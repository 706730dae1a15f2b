use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::{
    classify::{EmailToClassify, EnsembleClassifier, EnsembleVerdict},
    db_core::prelude::*,
    error::{AppError, AppResult},
    events::{EventCtrl, EventType, NewEvent},
    extract::{Extraction, Extractor},
    mail::{self, FetchedEmail, MailClient, RawMessageRef},
    model::{memory::MemoryCtrl, processed_email::ProcessedEmailCtrl},
    provider::StructuredCompletion,
    review::{NewReviewItem, ReviewQueueCtrl},
    server_config::cfg,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingDecision {
    AutoApply,
    Review,
    ReviewLowConfidence,
}

impl RoutingDecision {
    pub fn enqueues(&self) -> bool {
        !matches!(self, RoutingDecision::AutoApply)
    }
}

/// Confidence-threshold routing. A disagreement flag always routes to
/// review regardless of the combined confidence.
pub fn route(confidence: f32, needs_review: bool) -> RoutingDecision {
    if confidence < cfg.classification.medium_confidence_threshold {
        RoutingDecision::ReviewLowConfidence
    } else if needs_review || confidence < cfg.classification.high_confidence_threshold {
        RoutingDecision::Review
    } else {
        RoutingDecision::AutoApply
    }
}

#[derive(Debug, Serialize)]
pub struct ProcessingResult {
    pub processed_email_id: i32,
    pub account_id: String,
    pub email_id: String,
    pub category: EmailCategory,
    pub importance: f32,
    pub confidence: f32,
    pub needs_review: bool,
    pub routing: RoutingDecision,
    pub review_item_id: Option<i32>,
}

/// Per-message pipeline: classify, extract, persist, route, emit events.
/// Idempotent on (account_id, email_id); drivers (scan, push) call this per
/// message.
pub struct EmailPipeline {
    conn: DatabaseConnection,
    mail: Arc<dyn MailClient>,
    provider: Arc<dyn StructuredCompletion>,
}

impl EmailPipeline {
    pub fn new(
        conn: DatabaseConnection,
        mail: Arc<dyn MailClient>,
        provider: Arc<dyn StructuredCompletion>,
    ) -> Self {
        Self {
            conn,
            mail,
            provider,
        }
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub async fn process_ref(&self, raw: &RawMessageRef) -> AppResult<ProcessingResult> {
        let fetched = self
            .mail
            .fetch_body(&raw.account_id, &raw.email_id)
            .await?;
        self.process_fetched(&raw.account_id, fetched).await
    }

    pub async fn process_fetched(
        &self,
        account_id: &str,
        fetched: FetchedEmail,
    ) -> AppResult<ProcessingResult> {
        let (email, parts) = normalize(account_id, fetched);

        let processed_before =
            ProcessedEmailCtrl::count_for_account(&self.conn, account_id).await?;
        let bootstrap = processed_before < cfg.classification.bootstrap_classification_count;

        let classify_started = Instant::now();
        let verdict =
            EnsembleClassifier::classify(&self.conn, self.provider.as_ref(), &email, bootstrap)
                .await?;
        check_verdict_invariants(&verdict)?;

        EventCtrl::append(
            &self.conn,
            NewEvent::new(EventType::EmailClassified, account_id)
                .email_id(&email.email_id)
                .payload(json!({
                    "category": verdict.category,
                    "importance": verdict.importance,
                    "confidence": verdict.confidence,
                    "needs_review": verdict.needs_review,
                    "variance": verdict.variance,
                    "bootstrap": verdict.bootstrap,
                    "layers": verdict.layer_trace.iter().map(|l| json!({
                        "layer": l.layer,
                        "category": l.category,
                        "confidence": l.confidence,
                    })).collect::<Vec<_>>(),
                }))
                .processing_time_ms(classify_started.elapsed().as_millis() as i64),
        )
        .await?;

        let extraction = Extractor::extract(self.provider.as_ref(), &email).await?;

        let persisted = self
            .persist(&email, parts, &verdict, &extraction)
            .await?;

        let analyzed_event_id = EventCtrl::append(
            &self.conn,
            NewEvent::new(EventType::EmailAnalyzed, account_id)
                .email_id(&email.email_id)
                .payload(json!({
                    "summary": extraction.summary,
                    "main_topic": extraction.main_topic,
                    "sentiment": extraction.sentiment,
                    "has_action_items": extraction.has_action_items,
                    "task_count": extraction.tasks.len(),
                    "decision_count": extraction.decisions.len(),
                    "question_count": extraction.questions.len(),
                    "model_provider": extraction.model_provider,
                }))
                .processing_time_ms(extraction.processing_time_ms),
        )
        .await?;

        MemoryCtrl::replace_for_email(
            &self.conn,
            account_id,
            &email.email_id,
            analyzed_event_id,
            &extraction,
        )
        .await?;

        self.emit_item_events(account_id, &email.email_id, &extraction)
            .await?;

        let routing = route(verdict.confidence, verdict.needs_review);
        let review_item_id = match routing {
            RoutingDecision::AutoApply => {
                self.apply_verdict(account_id, &email.email_id, &verdict).await;
                None
            }
            RoutingDecision::Review | RoutingDecision::ReviewLowConfidence => {
                let item = ReviewQueueCtrl::enqueue(
                    &self.conn,
                    NewReviewItem {
                        account_id: account_id.to_string(),
                        email_id: email.email_id.clone(),
                        processed_email_id: persisted.id,
                        suggested_category: verdict.category,
                        importance: verdict.importance,
                        confidence: verdict.confidence,
                        reasoning: verdict
                            .layer_trace
                            .iter()
                            .map(|l| format!("{}: {}", l.layer, l.reasoning))
                            .collect::<Vec<_>>()
                            .join("; "),
                        low_confidence: routing == RoutingDecision::ReviewLowConfidence,
                    },
                )
                .await?;

                EventCtrl::append(
                    &self.conn,
                    NewEvent::new(EventType::ReviewEnqueued, account_id)
                        .email_id(&email.email_id)
                        .payload(json!({
                            "review_item_id": item.id,
                            "suggested_category": verdict.category,
                            "confidence": verdict.confidence,
                            "low_confidence": routing == RoutingDecision::ReviewLowConfidence,
                        })),
                )
                .await?;

                Some(item.id)
            }
        };

        Ok(ProcessingResult {
            processed_email_id: persisted.id,
            account_id: account_id.to_string(),
            email_id: email.email_id,
            category: verdict.category,
            importance: verdict.importance,
            confidence: verdict.confidence,
            needs_review: verdict.needs_review,
            routing,
            review_item_id,
        })
    }

    async fn persist(
        &self,
        email: &EmailToClassify,
        parts: PersistParts,
        verdict: &EnsembleVerdict,
        extraction: &Extraction,
    ) -> AppResult<processed_email::Model> {
        let attachment_metadata = if parts.attachments.is_empty() {
            None
        } else {
            Some(serde_json::to_value(&parts.attachments).unwrap_or_default())
        };

        let model = ProcessedEmailCtrl::upsert(
            &self.conn,
            processed_email::ActiveModel {
                id: ActiveValue::NotSet,
                account_id: ActiveValue::Set(email.account_id.clone()),
                email_id: ActiveValue::Set(email.email_id.clone()),
                thread_id: ActiveValue::Set(email.thread_id.clone()),
                subject: ActiveValue::Set(email.subject.clone()),
                sender: ActiveValue::Set(email.sender.clone()),
                sender_domain: ActiveValue::Set(email.sender_domain.clone()),
                received_at: ActiveValue::Set(email.received_at.into()),
                category: ActiveValue::Set(verdict.category),
                importance_score: ActiveValue::Set(verdict.importance),
                classification_confidence: ActiveValue::Set(verdict.confidence),
                layer_trace: ActiveValue::Set(
                    serde_json::to_value(&verdict.layer_trace).unwrap_or_default(),
                ),
                // Every message is stored in full; the column exists for
                // forward compatibility only.
                storage_level: ActiveValue::Set("full".to_string()),
                body_text: ActiveValue::Set(email.body_text.clone()),
                body_html: ActiveValue::Set(parts.body_html),
                summary: ActiveValue::Set(Some(extraction.summary.clone())),
                thread_position: ActiveValue::Set(parts.thread_position),
                has_attachments: ActiveValue::Set(email.has_attachments),
                attachment_metadata: ActiveValue::Set(attachment_metadata),
                user_corrected: ActiveValue::Set(false),
                original_category: ActiveValue::Set(None),
                processed_at: ActiveValue::Set(Utc::now().into()),
            },
        )
        .await?;

        Ok(model)
    }

    async fn emit_item_events(
        &self,
        account_id: &str,
        email_id: &str,
        extraction: &Extraction,
    ) -> AppResult<()> {
        for task in &extraction.tasks {
            EventCtrl::append(
                &self.conn,
                NewEvent::new(EventType::TaskExtracted, account_id)
                    .email_id(email_id)
                    .payload(serde_json::to_value(task).unwrap_or_default()),
            )
            .await?;
        }
        for decision in &extraction.decisions {
            EventCtrl::append(
                &self.conn,
                NewEvent::new(EventType::DecisionExtracted, account_id)
                    .email_id(email_id)
                    .payload(serde_json::to_value(decision).unwrap_or_default()),
            )
            .await?;
        }
        for question in &extraction.questions {
            EventCtrl::append(
                &self.conn,
                NewEvent::new(EventType::QuestionExtracted, account_id)
                    .email_id(email_id)
                    .payload(serde_json::to_value(question).unwrap_or_default()),
            )
            .await?;
        }

        Ok(())
    }

    /// High-confidence verdicts act on the mailbox directly. Mail-API
    /// failures here are logged and swallowed: the verdict is already
    /// persisted, and labels can be reconciled on the next pass.
    async fn apply_verdict(&self, account_id: &str, email_id: &str, verdict: &EnsembleVerdict) {
        let label = category_label(verdict.category);
        if let Err(e) = self.mail.apply_label(account_id, email_id, label).await {
            tracing::warn!("Could not label {email_id}: {e}");
        }

        let archivable = matches!(
            verdict.category,
            EmailCategory::Spam | EmailCategory::Newsletter
        );
        if archivable && verdict.importance <= 0.1 {
            if let Err(e) = self.mail.archive(account_id, email_id).await {
                tracing::warn!("Could not archive {email_id}: {e}");
            }
        }
    }
}

pub fn category_label(category: EmailCategory) -> &'static str {
    match category {
        EmailCategory::Important => "mailsift/important",
        EmailCategory::ActionRequired => "mailsift/action-required",
        EmailCategory::NiceToKnow => "mailsift/nice-to-know",
        EmailCategory::Newsletter => "mailsift/newsletter",
        EmailCategory::SystemNotifications => "mailsift/system",
        EmailCategory::Spam => "mailsift/spam",
    }
}

fn check_verdict_invariants(verdict: &EnsembleVerdict) -> AppResult<()> {
    let in_unit = |v: f32| (0.0..=1.0).contains(&v);

    if !in_unit(verdict.confidence) || !in_unit(verdict.importance) {
        return Err(AppError::InvariantViolation(format!(
            "verdict scores out of range: importance {}, confidence {}",
            verdict.importance, verdict.confidence
        )));
    }
    for layer in &verdict.layer_trace {
        if !in_unit(layer.confidence) || !in_unit(layer.importance) {
            return Err(AppError::InvariantViolation(format!(
                "{} layer scores out of range",
                layer.layer
            )));
        }
    }

    Ok(())
}

/// Message parts that are persisted but not classified over.
pub struct PersistParts {
    pub body_html: Option<String>,
    pub attachments: Vec<mail::AttachmentMeta>,
    pub thread_position: Option<i32>,
}

/// Builds the classifier input from a fetched message. Text bodies fall
/// back to a flattened rendering of the HTML part.
pub fn normalize(account_id: &str, fetched: FetchedEmail) -> (EmailToClassify, PersistParts) {
    let sender = mail::sender_address(&fetched.sender);
    let sender_domain = mail::sender_domain(&sender);

    let body_text = fetched
        .text
        .clone()
        .or_else(|| fetched.html.as_deref().and_then(mail::text_from_html));

    let email = EmailToClassify {
        account_id: account_id.to_string(),
        email_id: fetched.email_id,
        thread_id: fetched.thread_id,
        subject: fetched.subject.unwrap_or_default(),
        sender,
        sender_domain,
        received_at: fetched.received_at,
        body_text,
        has_attachments: !fetched.attachments.is_empty(),
    };

    let parts = PersistParts {
        body_html: fetched.html,
        attachments: fetched.attachments,
        thread_position: fetched.thread_position,
    };

    (email, parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::common::fetched_fixture;

    #[test]
    fn routing_thresholds_match_contract() {
        assert_eq!(route(0.95, false), RoutingDecision::AutoApply);
        assert_eq!(route(0.90, false), RoutingDecision::AutoApply);
        assert_eq!(route(0.89, false), RoutingDecision::Review);
        assert_eq!(route(0.65, false), RoutingDecision::Review);
        assert_eq!(route(0.64, false), RoutingDecision::ReviewLowConfidence);
        assert_eq!(route(0.0, false), RoutingDecision::ReviewLowConfidence);
    }

    #[test]
    fn disagreement_flag_always_routes_to_review() {
        assert_eq!(route(0.70, true), RoutingDecision::Review);
        assert_eq!(route(0.52, true), RoutingDecision::ReviewLowConfidence);
    }

    #[test]
    fn normalize_derives_sender_domain_and_html_fallback() {
        let mut fetched = fetched_fixture("msg-1", "Jane <Jane@Partner.IO>", "Hello", None);
        fetched.html = Some("<p>rendered <b>body</b></p>".to_string());

        let (email, parts) = normalize("acct-1", fetched);

        assert_eq!(email.sender, "jane@partner.io");
        assert_eq!(email.sender_domain, "partner.io");
        assert!(email.body_text.as_deref().unwrap().contains("rendered"));
        assert!(parts.body_html.is_some());
    }

    #[test]
    fn normalize_prefers_text_part() {
        let fetched = fetched_fixture("msg-1", "a@b.com", "Hi", Some("plain text body"));
        let (email, _) = normalize("acct-1", fetched);
        assert_eq!(email.body_text.as_deref(), Some("plain text body"));
    }

    #[test]
    fn every_category_has_a_label() {
        for category in [
            EmailCategory::Important,
            EmailCategory::ActionRequired,
            EmailCategory::NiceToKnow,
            EmailCategory::Newsletter,
            EmailCategory::SystemNotifications,
            EmailCategory::Spam,
        ] {
            assert!(category_label(category).starts_with("mailsift/"));
        }
    }
}
