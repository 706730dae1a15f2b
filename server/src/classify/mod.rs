use chrono::{DateTime, Utc};
use entity::sea_orm_active_enums::EmailCategory;
use serde::{Deserialize, Serialize};
use strum::Display;

pub mod ensemble;
pub mod history;
pub mod model;
pub mod rules;

pub use ensemble::{EnsembleClassifier, EnsembleVerdict};

/// Normalized input to the classifier stack. Built by the orchestrator from
/// a fetched message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailToClassify {
    pub account_id: String,
    pub email_id: String,
    pub thread_id: Option<String>,
    pub subject: String,
    pub sender: String,
    pub sender_domain: String,
    pub received_at: DateTime<Utc>,
    pub body_text: Option<String>,
    pub has_attachments: bool,
}

impl EmailToClassify {
    pub fn body(&self) -> &str {
        self.body_text.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Rule,
    History,
    Model,
}

/// One classifier layer's contribution. A null score (no category,
/// confidence 0) means the layer had nothing to say; the ensemble
/// redistributes its weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerScore {
    pub layer: LayerKind,
    pub category: Option<EmailCategory>,
    pub importance: f32,
    pub confidence: f32,
    pub reasoning: String,
    pub processing_time_ms: i64,
    pub model_provider: Option<String>,
}

impl LayerScore {
    pub fn null(layer: LayerKind, reasoning: impl Into<String>) -> Self {
        Self {
            layer,
            category: None,
            importance: 0.0,
            confidence: 0.0,
            reasoning: reasoning.into(),
            processing_time_ms: 0,
            model_provider: None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.category.is_none()
    }
}

pub(crate) fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

pub fn parse_category(raw: &str) -> Option<EmailCategory> {
    match raw.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
        "important" => Some(EmailCategory::Important),
        "action_required" => Some(EmailCategory::ActionRequired),
        "nice_to_know" => Some(EmailCategory::NiceToKnow),
        "newsletter" => Some(EmailCategory::Newsletter),
        "system_notifications" | "system_notification" => Some(EmailCategory::SystemNotifications),
        "spam" => Some(EmailCategory::Spam),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_category_accepts_model_variants() {
        assert_eq!(parse_category("Important"), Some(EmailCategory::Important));
        assert_eq!(
            parse_category("action required"),
            Some(EmailCategory::ActionRequired)
        );
        assert_eq!(
            parse_category("system_notification"),
            Some(EmailCategory::SystemNotifications)
        );
        assert_eq!(parse_category("junk"), None);
    }

    #[test]
    fn null_score_has_no_category_and_zero_confidence() {
        let score = LayerScore::null(LayerKind::History, "no preference rows");
        assert!(score.is_null());
        assert_eq!(score.confidence, 0.0);
        assert_eq!(score.importance, 0.0);
    }
}
