use std::time::Instant;

use entity::sea_orm_active_enums::EmailCategory;

use crate::{
    db_core::prelude::*,
    error::AppResult,
    model::preference::PreferenceCtrl,
    server_config::cfg,
};

use super::{clamp_unit, LayerKind, LayerScore};

/// Observed-rate counts saturate the confidence multiplier at this many
/// messages.
const SATURATION_FULL_COUNT: f32 = 20.0;

/// Maps observed behavior rates onto (category, importance). The same
/// mapping is used when the feedback tracker recomputes a preference row's
/// inferred importance, so reads and writes agree.
pub fn infer_from_rates(reply_rate: f32, archive_rate: f32, delete_rate: f32) -> (EmailCategory, f32) {
    if reply_rate >= 0.7 {
        (EmailCategory::Important, clamp_unit(reply_rate.max(0.8)))
    } else if delete_rate >= 0.8 {
        (EmailCategory::Spam, (delete_rate * 0.1).min(0.1))
    } else if archive_rate >= 0.8 && reply_rate < 0.1 {
        (EmailCategory::NiceToKnow, (0.2 - archive_rate * 0.1).max(0.05))
    } else if reply_rate >= 0.3 {
        (
            EmailCategory::NiceToKnow,
            clamp_unit(0.5 - archive_rate * 0.2),
        )
    } else {
        (
            EmailCategory::NiceToKnow,
            clamp_unit(0.4 - archive_rate * 0.2),
        )
    }
}

pub fn saturation(emails_seen: i32) -> f32 {
    (emails_seen as f32 / SATURATION_FULL_COUNT).min(1.0)
}

pub struct HistoryClassifier;

impl HistoryClassifier {
    /// Scores a message from per-sender statistics, falling back to the
    /// sender's domain. Read-only: preference rows are only mutated by the
    /// feedback tracker.
    pub async fn classify(
        conn: &DatabaseConnection,
        account_id: &str,
        sender: &str,
        sender_domain: &str,
    ) -> AppResult<LayerScore> {
        let started = Instant::now();

        if let Some(pref) = PreferenceCtrl::get_sender(conn, account_id, sender).await? {
            if pref.emails_seen >= cfg.history.sender_min_emails {
                return Ok(score_from_stats(
                    started,
                    pref.emails_seen,
                    pref.reply_rate,
                    pref.archive_rate,
                    pref.delete_rate,
                    pref.confidence_base,
                    format!("sender {} seen {} times", sender, pref.emails_seen),
                ));
            }
        }

        if let Some(pref) = PreferenceCtrl::get_domain(conn, account_id, sender_domain).await? {
            if pref.emails_seen >= cfg.history.domain_min_emails {
                return Ok(score_from_stats(
                    started,
                    pref.emails_seen,
                    pref.reply_rate,
                    pref.archive_rate,
                    pref.delete_rate,
                    pref.confidence_base,
                    format!("domain {} seen {} times", sender_domain, pref.emails_seen),
                ));
            }
        }

        Ok(LayerScore {
            layer: LayerKind::History,
            category: None,
            importance: 0.0,
            confidence: 0.0,
            reasoning: "no sender or domain history above minimum counts".to_string(),
            processing_time_ms: started.elapsed().as_millis() as i64,
            model_provider: None,
        })
    }
}

fn score_from_stats(
    started: Instant,
    emails_seen: i32,
    reply_rate: f32,
    archive_rate: f32,
    delete_rate: f32,
    confidence_base: f32,
    source: String,
) -> LayerScore {
    let (category, importance) = infer_from_rates(reply_rate, archive_rate, delete_rate);
    let confidence = clamp_unit(confidence_base * saturation(emails_seen));

    LayerScore {
        layer: LayerKind::History,
        category: Some(category),
        importance,
        confidence,
        reasoning: format!(
            "{source}; reply_rate {reply_rate:.2}, archive_rate {archive_rate:.2}, delete_rate {delete_rate:.2}"
        ),
        processing_time_ms: started.elapsed().as_millis() as i64,
        model_provider: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequent_replies_mark_sender_important() {
        let (category, importance) = infer_from_rates(0.92, 0.05, 0.0);
        assert_eq!(category, EmailCategory::Important);
        assert!(importance >= 0.8);
    }

    #[test]
    fn heavy_archiving_without_replies_is_low_priority() {
        let (category, importance) = infer_from_rates(0.05, 0.85, 0.0);
        assert_eq!(category, EmailCategory::NiceToKnow);
        assert!(importance <= 0.2);
    }

    #[test]
    fn heavy_deleting_marks_sender_unwanted() {
        let (category, importance) = infer_from_rates(0.0, 0.1, 0.9);
        assert_eq!(category, EmailCategory::Spam);
        assert!(importance <= 0.1);
    }

    #[test]
    fn middling_reply_rate_is_normal_importance() {
        let (category, importance) = infer_from_rates(0.5, 0.2, 0.0);
        assert_eq!(category, EmailCategory::NiceToKnow);
        assert!((importance - 0.46).abs() < 0.01);
    }

    #[test]
    fn saturation_ramps_to_one() {
        assert!(saturation(5) < saturation(10));
        assert!(saturation(10) < saturation(20));
        assert_eq!(saturation(20), 1.0);
        assert_eq!(saturation(500), 1.0);
    }

    #[test]
    fn known_important_sender_confidence_clears_bar() {
        // emails_seen = 25, sender base 0.85: saturated, so full base applies.
        let score = score_from_stats(
            Instant::now(),
            25,
            0.92,
            0.05,
            0.0,
            0.85,
            "sender boss@company.com seen 25 times".to_string(),
        );
        assert_eq!(score.category, Some(EmailCategory::Important));
        assert!(score.importance >= 0.80);
        assert!(score.confidence >= 0.83);
    }
}
