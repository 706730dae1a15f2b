use entity::sea_orm_active_enums::EmailCategory;
use serde::{Deserialize, Serialize};

use crate::{
    classify::history::infer_from_rates,
    db_core::prelude::DatabaseConnection,
    error::AppResult,
    events::{EventCtrl, EventType, NewEvent},
    model::preference::{PrefStats, PreferenceCtrl},
    server_config::cfg,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackAction {
    Reply,
    Archive,
    Delete,
    Star,
    Unstar,
    LabelChange,
    Move,
    ReviewApprove,
    ReviewReject,
    ReviewModify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSource {
    Implicit,
    ReviewQueue,
}

/// One observed user action against a message, implicit (provider state) or
/// explicit (review-queue transition).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackSignal {
    pub action: FeedbackAction,
    pub account_id: String,
    pub email_id: String,
    pub sender: String,
    pub sender_domain: String,
    pub prior_category: EmailCategory,
    pub new_category: Option<EmailCategory>,
    pub prior_importance: f32,
    pub source: FeedbackSource,
}

/// Which rates this signal is informative about. `None` leaves a rate
/// untouched; `Some(x)` feeds `x` into the EMA.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateObservation {
    pub reply: Option<bool>,
    pub archive: Option<bool>,
    pub delete: Option<bool>,
    pub star_delta: i32,
}

/// What an action against a message of the given category says about the
/// sender, when the user confirms the category is right.
fn category_observation(category: EmailCategory) -> RateObservation {
    match category {
        EmailCategory::Important | EmailCategory::ActionRequired => RateObservation {
            reply: Some(true),
            ..Default::default()
        },
        EmailCategory::Newsletter
        | EmailCategory::NiceToKnow
        | EmailCategory::SystemNotifications => RateObservation {
            archive: Some(true),
            reply: Some(false),
            ..Default::default()
        },
        EmailCategory::Spam => RateObservation {
            delete: Some(true),
            reply: Some(false),
            ..Default::default()
        },
    }
}

/// A rejection observes a zero for the rate the suggested category implied.
fn inverted_observation(category: EmailCategory) -> RateObservation {
    match category {
        EmailCategory::Important | EmailCategory::ActionRequired => RateObservation {
            reply: Some(false),
            ..Default::default()
        },
        EmailCategory::Newsletter
        | EmailCategory::NiceToKnow
        | EmailCategory::SystemNotifications => RateObservation {
            archive: Some(false),
            ..Default::default()
        },
        EmailCategory::Spam => RateObservation {
            delete: Some(false),
            ..Default::default()
        },
    }
}

pub fn observation_for(signal: &FeedbackSignal) -> RateObservation {
    match signal.action {
        FeedbackAction::Reply => RateObservation {
            reply: Some(true),
            ..Default::default()
        },
        FeedbackAction::Archive => RateObservation {
            archive: Some(true),
            reply: Some(false),
            ..Default::default()
        },
        FeedbackAction::Delete => RateObservation {
            delete: Some(true),
            reply: Some(false),
            ..Default::default()
        },
        FeedbackAction::Star => RateObservation {
            star_delta: 1,
            ..Default::default()
        },
        FeedbackAction::Unstar => RateObservation {
            star_delta: -1,
            ..Default::default()
        },
        // Label moves carry no reply/archive/delete information; only the
        // sighting itself is recorded.
        FeedbackAction::LabelChange | FeedbackAction::Move => RateObservation::default(),
        FeedbackAction::ReviewApprove => category_observation(signal.prior_category),
        FeedbackAction::ReviewReject => inverted_observation(signal.prior_category),
        FeedbackAction::ReviewModify => {
            category_observation(signal.new_category.unwrap_or(signal.prior_category))
        }
    }
}

fn ema(old: f32, observed: bool, alpha: f32) -> f32 {
    alpha * (observed as u8 as f32) + (1.0 - alpha) * old
}

pub fn apply_observation(mut stats: PrefStats, obs: RateObservation, alpha: f32) -> PrefStats {
    stats.emails_seen += 1;

    if obs.reply == Some(true) {
        stats.replies += 1;
    }
    if obs.archive == Some(true) {
        stats.archives += 1;
    }
    if obs.delete == Some(true) {
        stats.deletes += 1;
    }
    stats.stars = (stats.stars + obs.star_delta).max(0);

    if let Some(observed) = obs.reply {
        stats.reply_rate = ema(stats.reply_rate, observed, alpha);
    }
    if let Some(observed) = obs.archive {
        stats.archive_rate = ema(stats.archive_rate, observed, alpha);
    }
    if let Some(observed) = obs.delete {
        stats.delete_rate = ema(stats.delete_rate, observed, alpha);
    }

    stats.inferred_importance =
        infer_from_rates(stats.reply_rate, stats.archive_rate, stats.delete_rate).1;

    stats
}

pub struct FeedbackTracker;

impl FeedbackTracker {
    /// Folds one signal into the sender and domain preference rows and
    /// appends the USER_FEEDBACK event. Callers that originate in the
    /// review queue emit their REVIEW_* event before invoking this.
    pub async fn record(conn: &DatabaseConnection, signal: FeedbackSignal) -> AppResult<()> {
        let alpha = cfg.history.learning_rate_alpha;
        let obs = observation_for(&signal);

        PreferenceCtrl::apply_sender(conn, &signal.account_id, &signal.sender, |stats| {
            apply_observation(stats, obs, alpha)
        })
        .await?;

        if !signal.sender_domain.is_empty() {
            PreferenceCtrl::apply_domain(conn, &signal.account_id, &signal.sender_domain, |stats| {
                apply_observation(stats, obs, alpha)
            })
            .await?;
        }

        EventCtrl::append(
            conn,
            NewEvent::new(EventType::UserFeedback, signal.account_id.clone())
                .email_id(signal.email_id.clone())
                .payload(serde_json::to_value(&signal).unwrap_or_default()),
        )
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALPHA: f32 = 0.15;

    fn signal(action: FeedbackAction) -> FeedbackSignal {
        FeedbackSignal {
            action,
            account_id: "acct-1".to_string(),
            email_id: "msg-1".to_string(),
            sender: "boss@company.com".to_string(),
            sender_domain: "company.com".to_string(),
            prior_category: EmailCategory::Newsletter,
            new_category: None,
            prior_importance: 0.3,
            source: FeedbackSource::Implicit,
        }
    }

    #[test]
    fn ema_update_is_exact() {
        let stats = PrefStats {
            reply_rate: 0.4,
            ..Default::default()
        };
        let updated = apply_observation(
            stats,
            RateObservation {
                reply: Some(true),
                ..Default::default()
            },
            ALPHA,
        );

        assert!((updated.reply_rate - (0.15 + 0.85 * 0.4)).abs() < 1e-6);
    }

    #[test]
    fn reply_signal_only_touches_reply_rate() {
        let stats = PrefStats {
            reply_rate: 0.5,
            archive_rate: 0.5,
            delete_rate: 0.5,
            ..Default::default()
        };
        let obs = observation_for(&signal(FeedbackAction::Reply));
        let updated = apply_observation(stats, obs, ALPHA);

        assert!(updated.reply_rate > 0.5);
        assert_eq!(updated.archive_rate, 0.5);
        assert_eq!(updated.delete_rate, 0.5);
        assert_eq!(updated.replies, 1);
        assert_eq!(updated.emails_seen, 1);
    }

    #[test]
    fn archive_signal_decays_reply_rate() {
        let stats = PrefStats {
            reply_rate: 0.6,
            ..Default::default()
        };
        let obs = observation_for(&signal(FeedbackAction::Archive));
        let updated = apply_observation(stats, obs, ALPHA);

        assert!((updated.reply_rate - 0.85 * 0.6).abs() < 1e-6);
        assert!((updated.archive_rate - 0.15).abs() < 1e-6);
        assert_eq!(updated.archives, 1);
    }

    #[test]
    fn modify_to_important_observes_a_reply() {
        let mut s = signal(FeedbackAction::ReviewModify);
        s.new_category = Some(EmailCategory::Important);
        s.source = FeedbackSource::ReviewQueue;

        let obs = observation_for(&s);
        assert_eq!(obs.reply, Some(true));

        let prior = PrefStats {
            reply_rate: 0.2,
            ..Default::default()
        };
        let updated = apply_observation(prior, obs, ALPHA);
        // reply_rate increased by alpha relative to the prior value
        assert!((updated.reply_rate - (0.15 + 0.85 * 0.2)).abs() < 1e-6);
    }

    #[test]
    fn reject_of_important_suggestion_observes_no_reply() {
        let mut s = signal(FeedbackAction::ReviewReject);
        s.prior_category = EmailCategory::Important;

        let obs = observation_for(&s);
        assert_eq!(obs.reply, Some(false));
        assert_eq!(obs.archive, None);
        assert_eq!(obs.delete, None);
    }

    #[test]
    fn approve_of_spam_suggestion_observes_a_delete() {
        let mut s = signal(FeedbackAction::ReviewApprove);
        s.prior_category = EmailCategory::Spam;

        let obs = observation_for(&s);
        assert_eq!(obs.delete, Some(true));
        assert_eq!(obs.reply, Some(false));
    }

    #[test]
    fn star_signals_move_counters_not_rates() {
        let obs = observation_for(&signal(FeedbackAction::Star));
        let updated = apply_observation(PrefStats::default(), obs, ALPHA);

        assert_eq!(updated.stars, 1);
        assert_eq!(updated.reply_rate, 0.0);

        let obs = observation_for(&signal(FeedbackAction::Unstar));
        let updated = apply_observation(updated, obs, ALPHA);
        assert_eq!(updated.stars, 0);
    }

    #[test]
    fn inferred_importance_tracks_reply_rate() {
        let mut stats = PrefStats::default();
        let obs = RateObservation {
            reply: Some(true),
            ..Default::default()
        };
        // Enough confirmed replies push the EMA over the important bar.
        for _ in 0..12 {
            stats = apply_observation(stats, obs, ALPHA);
        }

        assert!(stats.reply_rate >= 0.7);
        assert!(stats.inferred_importance >= 0.8);
    }
}
