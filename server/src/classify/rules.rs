use std::time::Instant;

use entity::sea_orm_active_enums::EmailCategory;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{EmailToClassify, LayerKind, LayerScore};

const SPAM_THRESHOLD: u32 = 3;
const AUTO_REPLY_THRESHOLD: u32 = 2;
const NEWSLETTER_THRESHOLD: u32 = 2;
const SYSTEM_THRESHOLD: u32 = 2;

const SPAM_PHRASES: &[&str] = &[
    "you have won",
    "winner",
    "claim",
    "prize",
    "lottery",
    "jackpot",
    "free money",
    "risk free",
    "act now",
    "limited time offer",
    "wire transfer",
    "unclaimed inheritance",
    "guaranteed returns",
];

const AUTO_REPLY_MARKERS: &[&str] = &[
    "out of office",
    "automatic reply",
    "auto-reply",
    "autoreply",
    "away until",
    "on vacation",
    "on annual leave",
    "i will respond when i return",
    "limited access to email",
];

const NEWSLETTER_MARKERS: &[&str] = &[
    "unsubscribe",
    "list-unsubscribe",
    "view this email in your browser",
    "view in browser",
    "email preferences",
    "manage your subscription",
    "no longer wish to receive",
    "newsletter",
    "weekly digest",
    "monthly digest",
];

/// Sender local parts that mark automated mail.
const NO_REPLY_SENDERS: &[&str] = &[
    "noreply",
    "no-reply",
    "donotreply",
    "do-not-reply",
    "notifications@",
    "notify@",
    "alerts@",
    "mailer-daemon",
    "postmaster",
    "system@",
];

const SYSTEM_KEYWORDS: &[&str] = &[
    "password reset",
    "verification code",
    "security alert",
    "new sign-in",
    "your account",
    "order confirmation",
    "payment received",
    "receipt",
    "invoice",
    "shipping confirmation",
    "terms of service",
];

const SUSPICIOUS_TLDS: &[&str] = &[".biz", ".top", ".click", ".loan", ".win", ".work"];

static RE_MONEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[$€£]\s?\d[\d,.]*").unwrap());
static RE_REPEATED_BANG: Lazy<Regex> = Lazy::new(|| Regex::new(r"!{2,}").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Detector {
    // Declaration order is the tie-break order.
    Spam,
    AutoReply,
    Newsletter,
    System,
}

#[derive(Debug, Default)]
struct DetectorHit {
    score: u32,
    signals: Vec<&'static str>,
}

impl DetectorHit {
    fn add(&mut self, signal: &'static str) {
        self.score += 1;
        self.signals.push(signal);
    }
}

fn scan_phrases(hit: &mut DetectorHit, haystack: &str, phrases: &'static [&'static str]) {
    for phrase in phrases {
        if haystack.contains(phrase) {
            hit.add(phrase);
        }
    }
}

fn spam_signals(subject: &str, body: &str, sender: &str) -> DetectorHit {
    let mut hit = DetectorHit::default();
    let haystack = format!("{subject} {body} {sender}");
    scan_phrases(&mut hit, &haystack, SPAM_PHRASES);

    if RE_MONEY.is_match(&haystack) {
        hit.add("money amount");
    }
    if RE_REPEATED_BANG.is_match(subject) {
        hit.add("repeated exclamation marks");
    }
    if is_shouting(subject) {
        hit.add("all-caps subject");
    }
    if SUSPICIOUS_TLDS.iter().any(|tld| sender.ends_with(tld)) {
        hit.add("suspicious sender tld");
    }

    hit
}

fn auto_reply_signals(subject: &str, body: &str, sender: &str) -> DetectorHit {
    let mut hit = DetectorHit::default();
    let haystack = format!("{subject} {body}");
    scan_phrases(&mut hit, &haystack, AUTO_REPLY_MARKERS);

    if subject.starts_with("auto:") || subject.starts_with("automatic reply:") {
        hit.add("auto-reply subject prefix");
    }
    if sender.contains("mailer-daemon") || sender.contains("postmaster") {
        hit.add("daemon sender");
    }

    hit
}

fn newsletter_signals(subject: &str, body: &str, sender: &str) -> DetectorHit {
    let mut hit = DetectorHit::default();
    let haystack = format!("{subject} {body}");
    scan_phrases(&mut hit, &haystack, NEWSLETTER_MARKERS);

    if ["newsletter@", "news@", "digest@", "updates@"]
        .iter()
        .any(|prefix| sender.starts_with(prefix))
    {
        hit.add("newsletter sender");
    }

    hit
}

fn system_signals(subject: &str, body: &str, sender: &str) -> DetectorHit {
    let mut hit = DetectorHit::default();

    if NO_REPLY_SENDERS.iter().any(|p| sender.contains(p)) {
        hit.add("no-reply sender");
    }

    let haystack = format!("{subject} {body}");
    scan_phrases(&mut hit, &haystack, SYSTEM_KEYWORDS);

    hit
}

fn is_shouting(subject: &str) -> bool {
    let letters: Vec<char> = subject.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < 8 {
        return false;
    }
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    upper as f32 / letters.len() as f32 > 0.6
}

/// Deterministic, stateless classification over (subject, body, sender).
/// The highest-scoring detector above its threshold wins; ties break in the
/// order spam > auto-reply > newsletter > system.
pub fn classify(email: &EmailToClassify) -> LayerScore {
    let started = Instant::now();

    let subject = email.subject.to_lowercase();
    let body = email.body().to_lowercase();
    let sender = email.sender.to_lowercase();

    let detections = [
        (Detector::Spam, spam_signals(&subject, &body, &sender), SPAM_THRESHOLD),
        (
            Detector::AutoReply,
            auto_reply_signals(&subject, &body, &sender),
            AUTO_REPLY_THRESHOLD,
        ),
        (
            Detector::Newsletter,
            newsletter_signals(&subject, &body, &sender),
            NEWSLETTER_THRESHOLD,
        ),
        (
            Detector::System,
            system_signals(&subject, &body, &sender),
            SYSTEM_THRESHOLD,
        ),
    ];

    let winner = detections
        .iter()
        .filter(|(_, hit, threshold)| hit.score >= *threshold)
        .max_by(|(da, a, _), (db, b, _)| a.score.cmp(&b.score).then(db.cmp(da)));

    let elapsed_ms = started.elapsed().as_millis() as i64;

    match winner {
        Some((detector, hit, _)) => {
            // Auto-reply/newsletter/system confidences are kept low on
            // purpose so the remaining layers still weigh in; only spam is
            // decisive.
            let (category, importance, confidence, label) = match detector {
                Detector::Spam => (EmailCategory::Spam, 0.00, 0.95, "spam"),
                Detector::AutoReply => {
                    (EmailCategory::SystemNotifications, 0.10, 0.70, "auto-reply")
                }
                Detector::Newsletter => (EmailCategory::Newsletter, 0.30, 0.65, "newsletter"),
                Detector::System => {
                    (EmailCategory::SystemNotifications, 0.40, 0.50, "system-notification")
                }
            };

            LayerScore {
                layer: LayerKind::Rule,
                category: Some(category),
                importance,
                confidence,
                reasoning: format!(
                    "{label} detector matched {} signal(s): {}",
                    hit.score,
                    hit.signals.join(", ")
                ),
                processing_time_ms: elapsed_ms,
                model_provider: None,
            }
        }
        None => LayerScore {
            layer: LayerKind::Rule,
            category: None,
            importance: 0.0,
            confidence: 0.0,
            reasoning: "no deterministic signal matched".to_string(),
            processing_time_ms: elapsed_ms,
            model_provider: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::common::email_fixture;

    #[test]
    fn lottery_spam_scores_decisively() {
        let email = email_fixture(
            "lottery@win-now.biz",
            "YOU HAVE WON!!! Claim $1,000,000 NOW",
            "",
        );
        let score = classify(&email);

        assert_eq!(score.category, Some(EmailCategory::Spam));
        assert_eq!(score.confidence, 0.95);
        assert_eq!(score.importance, 0.00);
    }

    #[test]
    fn spam_threshold_is_exactly_three_signals() {
        // claim + prize + repeated exclamations = 3
        let at_threshold = email_fixture("promo@deals.com", "Claim your prize now!!!", "");
        let score = classify(&at_threshold);
        assert_eq!(score.category, Some(EmailCategory::Spam));
        assert_eq!(score.confidence, 0.95);

        // claim + prize = 2, below the spam threshold
        let below = email_fixture("promo@deals.com", "Claim your prize", "");
        let score = classify(&below);
        assert!(score.confidence < 0.95);
        assert_ne!(score.category, Some(EmailCategory::Spam));
    }

    #[test]
    fn out_of_office_is_an_auto_reply() {
        let email = email_fixture(
            "colleague@corp.com",
            "Automatic reply: project sync",
            "I am out of office and will respond when I return.",
        );
        let score = classify(&email);

        assert_eq!(score.category, Some(EmailCategory::SystemNotifications));
        assert_eq!(score.confidence, 0.70);
        assert_eq!(score.importance, 0.10);
    }

    #[test]
    fn unsubscribe_footer_marks_newsletter() {
        let email = email_fixture(
            "newsletter@techdigest.io",
            "Your weekly digest",
            "Top stories this week... Unsubscribe | View this email in your browser",
        );
        let score = classify(&email);

        assert_eq!(score.category, Some(EmailCategory::Newsletter));
        assert_eq!(score.confidence, 0.65);
        assert_eq!(score.importance, 0.30);
    }

    #[test]
    fn no_reply_sender_with_system_keyword_is_system_notification() {
        let email = email_fixture(
            "no-reply@accounts.service.com",
            "Security alert for your account",
            "",
        );
        let score = classify(&email);

        assert_eq!(score.category, Some(EmailCategory::SystemNotifications));
        assert_eq!(score.confidence, 0.50);
        assert_eq!(score.importance, 0.40);
    }

    #[test]
    fn plain_human_mail_returns_null_score() {
        let email = email_fixture(
            "newcontact@partner.io",
            "Project kickoff next week",
            "Could you join the kickoff call on Tuesday?",
        );
        let score = classify(&email);

        assert!(score.is_null());
        assert_eq!(score.confidence, 0.0);
    }

    #[test]
    fn classification_is_deterministic() {
        let email = email_fixture("sender@a.com", "Claim your prize now!!!", "body");
        let a = classify(&email);
        let b = classify(&email);

        assert_eq!(a.category, b.category);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.reasoning, b.reasoning);
    }
}
