use std::time::Instant;

use indoc::indoc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::provider::{complete_structured, ChatMessage, StructuredCompletion};

use super::{clamp_unit, parse_category, EmailToClassify, LayerKind, LayerScore};

/// At most this many characters of body text go into the prompt.
const BODY_PROMPT_LIMIT: usize = 1000;
const MAX_KEY_SIGNALS: usize = 5;
const MAX_REASONING_CHARS: usize = 500;

const SYSTEM_PROMPT: &str = indoc! {r#"
    You are an email triage assistant. Classify the email into exactly one
    category: important, action_required, nice_to_know, newsletter,
    system_notifications, spam.

    Respond with only a JSON object of this shape:
    {
      "category": string,
      "importance_score": number between 0 and 1,
      "confidence": number between 0 and 1,
      "reasoning": string of 10 to 500 characters,
      "key_signals": array of at most 5 short strings
    }
    Do not provide explanations outside the JSON object.
"#};

#[derive(Debug, Deserialize)]
struct ModelVerdictJson {
    category: String,
    importance_score: f32,
    confidence: f32,
    reasoning: String,
    #[serde(default)]
    key_signals: Vec<String>,
}

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\r\t\n]+").unwrap());
static RE_HTTP_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://(www\.)?[-a-zA-Z0-9@:%._+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b([-a-zA-Z0-9()@:%_+.~#?&/=]*)").unwrap()
});

fn sanitize_for_prompt(input: &str) -> String {
    let collapsed = RE_WHITESPACE.replace_all(input, " ");
    RE_HTTP_LINK.replace_all(&collapsed, "[LINK]").to_string()
}

fn context_line(score: &LayerScore, label: &str) -> Option<String> {
    let category = score.category?;
    Some(format!(
        "{label} verdict: {} (importance {:.2}, confidence {:.2})",
        serde_json::to_value(category)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default(),
        score.importance,
        score.confidence,
    ))
}

fn build_user_prompt(
    email: &EmailToClassify,
    rule: &LayerScore,
    history: &LayerScore,
) -> String {
    let body: String = sanitize_for_prompt(email.body())
        .chars()
        .take(BODY_PROMPT_LIMIT)
        .collect();

    let mut prompt = format!(
        "Classify this email.\n<sender>{}</sender>\n<subject>{}</subject>\n<body>{}</body>",
        email.sender,
        sanitize_for_prompt(&email.subject),
        body
    );

    let context: Vec<String> = [
        context_line(rule, "Deterministic rule layer"),
        context_line(history, "Sender history layer"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if !context.is_empty() {
        prompt.push_str("\n\nContext from other classifiers (may be wrong):\n");
        prompt.push_str(&context.join("\n"));
    }

    prompt
}

pub struct ModelClassifier;

impl ModelClassifier {
    /// Prompts the model provider for a verdict. Provider failures and
    /// schema violations degrade to a null score; the ensemble redistributes
    /// the weight.
    pub async fn classify<P>(
        provider: &P,
        email: &EmailToClassify,
        rule: &LayerScore,
        history: &LayerScore,
    ) -> LayerScore
    where
        P: StructuredCompletion + ?Sized,
    {
        let started = Instant::now();
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_user_prompt(email, rule, history)),
        ];

        match complete_structured::<ModelVerdictJson, P>(provider, &messages).await {
            Ok((verdict, backend)) => {
                let elapsed_ms = started.elapsed().as_millis() as i64;
                match validate(verdict) {
                    Some((category, importance, confidence, reasoning)) => LayerScore {
                        layer: LayerKind::Model,
                        category: Some(category),
                        importance,
                        confidence,
                        reasoning,
                        processing_time_ms: elapsed_ms,
                        model_provider: Some(backend.to_string()),
                    },
                    None => LayerScore {
                        layer: LayerKind::Model,
                        category: None,
                        importance: 0.0,
                        confidence: 0.0,
                        reasoning: "model verdict failed validation".to_string(),
                        processing_time_ms: elapsed_ms,
                        model_provider: Some(backend.to_string()),
                    },
                }
            }
            Err(err) => {
                tracing::warn!(
                    "Model layer degraded for {}: {err}",
                    email.email_id
                );
                LayerScore {
                    layer: LayerKind::Model,
                    category: None,
                    importance: 0.0,
                    confidence: 0.0,
                    reasoning: format!("model unavailable: {err}"),
                    processing_time_ms: started.elapsed().as_millis() as i64,
                    model_provider: None,
                }
            }
        }
    }
}

fn validate(verdict: ModelVerdictJson) -> Option<(entity::sea_orm_active_enums::EmailCategory, f32, f32, String)> {
    let category = parse_category(&verdict.category)?;
    let importance = clamp_unit(verdict.importance_score);
    let confidence = clamp_unit(verdict.confidence);

    let mut reasoning: String = verdict.reasoning.chars().take(MAX_REASONING_CHARS).collect();
    let signals: Vec<String> = verdict
        .key_signals
        .into_iter()
        .take(MAX_KEY_SIGNALS)
        .collect();
    if !signals.is_empty() {
        reasoning.push_str(&format!(" [signals: {}]", signals.join(", ")));
    }

    Some((category, importance, confidence, reasoning))
}

#[cfg(test)]
mod tests {
    use entity::sea_orm_active_enums::EmailCategory;
    use serde_json::json;

    use super::*;
    use crate::{
        classify::LayerScore,
        provider::ProviderError,
        testing::common::{email_fixture, StubCompletion},
    };

    fn null_layers() -> (LayerScore, LayerScore) {
        (
            LayerScore::null(LayerKind::Rule, "none"),
            LayerScore::null(LayerKind::History, "none"),
        )
    }

    #[tokio::test]
    async fn parses_and_validates_model_verdict() {
        let stub = StubCompletion::with_responses(vec![Ok(json!({
            "category": "action_required",
            "importance_score": 0.82,
            "confidence": 0.74,
            "reasoning": "Direct request with a deadline addressed to the user.",
            "key_signals": ["deadline", "direct question"]
        }))]);
        let (rule, history) = null_layers();
        let email = email_fixture("a@b.com", "Need your sign-off", "Can you approve by Friday?");

        let score = ModelClassifier::classify(&stub, &email, &rule, &history).await;

        assert_eq!(score.category, Some(EmailCategory::ActionRequired));
        assert_eq!(score.importance, 0.82);
        assert_eq!(score.confidence, 0.74);
        assert!(score.reasoning.contains("deadline"));
        assert_eq!(score.model_provider.as_deref(), Some("primary"));
    }

    #[tokio::test]
    async fn out_of_range_scores_are_clamped() {
        let stub = StubCompletion::with_responses(vec![Ok(json!({
            "category": "important",
            "importance_score": 1.7,
            "confidence": -0.2,
            "reasoning": "Scores out of range on purpose."
        }))]);
        let (rule, history) = null_layers();
        let email = email_fixture("a@b.com", "subject", "body");

        let score = ModelClassifier::classify(&stub, &email, &rule, &history).await;

        assert_eq!(score.importance, 1.0);
        assert_eq!(score.confidence, 0.0);
    }

    #[tokio::test]
    async fn unknown_category_degrades_to_null_score() {
        let stub = StubCompletion::with_responses(vec![Ok(json!({
            "category": "mystery",
            "importance_score": 0.5,
            "confidence": 0.5,
            "reasoning": "Unknown category string."
        }))]);
        let (rule, history) = null_layers();
        let email = email_fixture("a@b.com", "subject", "body");

        let score = ModelClassifier::classify(&stub, &email, &rule, &history).await;

        assert!(score.is_null());
        assert_eq!(score.confidence, 0.0);
    }

    #[tokio::test]
    async fn provider_outage_degrades_to_null_score() {
        let stub = StubCompletion::with_responses(vec![Err(ProviderError::Timeout)]);
        let (rule, history) = null_layers();
        let email = email_fixture("a@b.com", "subject", "body");

        let score = ModelClassifier::classify(&stub, &email, &rule, &history).await;

        assert!(score.is_null());
        assert_eq!(score.confidence, 0.0);
    }

    #[test]
    fn prompt_includes_layer_context_when_available() {
        let email = email_fixture("news@letter.io", "Weekly digest", "Unsubscribe here");
        let rule = LayerScore {
            layer: LayerKind::Rule,
            category: Some(EmailCategory::Newsletter),
            importance: 0.3,
            confidence: 0.65,
            reasoning: "newsletter markers".to_string(),
            processing_time_ms: 0,
            model_provider: None,
        };
        let history = LayerScore::null(LayerKind::History, "none");

        let prompt = build_user_prompt(&email, &rule, &history);
        assert!(prompt.contains("Deterministic rule layer"));
        assert!(prompt.contains("newsletter"));
        assert!(!prompt.contains("Sender history layer"));
    }

    #[test]
    fn prompt_truncates_body_and_scrubs_links() {
        let long_body = format!("See https://example.com/path {}", "x".repeat(3000));
        let email = email_fixture("a@b.com", "subject", &long_body);
        let (rule, history) = null_layers();

        let prompt = build_user_prompt(&email, &rule, &history);
        assert!(prompt.contains("[LINK]"));
        assert!(prompt.len() < 1700);
    }
}
