use std::time::Instant;

use entity::sea_orm_active_enums::{PriorityLevel, QuestionType};
use indoc::indoc;
use serde::{Deserialize, Serialize};

use crate::{
    classify::EmailToClassify,
    provider::{complete_structured, BackendKind, ChatMessage, ProviderError, StructuredCompletion},
};

const BODY_PROMPT_LIMIT: usize = 4000;

const SYSTEM_PROMPT: &str = indoc! {r#"
    You extract structured work items from emails. Be conservative: extract
    only items the email states explicitly. When in doubt, omit the item.
    Never invent deadlines, assignees or options.

    Respond with only a JSON object of this shape:
    {
      "summary": string, 1-3 sentences,
      "main_topic": string,
      "sentiment": "positive" | "neutral" | "negative" | "urgent",
      "has_action_items": boolean,
      "tasks": [{"description": string, "deadline": string or null,
                 "priority": "low"|"medium"|"high"|"urgent",
                 "requires_action_from_me": boolean, "assignee": string or null,
                 "source_context": string quoting the exact sentence}],
      "decisions": [{"question": string, "options": [string],
                     "recommendation": string or null,
                     "urgency": "low"|"medium"|"high"|"urgent",
                     "requires_my_input": boolean,
                     "source_context": string quoting the exact sentence}],
      "questions": [{"question": string,
                     "question_type": "yes_no"|"information"|"clarification"|"decision"|"opinion",
                     "urgency": "low"|"medium"|"high"|"urgent",
                     "requires_response": boolean,
                     "source_context": string quoting the exact sentence}]
    }
    Every extracted item must carry a non-empty source_context. Empty arrays
    are the correct answer for emails with nothing to extract.
"#};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
    Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedTaskItem {
    pub description: String,
    pub deadline: Option<String>,
    pub priority: PriorityLevel,
    #[serde(default)]
    pub requires_action_from_me: bool,
    pub assignee: Option<String>,
    pub source_context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDecisionItem {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub recommendation: Option<String>,
    pub urgency: PriorityLevel,
    #[serde(default)]
    pub requires_my_input: bool,
    pub source_context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedQuestionItem {
    pub question: String,
    pub question_type: QuestionType,
    pub urgency: PriorityLevel,
    #[serde(default)]
    pub requires_response: bool,
    pub source_context: String,
}

/// Raw model output: items arrive as loose JSON so a malformed item can be
/// dropped without rejecting the whole extraction.
#[derive(Debug, Deserialize)]
struct ExtractionJson {
    summary: String,
    main_topic: String,
    sentiment: Sentiment,
    #[serde(default)]
    has_action_items: bool,
    #[serde(default)]
    tasks: Vec<serde_json::Value>,
    #[serde(default)]
    decisions: Vec<serde_json::Value>,
    #[serde(default)]
    questions: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub summary: String,
    pub main_topic: String,
    pub sentiment: Sentiment,
    pub has_action_items: bool,
    pub tasks: Vec<ExtractedTaskItem>,
    pub decisions: Vec<ExtractedDecisionItem>,
    pub questions: Vec<ExtractedQuestionItem>,
    pub model_provider: BackendKind,
    pub processing_time_ms: i64,
}

pub struct Extractor;

impl Extractor {
    pub async fn extract<P>(
        provider: &P,
        email: &EmailToClassify,
    ) -> Result<Extraction, ProviderError>
    where
        P: StructuredCompletion + ?Sized,
    {
        let started = Instant::now();
        let body: String = email.body().chars().take(BODY_PROMPT_LIMIT).collect();
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Extract work items from this email.\n<sender>{}</sender>\n<subject>{}</subject>\n<body>{}</body>",
                email.sender, email.subject, body
            )),
        ];

        let (raw, backend) = complete_structured::<ExtractionJson, P>(provider, &messages).await?;

        let tasks = parse_items::<ExtractedTaskItem>(raw.tasks, |t| !t.source_context.is_empty());
        let decisions =
            parse_items::<ExtractedDecisionItem>(raw.decisions, |d| !d.source_context.is_empty());
        let questions =
            parse_items::<ExtractedQuestionItem>(raw.questions, |q| !q.source_context.is_empty());

        let has_action_items =
            raw.has_action_items && !(tasks.is_empty() && decisions.is_empty() && questions.is_empty());

        Ok(Extraction {
            summary: raw.summary,
            main_topic: raw.main_topic,
            sentiment: raw.sentiment,
            has_action_items,
            tasks,
            decisions,
            questions,
            model_provider: backend,
            processing_time_ms: started.elapsed().as_millis() as i64,
        })
    }
}

/// Per-item parse with a validity predicate; invalid items are dropped, not
/// fatal. Omission is preferred over hallucination.
fn parse_items<T: serde::de::DeserializeOwned>(
    raw: Vec<serde_json::Value>,
    keep: impl Fn(&T) -> bool,
) -> Vec<T> {
    raw.into_iter()
        .filter_map(|value| match serde_json::from_value::<T>(value) {
            Ok(item) if keep(&item) => Some(item),
            Ok(_) => {
                tracing::warn!("Dropping extracted item without source context");
                None
            }
            Err(err) => {
                tracing::warn!("Dropping malformed extracted item: {err}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::common::{email_fixture, StubCompletion};

    #[tokio::test]
    async fn extracts_explicit_question() {
        let stub = StubCompletion::with_responses(vec![Ok(json!({
            "summary": "A new contact proposes a project kickoff next week.",
            "main_topic": "project kickoff",
            "sentiment": "neutral",
            "has_action_items": true,
            "questions": [{
                "question": "Would Tuesday work for the kickoff call?",
                "question_type": "yes_no",
                "urgency": "medium",
                "requires_response": true,
                "source_context": "Would Tuesday work for the kickoff call?"
            }]
        }))]);
        let email = email_fixture(
            "newcontact@partner.io",
            "Project kickoff next week",
            "Would Tuesday work for the kickoff call?",
        );

        let extraction = Extractor::extract(&stub, &email).await.unwrap();

        assert_eq!(extraction.questions.len(), 1);
        assert_eq!(extraction.questions[0].question_type, QuestionType::YesNo);
        assert!(extraction.has_action_items);
        assert!(extraction.tasks.is_empty());
    }

    #[tokio::test]
    async fn drops_items_missing_source_context() {
        let stub = StubCompletion::with_responses(vec![Ok(json!({
            "summary": "Summary.",
            "main_topic": "topic",
            "sentiment": "neutral",
            "has_action_items": true,
            "tasks": [
                {
                    "description": "Legit task",
                    "deadline": null,
                    "priority": "high",
                    "requires_action_from_me": true,
                    "assignee": null,
                    "source_context": "Please send the report by Friday."
                },
                {
                    "description": "Hallucinated task",
                    "deadline": null,
                    "priority": "low",
                    "requires_action_from_me": false,
                    "assignee": null,
                    "source_context": ""
                },
                {
                    "description": "Malformed task, missing fields"
                }
            ]
        }))]);
        let email = email_fixture("a@b.com", "Report", "Please send the report by Friday.");

        let extraction = Extractor::extract(&stub, &email).await.unwrap();

        assert_eq!(extraction.tasks.len(), 1);
        assert_eq!(extraction.tasks[0].description, "Legit task");
    }

    #[tokio::test]
    async fn empty_extraction_clears_action_flag() {
        let stub = StubCompletion::with_responses(vec![Ok(json!({
            "summary": "Nothing actionable here.",
            "main_topic": "spam",
            "sentiment": "negative",
            "has_action_items": true,
            "tasks": [],
            "decisions": [],
            "questions": []
        }))]);
        let email = email_fixture("lottery@win-now.biz", "YOU HAVE WON!!!", "");

        let extraction = Extractor::extract(&stub, &email).await.unwrap();

        assert!(!extraction.has_action_items);
    }

    #[tokio::test]
    async fn provider_failure_propagates() {
        let stub =
            StubCompletion::with_responses(vec![Err(crate::provider::ProviderError::Timeout)]);
        let email = email_fixture("a@b.com", "subject", "body");

        assert!(Extractor::extract(&stub, &email).await.is_err());
    }
}
