use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use strum::Display;

use crate::{rate_limiters::RateLimiters, server_config::cfg, HttpClient};

/// Which chat-completion back-end served a request. Primary is the local
/// endpoint, fallback the hosted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Primary,
    Fallback,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("model request timed out")]
    Timeout,
    #[error("model rate limit exceeded")]
    RateLimited,
    #[error("model transport error: {0}")]
    Transport(String),
    #[error("model api error: {0}")]
    Api(String),
    #[error("model output failed schema validation: {0}")]
    SchemaViolation(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Seam over the two-backend model provider. Implementations return the raw
/// JSON object the model produced; typed parsing and the schema-violation
/// retry live in [`complete_structured`].
#[async_trait]
pub trait StructuredCompletion: Send + Sync {
    async fn complete_json(
        &self,
        messages: &[ChatMessage],
        force: Option<BackendKind>,
    ) -> Result<(serde_json::Value, BackendKind), ProviderError>;
}

/// Parses a completion into `T`. A parse failure on the primary backend is
/// treated as a provider failure and retried exactly once on the fallback.
pub async fn complete_structured<T, P>(
    provider: &P,
    messages: &[ChatMessage],
) -> Result<(T, BackendKind), ProviderError>
where
    T: DeserializeOwned,
    P: StructuredCompletion + ?Sized,
{
    let (value, used) = provider.complete_json(messages, None).await?;
    match serde_json::from_value::<T>(value) {
        Ok(parsed) => Ok((parsed, used)),
        Err(err) if used == BackendKind::Primary => {
            tracing::warn!(
                "Primary model output failed schema validation ({err}), retrying on fallback"
            );
            let (value, used) = provider
                .complete_json(messages, Some(BackendKind::Fallback))
                .await?;
            serde_json::from_value::<T>(value)
                .map(|parsed| (parsed, used))
                .map_err(|e| ProviderError::SchemaViolation(e.to_string()))
        }
        Err(err) => Err(ProviderError::SchemaViolation(err.to_string())),
    }
}

pub struct ModelProvider {
    http_client: HttpClient,
    rate_limiters: RateLimiters,
}

impl ModelProvider {
    pub fn new(http_client: HttpClient, rate_limiters: RateLimiters) -> Self {
        Self {
            http_client,
            rate_limiters,
        }
    }

    async fn call_backend(
        &self,
        kind: BackendKind,
        messages: &[ChatMessage],
    ) -> Result<serde_json::Value, ProviderError> {
        let (endpoint, model_id, api_key) = match kind {
            BackendKind::Primary => (
                cfg.model.primary.endpoint.as_str(),
                cfg.model.primary.model_id.as_str(),
                None,
            ),
            BackendKind::Fallback => (
                cfg.model.fallback.endpoint.as_str(),
                cfg.model.fallback.model_id.as_str(),
                Some(cfg.model.fallback.api_key.as_str()),
            ),
        };

        self.rate_limiters.acquire_one().await;

        let mut request = self
            .http_client
            .post(endpoint)
            .timeout(Duration::from_millis(cfg.model.timeout_ms))
            .json(&serde_json::json!({
                "model": model_id,
                "temperature": cfg.model.temperature,
                "messages": messages,
                "response_format": { "type": "json_object" }
            }));

        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::Transport(e.to_string())
            }
        })?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            self.rate_limiters.trigger_backoff();
            return Err(ProviderError::RateLimited);
        }

        let body = resp
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let parsed =
            serde_json::from_value::<ChatApiResponseOrError>(body.clone()).map_err(|_| {
                ProviderError::Api(format!("Could not parse chat response: {}", body))
            })?;

        let parsed = match parsed {
            ChatApiResponseOrError::Error(error) => {
                if error.message.contains("rate limit") {
                    self.rate_limiters.trigger_backoff();
                    return Err(ProviderError::RateLimited);
                }
                return Err(ProviderError::Api(error.message));
            }
            ChatApiResponseOrError::Response(parsed) => parsed,
        };

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| ProviderError::Api("No choices in response".to_string()))?;

        parse_json_content(content)
            .ok_or_else(|| ProviderError::SchemaViolation("response is not a JSON object".into()))
    }
}

#[async_trait]
impl StructuredCompletion for ModelProvider {
    async fn complete_json(
        &self,
        messages: &[ChatMessage],
        force: Option<BackendKind>,
    ) -> Result<(serde_json::Value, BackendKind), ProviderError> {
        if let Some(kind) = force {
            return self
                .call_backend(kind, messages)
                .await
                .map(|value| (value, kind));
        }

        match self.call_backend(BackendKind::Primary, messages).await {
            Ok(value) => Ok((value, BackendKind::Primary)),
            Err(primary_err) => {
                tracing::warn!("Primary model backend failed ({primary_err}), trying fallback");
                self.call_backend(BackendKind::Fallback, messages)
                    .await
                    .map(|value| (value, BackendKind::Fallback))
            }
        }
    }
}

/// Models occasionally wrap JSON in markdown fences or prose. Parse directly
/// first, then salvage the outermost object.
fn parse_json_content(content: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(content) {
        if value.is_object() {
            return Some(value);
        }
    }

    static RE_FENCED: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").unwrap());
    static RE_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

    let candidate = RE_FENCED
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .or_else(|| RE_OBJECT.find(content).map(|m| m.as_str()))?;

    serde_json::from_str::<serde_json::Value>(candidate)
        .ok()
        .filter(|v| v.is_object())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ModelLength,
    Error,
    ToolCalls,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessageWire {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: i32,
    pub message: ChatMessageWire,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiResponse {
    pub choices: Vec<ChatChoice>,
    pub usage: Option<PromptUsage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiError {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatApiResponseOrError {
    Response(ChatApiResponse),
    Error(ChatApiError),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::common::StubCompletion;

    #[test]
    fn parses_plain_json_content() {
        let value = parse_json_content(r#"{"category": "spam", "confidence": 0.9}"#).unwrap();
        assert_eq!(value["category"], "spam");
    }

    #[test]
    fn salvages_fenced_json_content() {
        let content = "Here you go:\n```json\n{\"category\": \"newsletter\"}\n```";
        let value = parse_json_content(content).unwrap();
        assert_eq!(value["category"], "newsletter");
    }

    #[test]
    fn rejects_non_object_content() {
        assert!(parse_json_content("[1, 2, 3]").is_none());
        assert!(parse_json_content("no json here").is_none());
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Verdict {
        category: String,
        confidence: f32,
    }

    #[tokio::test]
    async fn complete_structured_parses_typed_response() {
        let stub = StubCompletion::with_responses(vec![Ok(
            json!({"category": "important", "confidence": 0.8}),
        )]);

        let (verdict, used) = complete_structured::<Verdict, _>(&stub, &[]).await.unwrap();
        assert_eq!(verdict.category, "important");
        assert_eq!(used, BackendKind::Primary);
    }

    #[tokio::test]
    async fn complete_structured_retries_schema_violation_on_fallback() {
        let stub = StubCompletion::with_responses(vec![
            Ok(json!({"unexpected": true})),
            Ok(json!({"category": "spam", "confidence": 0.95})),
        ]);

        let (verdict, used) = complete_structured::<Verdict, _>(&stub, &[]).await.unwrap();
        assert_eq!(verdict.category, "spam");
        assert_eq!(used, BackendKind::Fallback);
        assert_eq!(stub.forced_calls(), 1);
    }

    #[tokio::test]
    async fn complete_structured_surfaces_double_schema_failure() {
        let stub = StubCompletion::with_responses(vec![
            Ok(json!({"unexpected": true})),
            Ok(json!({"still": "wrong"})),
        ]);

        let err = complete_structured::<Verdict, _>(&stub, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::SchemaViolation(_)));
    }
}
