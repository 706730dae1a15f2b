use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;

use crate::{server_config::cfg, HttpClient};

use super::{
    FetchedEmail, MailApiError, MailClient, MessageListOptions, MessageListPage, SubscriptionInfo,
};

macro_rules! gateway_url {
    ($($segment:expr),*) => {
        {
            let segments: Vec<String> = vec![$($segment.to_string()),*];
            format!("{}/v1/{}", cfg.mail.gateway_url.trim_end_matches('/'), segments.join("/"))
        }
    };
}

/// HTTP client for the external mail gateway. The gateway fronts the actual
/// providers (Gmail-style APIs and IMAP) and owns credentials; this client
/// only speaks its JSON surface.
pub struct GatewayMailClient {
    http_client: HttpClient,
}

impl GatewayMailClient {
    pub fn new(http_client: HttpClient) -> Self {
        Self { http_client }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(cfg.mail.timeout_ms)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        query: &[(String, String)],
    ) -> Result<T, MailApiError> {
        let resp = self
            .http_client
            .get(url)
            .query(query)
            .timeout(self.timeout())
            .send()
            .await
            .map_err(transport_error)?;

        decode_response(resp).await
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        body: serde_json::Value,
    ) -> Result<T, MailApiError> {
        let resp = self
            .http_client
            .post(url)
            .json(&body)
            .timeout(self.timeout())
            .send()
            .await
            .map_err(transport_error)?;

        decode_response(resp).await
    }

    async fn post_unit(&self, url: String, body: serde_json::Value) -> Result<(), MailApiError> {
        let resp = self
            .http_client
            .post(url)
            .json(&body)
            .timeout(self.timeout())
            .send()
            .await
            .map_err(transport_error)?;

        check_status(resp.status())?;
        Ok(())
    }
}

fn transport_error(e: reqwest::Error) -> MailApiError {
    MailApiError::Transport(e.to_string())
}

fn check_status(status: StatusCode) -> Result<(), MailApiError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(MailApiError::Permission(status.to_string()))
        }
        StatusCode::NOT_FOUND => Err(MailApiError::NotFound(status.to_string())),
        s => Err(MailApiError::Api(format!("gateway returned {s}"))),
    }
}

async fn decode_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, MailApiError> {
    check_status(resp.status())?;
    resp.json::<T>()
        .await
        .map_err(|e| MailApiError::Api(format!("invalid gateway response: {e}")))
}

#[async_trait]
impl MailClient for GatewayMailClient {
    async fn list_messages(
        &self,
        account_id: &str,
        options: &MessageListOptions,
    ) -> Result<MessageListPage, MailApiError> {
        let mut query = vec![("max_results".to_string(), options.max_results.to_string())];
        if let Some(q) = &options.query {
            query.push(("q".to_string(), q.clone()));
        }
        if let Some(token) = &options.page_token {
            query.push(("page_token".to_string(), token.clone()));
        }

        self.get_json(gateway_url!("accounts", account_id, "messages"), &query)
            .await
    }

    async fn enumerate_history(
        &self,
        account_id: &str,
        since_history_id: i64,
    ) -> Result<Vec<String>, MailApiError> {
        #[derive(serde::Deserialize)]
        struct HistoryResponse {
            #[serde(default)]
            email_ids: Vec<String>,
        }

        let resp: HistoryResponse = self
            .get_json(
                gateway_url!("accounts", account_id, "history"),
                &[("since".to_string(), since_history_id.to_string())],
            )
            .await?;

        Ok(resp.email_ids)
    }

    async fn fetch_body(
        &self,
        account_id: &str,
        email_id: &str,
    ) -> Result<FetchedEmail, MailApiError> {
        self.get_json(
            gateway_url!("accounts", account_id, "messages", email_id),
            &[],
        )
        .await
    }

    async fn subscribe(
        &self,
        account_id: &str,
        topic: &str,
    ) -> Result<SubscriptionInfo, MailApiError> {
        self.post_json(
            gateway_url!("accounts", account_id, "subscription"),
            json!({ "topic": topic }),
        )
        .await
    }

    async fn renew_subscription(
        &self,
        account_id: &str,
        topic: &str,
    ) -> Result<SubscriptionInfo, MailApiError> {
        self.post_json(
            gateway_url!("accounts", account_id, "subscription", "renew"),
            json!({ "topic": topic }),
        )
        .await
    }

    async fn stop_subscription(&self, account_id: &str) -> Result<(), MailApiError> {
        self.post_unit(
            gateway_url!("accounts", account_id, "subscription", "stop"),
            json!({}),
        )
        .await
    }

    async fn apply_label(
        &self,
        account_id: &str,
        email_id: &str,
        label: &str,
    ) -> Result<(), MailApiError> {
        self.post_unit(
            gateway_url!("accounts", account_id, "messages", email_id, "label"),
            json!({ "label": label }),
        )
        .await
    }

    async fn archive(&self, account_id: &str, email_id: &str) -> Result<(), MailApiError> {
        self.post_unit(
            gateway_url!("accounts", account_id, "messages", email_id, "archive"),
            json!({}),
        )
        .await
    }

    async fn mark_read(&self, account_id: &str, email_id: &str) -> Result<(), MailApiError> {
        self.post_unit(
            gateway_url!("accounts", account_id, "messages", email_id, "read"),
            json!({}),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_error_taxonomy() {
        assert!(check_status(StatusCode::OK).is_ok());
        assert!(matches!(
            check_status(StatusCode::FORBIDDEN),
            Err(MailApiError::Permission(_))
        ));
        assert!(matches!(
            check_status(StatusCode::NOT_FOUND),
            Err(MailApiError::NotFound(_))
        ));
        assert!(matches!(
            check_status(StatusCode::BAD_GATEWAY),
            Err(MailApiError::Api(_))
        ));
    }
}
