use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod client;

pub use client::GatewayMailClient;

/// Minimal reference to a provider-side message. Bodies are fetched
/// separately; the fetch subsystem owns their storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessageRef {
    pub account_id: String,
    pub email_id: String,
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub filename: String,
    pub size: i64,
    pub mime: String,
    pub hash: String,
    pub stored_path: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchedEmail {
    pub email_id: String,
    pub thread_id: Option<String>,
    pub subject: Option<String>,
    pub sender: String,
    pub received_at: DateTime<Utc>,
    pub text: Option<String>,
    pub html: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentMeta>,
    pub thread_position: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageListPage {
    #[serde(default)]
    pub messages: Vec<MessageListEntry>,
    pub next_page_token: Option<String>,
    pub result_size_estimate: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageListEntry {
    pub email_id: String,
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageListOptions {
    pub query: Option<String>,
    pub page_token: Option<String>,
    pub max_results: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionInfo {
    pub expires_at: DateTime<Utc>,
    pub history_id: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum MailApiError {
    #[error("mail provider denied access: {0}")]
    Permission(String),
    #[error("mail resource not found: {0}")]
    NotFound(String),
    #[error("mail transport error: {0}")]
    Transport(String),
    #[error("mail api error: {0}")]
    Api(String),
}

/// Interface to the external mail gateway. The gateway owns OAuth/IMAP
/// transport; the engine only consumes these operations.
#[async_trait]
pub trait MailClient: Send + Sync {
    async fn list_messages(
        &self,
        account_id: &str,
        options: &MessageListOptions,
    ) -> Result<MessageListPage, MailApiError>;

    /// Message ids added to the mailbox since the given history marker.
    async fn enumerate_history(
        &self,
        account_id: &str,
        since_history_id: i64,
    ) -> Result<Vec<String>, MailApiError>;

    async fn fetch_body(
        &self,
        account_id: &str,
        email_id: &str,
    ) -> Result<FetchedEmail, MailApiError>;

    async fn subscribe(
        &self,
        account_id: &str,
        topic: &str,
    ) -> Result<SubscriptionInfo, MailApiError>;

    async fn renew_subscription(
        &self,
        account_id: &str,
        topic: &str,
    ) -> Result<SubscriptionInfo, MailApiError>;

    async fn stop_subscription(&self, account_id: &str) -> Result<(), MailApiError>;

    async fn apply_label(
        &self,
        account_id: &str,
        email_id: &str,
        label: &str,
    ) -> Result<(), MailApiError>;

    async fn archive(&self, account_id: &str, email_id: &str) -> Result<(), MailApiError>;

    async fn mark_read(&self, account_id: &str, email_id: &str) -> Result<(), MailApiError>;
}

/// Extract the bare address from a `From` header like `Name <a@b.com>`.
pub fn sender_address(from_field: &str) -> String {
    if let Some(start) = from_field.find('<') {
        if let Some(end) = from_field.find('>') {
            if end > start {
                return from_field[start + 1..end].trim().to_lowercase();
            }
        }
    }
    from_field.trim().to_lowercase()
}

pub fn sender_domain(address: &str) -> String {
    match address.rfind('@') {
        Some(at) => address[at + 1..].trim_end_matches('>').to_lowercase(),
        None => String::new(),
    }
}

/// Derive plain text from an HTML body when the gateway has no text part.
pub fn text_from_html(html: &str) -> Option<String> {
    let text = html2text::from_read(html.as_bytes(), 100);
    (!text.trim().is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_address_strips_display_name() {
        assert_eq!(
            sender_address("Jane Doe <Jane@Customer.com>"),
            "jane@customer.com"
        );
        assert_eq!(sender_address("bare@example.com"), "bare@example.com");
        assert_eq!(
            sender_address("\"Support\" <support@corp.io>"),
            "support@corp.io"
        );
    }

    #[test]
    fn sender_domain_lowercases_and_handles_missing_at() {
        assert_eq!(sender_domain("boss@Company.COM"), "company.com");
        assert_eq!(sender_domain("not-an-address"), "");
    }

    #[test]
    fn text_from_html_flattens_markup() {
        let text = text_from_html("<html><body><p>Hello <b>world</b></p></body></html>").unwrap();
        assert!(text.contains("Hello"));
        assert!(text.contains("world"));
        assert!(!text.contains("<p>"));
    }
}
