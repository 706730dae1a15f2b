use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering::Relaxed},
        Mutex,
    },
};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::{
    classify::EmailToClassify,
    mail::{
        FetchedEmail, MailApiError, MailClient, MessageListOptions, MessageListPage,
        SubscriptionInfo,
    },
    provider::{BackendKind, ChatMessage, ProviderError, StructuredCompletion},
};

pub fn email_fixture(sender: &str, subject: &str, body: &str) -> EmailToClassify {
    let sender = crate::mail::sender_address(sender);
    let sender_domain = crate::mail::sender_domain(&sender);
    EmailToClassify {
        account_id: "acct-test".to_string(),
        email_id: "msg-test".to_string(),
        thread_id: None,
        subject: subject.to_string(),
        sender,
        sender_domain,
        received_at: Utc::now(),
        body_text: if body.is_empty() {
            None
        } else {
            Some(body.to_string())
        },
        has_attachments: false,
    }
}

pub fn fetched_fixture(
    email_id: &str,
    sender: &str,
    subject: &str,
    text: Option<&str>,
) -> FetchedEmail {
    FetchedEmail {
        email_id: email_id.to_string(),
        thread_id: None,
        subject: Some(subject.to_string()),
        sender: sender.to_string(),
        received_at: Utc::now(),
        text: text.map(str::to_string),
        html: None,
        attachments: vec![],
        thread_position: None,
    }
}

/// Canned completion backend: pops one queued response per call, in order.
/// Forced-fallback calls are counted so tests can assert the retry path.
pub struct StubCompletion {
    responses: Mutex<VecDeque<Result<serde_json::Value, ProviderError>>>,
    forced: AtomicUsize,
}

impl StubCompletion {
    pub fn with_responses(responses: Vec<Result<serde_json::Value, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            forced: AtomicUsize::new(0),
        }
    }

    pub fn forced_calls(&self) -> usize {
        self.forced.load(Relaxed)
    }
}

#[async_trait]
impl StructuredCompletion for StubCompletion {
    async fn complete_json(
        &self,
        _messages: &[ChatMessage],
        force: Option<BackendKind>,
    ) -> Result<(serde_json::Value, BackendKind), ProviderError> {
        if force.is_some() {
            self.forced.fetch_add(1, Relaxed);
        }

        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("StubCompletion ran out of queued responses");

        next.map(|value| (value, force.unwrap_or(BackendKind::Primary)))
    }
}

/// In-memory mail gateway: serves queued pages and fixture bodies, records
/// the write actions the engine takes.
#[derive(Default)]
pub struct StubMailClient {
    pub pages: Mutex<VecDeque<MessageListPage>>,
    pub bodies: Mutex<HashMap<String, FetchedEmail>>,
    pub history_ids: Mutex<Vec<String>>,
    pub labeled: Mutex<Vec<(String, String)>>,
    pub archived: Mutex<Vec<String>>,
    pub marked_read: Mutex<Vec<String>>,
}

impl StubMailClient {
    pub fn with_bodies(bodies: Vec<FetchedEmail>) -> Self {
        let map = bodies
            .into_iter()
            .map(|b| (b.email_id.clone(), b))
            .collect();
        Self {
            bodies: Mutex::new(map),
            ..Default::default()
        }
    }
}

#[async_trait]
impl MailClient for StubMailClient {
    async fn list_messages(
        &self,
        _account_id: &str,
        _options: &MessageListOptions,
    ) -> Result<MessageListPage, MailApiError> {
        Ok(self.pages.lock().unwrap().pop_front().unwrap_or(
            MessageListPage {
                messages: vec![],
                next_page_token: None,
                result_size_estimate: Some(0),
            },
        ))
    }

    async fn enumerate_history(
        &self,
        _account_id: &str,
        _since_history_id: i64,
    ) -> Result<Vec<String>, MailApiError> {
        Ok(self.history_ids.lock().unwrap().clone())
    }

    async fn fetch_body(
        &self,
        _account_id: &str,
        email_id: &str,
    ) -> Result<FetchedEmail, MailApiError> {
        self.bodies
            .lock()
            .unwrap()
            .get(email_id)
            .cloned()
            .ok_or_else(|| MailApiError::NotFound(email_id.to_string()))
    }

    async fn subscribe(
        &self,
        _account_id: &str,
        _topic: &str,
    ) -> Result<SubscriptionInfo, MailApiError> {
        Ok(SubscriptionInfo {
            expires_at: Utc::now() + Duration::days(7),
            history_id: 1,
        })
    }

    async fn renew_subscription(
        &self,
        _account_id: &str,
        _topic: &str,
    ) -> Result<SubscriptionInfo, MailApiError> {
        Ok(SubscriptionInfo {
            expires_at: Utc::now() + Duration::days(7),
            history_id: 1,
        })
    }

    async fn stop_subscription(&self, _account_id: &str) -> Result<(), MailApiError> {
        Ok(())
    }

    async fn apply_label(
        &self,
        _account_id: &str,
        email_id: &str,
        label: &str,
    ) -> Result<(), MailApiError> {
        self.labeled
            .lock()
            .unwrap()
            .push((email_id.to_string(), label.to_string()));
        Ok(())
    }

    async fn archive(&self, _account_id: &str, email_id: &str) -> Result<(), MailApiError> {
        self.archived.lock().unwrap().push(email_id.to_string());
        Ok(())
    }

    async fn mark_read(&self, _account_id: &str, email_id: &str) -> Result<(), MailApiError> {
        self.marked_read.lock().unwrap().push(email_id.to_string());
        Ok(())
    }
}
