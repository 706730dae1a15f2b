use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::{
    model::subscription::SubscriptionCtrl,
    pipeline::EmailPipeline,
    push::PushHandler,
    testing::common::{fetched_fixture, StubCompletion, StubMailClient},
    tests::common::{ensure_account, extraction_response, setup_conn},
};

#[tokio::test]
#[ignore]
async fn notification_processes_new_messages_and_advances_cursor() {
    let conn = setup_conn().await;
    let account_id = "acct-e2e-push";
    ensure_account(&conn, account_id).await;

    SubscriptionCtrl::upsert(
        &conn,
        account_id,
        "projects/test/topics/mail",
        Utc::now() + Duration::days(7),
        100,
    )
    .await
    .unwrap();

    let mail = Arc::new(StubMailClient::with_bodies(vec![fetched_fixture(
        "msg-e2e-push-1",
        "colleague@corp.example",
        "Quick question",
        Some("Can you send me the deck?"),
    )]));
    mail.history_ids
        .lock()
        .unwrap()
        .push("msg-e2e-push-1".to_string());

    let provider = Arc::new(StubCompletion::with_responses(vec![
        Ok(serde_json::json!({
            "category": "action_required",
            "importance_score": 0.7,
            "confidence": 0.75,
            "reasoning": "Direct request from a colleague.",
            "key_signals": ["request"]
        })),
        Ok(extraction_response("Colleague asks for the deck.", true, vec![])),
    ]));
    let pipeline = Arc::new(EmailPipeline::new(conn.clone(), mail.clone(), provider));
    let handler = PushHandler::new(conn.clone(), pipeline, mail);

    let outcome = handler.handle_notification(account_id, 140).await.unwrap();

    assert_eq!(outcome.messages_processed, 1);
    assert_eq!(outcome.history_id, 140);

    let subscription = SubscriptionCtrl::get(&conn, account_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(subscription.last_history_id, 140);
    assert!(subscription.last_notification_at.is_some());
}

#[tokio::test]
#[ignore]
async fn notification_for_unknown_account_is_rejected() {
    let conn = setup_conn().await;

    let mail = Arc::new(StubMailClient::default());
    let provider = Arc::new(StubCompletion::with_responses(vec![]));
    let pipeline = Arc::new(EmailPipeline::new(conn.clone(), mail.clone(), provider));
    let handler = PushHandler::new(conn.clone(), pipeline, mail);

    let result = handler
        .handle_notification("acct-that-does-not-exist", 7)
        .await;

    assert!(matches!(result, Err(crate::error::AppError::NotFound(_))));
}
