use chrono::Utc;
use serde_json::json;

use crate::{
    events::{EventCtrl, EventFilter, EventType, NewEvent},
    tests::common::{ensure_account, setup_conn},
};

#[tokio::test]
#[ignore]
async fn payload_round_trips_through_storage() {
    let conn = setup_conn().await;
    let account_id = "acct-e2e-events";
    ensure_account(&conn, account_id).await;
    let start_time = Utc::now();

    let payload = json!({
        "history_id": 42,
        "nested": {"values": [1, 2, 3], "flag": true},
        "text": "emoji and unicode: ✓ ümlaut"
    });

    let event_id = EventCtrl::append(
        &conn,
        NewEvent::new(EventType::WebhookNotificationReceived, account_id)
            .email_id("msg-events-1")
            .payload(payload.clone())
            .processing_time_ms(7),
    )
    .await
    .unwrap();

    let stored = EventCtrl::get(&conn, event_id).await.unwrap().unwrap();
    assert_eq!(stored.payload, payload);
    assert_eq!(stored.processing_time_ms, Some(7));
    assert_eq!(
        stored.event_type,
        EventType::WebhookNotificationReceived.as_ref()
    );

    // start_time filtering is strict: the event is visible after
    // start_time, invisible from its own timestamp onward.
    let after = EventCtrl::query(
        &conn,
        EventFilter {
            account_id: Some(account_id.to_string()),
            start_time: Some(start_time),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(after.iter().any(|e| e.event_id == event_id));

    let none = EventCtrl::query(
        &conn,
        EventFilter {
            account_id: Some(account_id.to_string()),
            start_time: Some(stored.timestamp.into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(none.iter().all(|e| e.event_id != event_id));
}

#[tokio::test]
#[ignore]
async fn events_come_back_in_append_order() {
    let conn = setup_conn().await;
    let account_id = "acct-e2e-events-order";
    ensure_account(&conn, account_id).await;
    let start_time = Utc::now();

    for i in 0..5 {
        EventCtrl::append(
            &conn,
            NewEvent::new(EventType::EmailFetched, account_id)
                .email_id(format!("msg-order-{i}"))
                .payload(json!({"i": i})),
        )
        .await
        .unwrap();
    }

    let events = EventCtrl::query(
        &conn,
        EventFilter {
            account_id: Some(account_id.to_string()),
            start_time: Some(start_time),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let seqs: Vec<i64> = events.iter().map(|e| e.seq).collect();
    let mut sorted = seqs.clone();
    sorted.sort();
    assert_eq!(seqs, sorted);

    let indices: Vec<i64> = events
        .iter()
        .map(|e| e.payload["i"].as_i64().unwrap())
        .collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
}
