use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::{
    db_core::prelude::*,
    error::AppJsonResult,
    push::PushOutcome,
    ServerState,
};

#[derive(Debug, Deserialize)]
pub struct NotificationBody {
    pub account_id: String,
    pub history_id: i64,
}

pub async fn handler_receive_notification(
    State(state): State<ServerState>,
    Json(body): Json<NotificationBody>,
) -> AppJsonResult<PushOutcome> {
    let outcome = state
        .push
        .handle_notification(&body.account_id, body.history_id)
        .await?;

    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionBody {
    pub account_id: String,
    pub topic: String,
}

pub async fn handler_create_subscription(
    State(state): State<ServerState>,
    Json(body): Json<CreateSubscriptionBody>,
) -> AppJsonResult<subscription::Model> {
    let model = state
        .push
        .create_subscription(&body.account_id, &body.topic)
        .await?;

    Ok(Json(model))
}

pub async fn handler_renew_subscription(
    State(state): State<ServerState>,
    Path(account_id): Path<String>,
) -> AppJsonResult<subscription::Model> {
    let model = state.push.renew_subscription(&account_id).await?;
    Ok(Json(model))
}

pub async fn handler_stop_subscription(
    State(state): State<ServerState>,
    Path(account_id): Path<String>,
) -> AppJsonResult<serde_json::Value> {
    state.push.stop_subscription(&account_id).await?;
    Ok(Json(serde_json::json!({"stopped": true})))
}
