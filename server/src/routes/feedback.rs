use axum::{extract::State, Json};

use crate::{
    error::AppJsonResult,
    feedback::{FeedbackSignal, FeedbackTracker},
    ServerState,
};

/// Intake for implicit signals the fetch subsystem detects on provider
/// state (replies, archives, deletes, stars, label moves).
pub async fn handler_record_feedback(
    State(state): State<ServerState>,
    Json(signal): Json<FeedbackSignal>,
) -> AppJsonResult<serde_json::Value> {
    FeedbackTracker::record(&state.conn, signal).await?;
    Ok(Json(serde_json::json!({"recorded": true})))
}
