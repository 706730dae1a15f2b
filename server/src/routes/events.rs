use axum::{
    extract::{Query, State},
    Json,
};

use crate::{
    db_core::prelude::*,
    error::AppJsonResult,
    events::{EventCtrl, EventFilter},
    ServerState,
};

pub async fn handler_query_events(
    State(state): State<ServerState>,
    Query(filter): Query<EventFilter>,
) -> AppJsonResult<Vec<event::Model>> {
    let events = EventCtrl::query(&state.conn, filter).await?;
    Ok(Json(events))
}
