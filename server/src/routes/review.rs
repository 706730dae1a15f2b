use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::{
    db_core::prelude::*,
    error::{AppError, AppJsonResult},
    review::{ReviewAction, ReviewListFilter, ReviewQueueCtrl, ReviewService},
    ServerState,
};

pub async fn handler_list_review_items(
    State(state): State<ServerState>,
    Query(filter): Query<ReviewListFilter>,
) -> AppJsonResult<Vec<review_queue_item::Model>> {
    let items = ReviewQueueCtrl::list(&state.conn, filter).await?;
    Ok(Json(items))
}

pub async fn handler_get_review_item(
    State(state): State<ServerState>,
    Path(id): Path<i32>,
) -> AppJsonResult<review_queue_item::Model> {
    let item = ReviewQueueCtrl::get(&state.conn, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("review item {id} not found")))?;

    Ok(Json(item))
}

pub async fn handler_approve(
    State(state): State<ServerState>,
    Path(id): Path<i32>,
) -> AppJsonResult<review_queue_item::Model> {
    let item = ReviewService::resolve(&state.conn, id, ReviewAction::Approve).await?;
    Ok(Json(item))
}

pub async fn handler_reject(
    State(state): State<ServerState>,
    Path(id): Path<i32>,
) -> AppJsonResult<review_queue_item::Model> {
    let item = ReviewService::resolve(&state.conn, id, ReviewAction::Reject).await?;
    Ok(Json(item))
}

#[derive(Debug, Deserialize)]
pub struct ModifyBody {
    pub corrected_category: EmailCategory,
    pub feedback: Option<String>,
}

pub async fn handler_modify(
    State(state): State<ServerState>,
    Path(id): Path<i32>,
    Json(body): Json<ModifyBody>,
) -> AppJsonResult<review_queue_item::Model> {
    let item = ReviewService::resolve(
        &state.conn,
        id,
        ReviewAction::Modify {
            corrected_category: body.corrected_category,
            feedback: body.feedback,
        },
    )
    .await?;

    Ok(Json(item))
}
