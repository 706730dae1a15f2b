use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::AppJsonResult,
    scan::{ScanProgress, ScanRequest},
    ServerState,
};

#[derive(Debug, Serialize)]
pub struct ScanStarted {
    pub scan_id: Uuid,
}

pub async fn handler_start_scan(
    State(state): State<ServerState>,
    Json(request): Json<ScanRequest>,
) -> AppJsonResult<ScanStarted> {
    let scan_id = state.scans.start(request).await?;
    Ok(Json(ScanStarted { scan_id }))
}

pub async fn handler_get_scan(
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> AppJsonResult<ScanProgress> {
    let progress = state.scans.get(id).await?;
    Ok(Json(progress))
}

pub async fn handler_pause_scan(
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> AppJsonResult<ScanProgress> {
    state.scans.pause(id).await?;
    let progress = state.scans.get(id).await?;
    Ok(Json(progress))
}

pub async fn handler_resume_scan(
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> AppJsonResult<ScanProgress> {
    state.scans.resume(id).await?;
    let progress = state.scans.get(id).await?;
    Ok(Json(progress))
}

pub async fn handler_cancel_scan(
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> AppJsonResult<ScanProgress> {
    state.scans.cancel(id).await?;
    let progress = state.scans.get(id).await?;
    Ok(Json(progress))
}
