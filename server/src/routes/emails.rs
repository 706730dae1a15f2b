use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    db_core::prelude::*,
    error::{AppError, AppJsonResult},
    mail::RawMessageRef,
    model::{
        memory::MemoryCtrl,
        processed_email::{ProcessedEmailCtrl, ProcessedEmailListFilter},
    },
    pipeline::ProcessingResult,
    ServerState,
};

#[derive(Debug, Default, Deserialize)]
pub struct ListEmailsQuery {
    pub category: Option<EmailCategory>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

pub async fn handler_list_emails(
    State(state): State<ServerState>,
    Path(account_id): Path<String>,
    Query(query): Query<ListEmailsQuery>,
) -> AppJsonResult<Vec<processed_email::Model>> {
    let emails = ProcessedEmailCtrl::list(
        &state.conn,
        &account_id,
        ProcessedEmailListFilter {
            category: query.category,
            limit: query.limit,
            offset: query.offset,
        },
    )
    .await?;

    Ok(Json(emails))
}

#[derive(Debug, Serialize)]
pub struct EmailDetail {
    #[serde(flatten)]
    pub email: processed_email::Model,
    pub tasks: Vec<extracted_task::Model>,
    pub decisions: Vec<extracted_decision::Model>,
    pub questions: Vec<extracted_question::Model>,
}

pub async fn handler_get_email(
    State(state): State<ServerState>,
    Path(id): Path<i32>,
) -> AppJsonResult<EmailDetail> {
    let email = ProcessedEmailCtrl::get(&state.conn, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("processed email {id} not found")))?;

    let tasks = MemoryCtrl::tasks_for_email(&state.conn, &email.account_id, &email.email_id).await?;
    let decisions =
        MemoryCtrl::decisions_for_email(&state.conn, &email.account_id, &email.email_id).await?;
    let questions =
        MemoryCtrl::questions_for_email(&state.conn, &email.account_id, &email.email_id).await?;

    Ok(Json(EmailDetail {
        email,
        tasks,
        decisions,
        questions,
    }))
}

/// Re-runs the full pipeline on an already-stored message. The upsert path
/// keeps all prior events and, for corrected messages, the user's chosen
/// category.
pub async fn handler_reprocess_email(
    State(state): State<ServerState>,
    Path(id): Path<i32>,
) -> AppJsonResult<ProcessingResult> {
    let email = ProcessedEmailCtrl::get(&state.conn, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("processed email {id} not found")))?;

    let result = state
        .pipeline
        .process_ref(&RawMessageRef {
            account_id: email.account_id,
            email_id: email.email_id,
            thread_id: email.thread_id,
        })
        .await?;

    Ok(Json(result))
}
