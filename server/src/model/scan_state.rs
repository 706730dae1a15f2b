use chrono::Utc;
use uuid::Uuid;

use crate::{
    db_core::prelude::*,
    error::{AppError, AppResult},
};

pub struct ScanStateCtrl;

#[derive(Debug, Clone, Default)]
pub struct ScanCheckpoint {
    pub processed_count: i32,
    pub skipped_count: i32,
    pub failed_count: i32,
    pub total_estimate: Option<i32>,
    pub last_processed_email_id: Option<String>,
    pub next_page_token: Option<String>,
    pub consecutive_transport_failures: i32,
}

impl ScanStateCtrl {
    pub async fn create(
        conn: &DatabaseConnection,
        scan_id: Uuid,
        account_id: &str,
        config: serde_json::Value,
    ) -> AppResult<scan_state::Model> {
        let now = Utc::now();
        let model = scan_state::ActiveModel {
            id: ActiveValue::Set(scan_id),
            account_id: ActiveValue::Set(account_id.to_string()),
            config: ActiveValue::Set(config),
            status: ActiveValue::Set(ScanStatus::InProgress),
            processed_count: ActiveValue::Set(0),
            skipped_count: ActiveValue::Set(0),
            failed_count: ActiveValue::Set(0),
            total_estimate: ActiveValue::Set(None),
            last_processed_email_id: ActiveValue::Set(None),
            next_page_token: ActiveValue::Set(None),
            consecutive_transport_failures: ActiveValue::Set(0),
            started_at: ActiveValue::Set(now.into()),
            last_updated_at: ActiveValue::Set(now.into()),
            error: ActiveValue::Set(None),
        }
        .insert(conn)
        .await?;

        Ok(model)
    }

    pub async fn get(
        conn: &DatabaseConnection,
        scan_id: Uuid,
    ) -> AppResult<Option<scan_state::Model>> {
        Ok(ScanState::find_by_id(scan_id).one(conn).await?)
    }

    pub async fn require(conn: &DatabaseConnection, scan_id: Uuid) -> AppResult<scan_state::Model> {
        Self::get(conn, scan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("scan {scan_id} not found")))
    }

    /// Persists the per-batch checkpoint: counters, pagination token and the
    /// last processed id.
    pub async fn checkpoint(
        conn: &DatabaseConnection,
        scan_id: Uuid,
        checkpoint: ScanCheckpoint,
    ) -> AppResult<()> {
        scan_state::ActiveModel {
            id: ActiveValue::Unchanged(scan_id),
            processed_count: ActiveValue::Set(checkpoint.processed_count),
            skipped_count: ActiveValue::Set(checkpoint.skipped_count),
            failed_count: ActiveValue::Set(checkpoint.failed_count),
            total_estimate: ActiveValue::Set(checkpoint.total_estimate),
            last_processed_email_id: ActiveValue::Set(checkpoint.last_processed_email_id),
            next_page_token: ActiveValue::Set(checkpoint.next_page_token),
            consecutive_transport_failures: ActiveValue::Set(
                checkpoint.consecutive_transport_failures,
            ),
            last_updated_at: ActiveValue::Set(Utc::now().into()),
            ..Default::default()
        }
        .update(conn)
        .await?;

        Ok(())
    }

    pub async fn set_status(
        conn: &DatabaseConnection,
        scan_id: Uuid,
        status: ScanStatus,
        error: Option<String>,
    ) -> AppResult<()> {
        scan_state::ActiveModel {
            id: ActiveValue::Unchanged(scan_id),
            status: ActiveValue::Set(status),
            error: ActiveValue::Set(error),
            last_updated_at: ActiveValue::Set(Utc::now().into()),
            ..Default::default()
        }
        .update(conn)
        .await?;

        Ok(())
    }

    pub async fn list_for_account(
        conn: &DatabaseConnection,
        account_id: &str,
    ) -> AppResult<Vec<scan_state::Model>> {
        Ok(ScanState::find()
            .filter(scan_state::Column::AccountId.eq(account_id))
            .order_by_desc(scan_state::Column::StartedAt)
            .all(conn)
            .await?)
    }
}
