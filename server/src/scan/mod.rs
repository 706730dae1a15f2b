use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicI64, Ordering::Relaxed},
        Arc, Mutex, RwLock,
    },
    time::Instant,
};

use futures::future::join_all;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
    db_core::prelude::*,
    error::{AppError, AppResult},
    events::{EventCtrl, EventType, NewEvent},
    mail::{MailClient, MessageListOptions, RawMessageRef},
    model::{
        account::AccountCtrl,
        processed_email::ProcessedEmailCtrl,
        scan_state::{ScanCheckpoint, ScanStateCtrl},
    },
    pipeline::EmailPipeline,
    server_config::cfg,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub account_id: String,
    /// Provider query expression limiting which messages the scan covers.
    pub query: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_skip_processed")]
    pub skip_already_processed: bool,
    pub max_messages: Option<usize>,
}

fn default_batch_size() -> usize {
    cfg.scan.default_batch_size
}

fn default_skip_processed() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct ScanProgress {
    pub scan_id: Uuid,
    pub account_id: String,
    pub status: ScanStatus,
    pub processed: i32,
    pub skipped: i32,
    pub failed: i32,
    pub total_estimate: Option<i32>,
    pub eta_seconds: Option<u64>,
    pub last_processed_email_id: Option<String>,
    pub error: Option<String>,
}

/// In-memory side of one running scan. Flags are polled at batch
/// boundaries; counters mirror the checkpointed row between boundaries.
struct ScanTask {
    scan_id: Uuid,
    paused: AtomicBool,
    cancelled: AtomicBool,
    processed: AtomicI64,
    skipped: AtomicI64,
    failed: AtomicI64,
    batch_rates: Mutex<VecDeque<(usize, f64)>>,
}

impl ScanTask {
    fn new(scan_id: Uuid, checkpoint: &ScanCheckpoint) -> Self {
        Self {
            scan_id,
            paused: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            processed: AtomicI64::new(checkpoint.processed_count as i64),
            skipped: AtomicI64::new(checkpoint.skipped_count as i64),
            failed: AtomicI64::new(checkpoint.failed_count as i64),
            batch_rates: Mutex::new(VecDeque::new()),
        }
    }

    fn record_batch(&self, messages: usize, seconds: f64) {
        let mut rates = self.batch_rates.lock().unwrap();
        if rates.len() >= cfg.scan.eta_window_batches {
            rates.pop_front();
        }
        rates.push_back((messages, seconds));
    }

    /// Remaining-work estimate from the moving rate over recent batches.
    fn eta_seconds(&self, remaining: i64) -> Option<u64> {
        if remaining <= 0 {
            return None;
        }
        let rates = self.batch_rates.lock().unwrap();
        let (messages, seconds) = rates
            .iter()
            .fold((0usize, 0f64), |(m, s), (bm, bs)| (m + bm, s + bs));
        if messages == 0 || seconds <= 0.0 {
            return None;
        }
        let rate = messages as f64 / seconds;
        Some((remaining as f64 / rate).ceil() as u64)
    }

    fn totals(&self) -> (i64, i64, i64) {
        (
            self.processed.load(Relaxed),
            self.skipped.load(Relaxed),
            self.failed.load(Relaxed),
        )
    }
}

#[derive(Clone)]
pub struct ScanController {
    conn: DatabaseConnection,
    pipeline: Arc<EmailPipeline>,
    mail: Arc<dyn MailClient>,
    active: Arc<RwLock<HashMap<Uuid, Arc<ScanTask>>>>,
}

impl ScanController {
    pub fn new(
        conn: DatabaseConnection,
        pipeline: Arc<EmailPipeline>,
        mail: Arc<dyn MailClient>,
    ) -> Self {
        Self {
            conn,
            pipeline,
            mail,
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn start(&self, request: ScanRequest) -> AppResult<Uuid> {
        AccountCtrl::get(&self.conn, &request.account_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("account {} not found", request.account_id))
            })?;

        let scan_id = Uuid::new_v4();
        let config = serde_json::to_value(&request).unwrap_or_default();
        ScanStateCtrl::create(&self.conn, scan_id, &request.account_id, config).await?;

        EventCtrl::append(
            &self.conn,
            NewEvent::new(EventType::HistoryScanStarted, &request.account_id).payload(json!({
                "scan_id": scan_id,
                "batch_size": request.batch_size,
                "query": request.query,
            })),
        )
        .await?;

        self.spawn_driver(scan_id, request, ScanCheckpoint::default());

        Ok(scan_id)
    }

    pub async fn get(&self, scan_id: Uuid) -> AppResult<ScanProgress> {
        let row = ScanStateCtrl::require(&self.conn, scan_id).await?;

        let eta_seconds = self.active.read().unwrap().get(&scan_id).and_then(|task| {
            let (processed, skipped, failed) = task.totals();
            let remaining = row
                .total_estimate
                .map(|total| total as i64 - processed - skipped - failed)?;
            task.eta_seconds(remaining)
        });

        Ok(ScanProgress {
            scan_id: row.id,
            account_id: row.account_id,
            status: row.status,
            processed: row.processed_count,
            skipped: row.skipped_count,
            failed: row.failed_count,
            total_estimate: row.total_estimate,
            eta_seconds,
            last_processed_email_id: row.last_processed_email_id,
            error: row.error,
        })
    }

    /// Requests a pause; it takes effect at the next batch boundary.
    pub async fn pause(&self, scan_id: Uuid) -> AppResult<()> {
        let row = ScanStateCtrl::require(&self.conn, scan_id).await?;
        if row.status != ScanStatus::InProgress {
            return Err(AppError::Conflict(format!(
                "scan {scan_id} is not in progress"
            )));
        }

        if let Some(task) = self.active.read().unwrap().get(&scan_id) {
            task.paused.store(true, Relaxed);
            return Ok(());
        }

        // No live driver (e.g. process restart mid-scan): the row is the
        // only state to update.
        ScanStateCtrl::set_status(&self.conn, scan_id, ScanStatus::Paused, None).await?;
        EventCtrl::append(
            &self.conn,
            NewEvent::new(EventType::HistoryScanPaused, &row.account_id)
                .payload(json!({"scan_id": scan_id})),
        )
        .await?;

        Ok(())
    }

    /// Continues a paused scan from its checkpoint. Already-processed
    /// messages are skipped by the normal dedupe path.
    pub async fn resume(&self, scan_id: Uuid) -> AppResult<()> {
        let row = ScanStateCtrl::require(&self.conn, scan_id).await?;
        match row.status {
            ScanStatus::Paused => {}
            ScanStatus::Cancelled => {
                return Err(AppError::Conflict(format!(
                    "scan {scan_id} was cancelled and cannot be resumed"
                )))
            }
            other => {
                return Err(AppError::Conflict(format!(
                    "scan {scan_id} is {} and cannot be resumed",
                    json!(other)
                )))
            }
        }

        let request: ScanRequest = serde_json::from_value(row.config.clone())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt scan config: {e}")))?;

        ScanStateCtrl::set_status(&self.conn, scan_id, ScanStatus::InProgress, None).await?;
        EventCtrl::append(
            &self.conn,
            NewEvent::new(EventType::HistoryScanResumed, &row.account_id)
                .payload(json!({"scan_id": scan_id})),
        )
        .await?;

        let checkpoint = ScanCheckpoint {
            processed_count: row.processed_count,
            skipped_count: row.skipped_count,
            failed_count: row.failed_count,
            total_estimate: row.total_estimate,
            last_processed_email_id: row.last_processed_email_id,
            next_page_token: row.next_page_token,
            consecutive_transport_failures: 0,
        };
        self.spawn_driver(scan_id, request, checkpoint);

        Ok(())
    }

    /// Terminal. The in-flight batch finishes; no new batch starts.
    pub async fn cancel(&self, scan_id: Uuid) -> AppResult<()> {
        let row = ScanStateCtrl::require(&self.conn, scan_id).await?;
        match row.status {
            ScanStatus::InProgress => {
                if let Some(task) = self.active.read().unwrap().get(&scan_id) {
                    task.cancelled.store(true, Relaxed);
                    return Ok(());
                }
            }
            ScanStatus::Paused => {}
            other => {
                return Err(AppError::Conflict(format!(
                    "scan {scan_id} is already {}",
                    json!(other)
                )))
            }
        }

        ScanStateCtrl::set_status(&self.conn, scan_id, ScanStatus::Cancelled, None).await?;
        EventCtrl::append(
            &self.conn,
            NewEvent::new(EventType::HistoryScanCancelled, &row.account_id)
                .payload(json!({"scan_id": scan_id})),
        )
        .await?;

        Ok(())
    }

    fn spawn_driver(&self, scan_id: Uuid, request: ScanRequest, checkpoint: ScanCheckpoint) {
        let task = Arc::new(ScanTask::new(scan_id, &checkpoint));
        self.active.write().unwrap().insert(scan_id, task.clone());

        let controller = self.clone();
        tokio::spawn(async move {
            if let Err(e) = controller.drive(task.clone(), request, checkpoint).await {
                tracing::error!("Scan {scan_id} driver failed: {e:?}");
            }
            controller.active.write().unwrap().remove(&scan_id);
        });
    }

    async fn drive(
        &self,
        task: Arc<ScanTask>,
        request: ScanRequest,
        mut checkpoint: ScanCheckpoint,
    ) -> AppResult<()> {
        let account_id = request.account_id.clone();
        let batch_size = request.batch_size.max(1);

        loop {
            if task.cancelled.load(Relaxed) {
                self.finish(&task, &account_id, ScanStatus::Cancelled, None)
                    .await?;
                return Ok(());
            }
            if task.paused.load(Relaxed) {
                self.finish(&task, &account_id, ScanStatus::Paused, None)
                    .await?;
                return Ok(());
            }

            let (processed, skipped, failed) = task.totals();
            if let Some(max) = request.max_messages {
                if processed + skipped + failed >= max as i64 {
                    self.finish(&task, &account_id, ScanStatus::Completed, None)
                        .await?;
                    return Ok(());
                }
            }

            let batch_started = Instant::now();
            let page = match self
                .mail
                .list_messages(
                    &account_id,
                    &MessageListOptions {
                        query: request.query.clone(),
                        page_token: checkpoint.next_page_token.clone(),
                        max_results: batch_size,
                    },
                )
                .await
            {
                Ok(page) => {
                    checkpoint.consecutive_transport_failures = 0;
                    page
                }
                Err(e) => {
                    checkpoint.consecutive_transport_failures += 1;
                    tracing::warn!(
                        "Scan {} batch fetch failed ({}/{}): {e}",
                        task.scan_id,
                        checkpoint.consecutive_transport_failures,
                        cfg.scan.failed_batch_threshold
                    );

                    if checkpoint.consecutive_transport_failures
                        >= cfg.scan.failed_batch_threshold
                    {
                        self.finish(
                            &task,
                            &account_id,
                            ScanStatus::Failed,
                            Some(e.to_string()),
                        )
                        .await?;
                        return Ok(());
                    }

                    self.checkpoint_task(&task, &checkpoint).await?;
                    continue;
                }
            };

            if checkpoint.total_estimate.is_none() {
                checkpoint.total_estimate = page.result_size_estimate;
            }

            // Dedupe within the page; providers occasionally repeat ids
            // across page boundaries.
            let mut ids: IndexSet<String> = IndexSet::new();
            let entries: Vec<_> = page
                .messages
                .iter()
                .filter(|m| ids.insert(m.email_id.clone()))
                .collect();

            let already_processed = if request.skip_already_processed {
                let id_vec: Vec<String> = ids.iter().cloned().collect();
                ProcessedEmailCtrl::find_processed_ids(&self.conn, &account_id, &id_vec).await?
            } else {
                Default::default()
            };

            let to_process: Vec<RawMessageRef> = entries
                .iter()
                .filter(|m| !already_processed.contains(&m.email_id))
                .map(|m| RawMessageRef {
                    account_id: account_id.clone(),
                    email_id: m.email_id.clone(),
                    thread_id: m.thread_id.clone(),
                })
                .collect();

            task.skipped
                .fetch_add((ids.len() - to_process.len()) as i64, Relaxed);

            // Messages within a batch run concurrently; batches themselves
            // are sequential.
            let results = join_all(
                to_process
                    .iter()
                    .map(|raw| self.pipeline.process_ref(raw)),
            )
            .await;

            for (raw, result) in to_process.iter().zip(results) {
                match result {
                    Ok(_) => {
                        task.processed.fetch_add(1, Relaxed);
                    }
                    Err(e) => {
                        task.failed.fetch_add(1, Relaxed);
                        tracing::warn!(
                            "Scan {} failed on message {}: {e:?}",
                            task.scan_id,
                            raw.email_id
                        );
                    }
                }
            }

            if let Some(last) = ids.last() {
                checkpoint.last_processed_email_id = Some(last.clone());
            }
            checkpoint.next_page_token = page.next_page_token.clone();

            task.record_batch(ids.len(), batch_started.elapsed().as_secs_f64());
            self.checkpoint_task(&task, &checkpoint).await?;

            if checkpoint.next_page_token.is_none() {
                self.finish(&task, &account_id, ScanStatus::Completed, None)
                    .await?;
                return Ok(());
            }
        }
    }

    async fn checkpoint_task(&self, task: &ScanTask, checkpoint: &ScanCheckpoint) -> AppResult<()> {
        let (processed, skipped, failed) = task.totals();
        ScanStateCtrl::checkpoint(
            &self.conn,
            task.scan_id,
            ScanCheckpoint {
                processed_count: processed as i32,
                skipped_count: skipped as i32,
                failed_count: failed as i32,
                total_estimate: checkpoint.total_estimate,
                last_processed_email_id: checkpoint.last_processed_email_id.clone(),
                next_page_token: checkpoint.next_page_token.clone(),
                consecutive_transport_failures: checkpoint.consecutive_transport_failures,
            },
        )
        .await
    }

    async fn finish(
        &self,
        task: &ScanTask,
        account_id: &str,
        status: ScanStatus,
        error: Option<String>,
    ) -> AppResult<()> {
        ScanStateCtrl::set_status(&self.conn, task.scan_id, status, error.clone()).await?;

        let (processed, skipped, failed) = task.totals();
        let event_type = match status {
            ScanStatus::Completed => EventType::HistoryScanCompleted,
            ScanStatus::Paused => EventType::HistoryScanPaused,
            ScanStatus::Cancelled => EventType::HistoryScanCancelled,
            ScanStatus::Failed => EventType::HistoryScanError,
            ScanStatus::InProgress => return Ok(()),
        };

        EventCtrl::append(
            &self.conn,
            NewEvent::new(event_type, account_id).payload(json!({
                "scan_id": task.scan_id,
                "processed": processed,
                "skipped": skipped,
                "failed": failed,
                "error": error,
            })),
        )
        .await?;

        tracing::info!(
            "Scan {} finished as {:?}: {} processed, {} skipped, {} failed",
            task.scan_id,
            status,
            processed,
            skipped,
            failed
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> ScanTask {
        ScanTask::new(Uuid::new_v4(), &ScanCheckpoint::default())
    }

    #[test]
    fn eta_uses_moving_rate_over_recent_batches() {
        let task = task();
        // 50 messages per 10s across several batches: 5 msg/s.
        for _ in 0..3 {
            task.record_batch(50, 10.0);
        }

        assert_eq!(task.eta_seconds(500), Some(100));
    }

    #[test]
    fn eta_window_keeps_only_recent_batches() {
        let task = task();
        // Old slow batches age out of the K-batch window.
        for _ in 0..5 {
            task.record_batch(10, 100.0);
        }
        for _ in 0..5 {
            task.record_batch(100, 10.0);
        }

        // Window now holds only the fast batches: 10 msg/s.
        assert_eq!(task.eta_seconds(100), Some(10));
    }

    #[test]
    fn eta_is_unknown_without_rate_or_remaining_work() {
        let task = task();
        assert_eq!(task.eta_seconds(100), None);

        task.record_batch(50, 10.0);
        assert_eq!(task.eta_seconds(0), None);
        assert_eq!(task.eta_seconds(-5), None);
    }

    #[test]
    fn task_counters_resume_from_checkpoint() {
        let checkpoint = ScanCheckpoint {
            processed_count: 120,
            skipped_count: 30,
            failed_count: 2,
            ..Default::default()
        };
        let task = ScanTask::new(Uuid::new_v4(), &checkpoint);

        assert_eq!(task.totals(), (120, 30, 2));
    }

    #[test]
    fn scan_request_defaults_apply() {
        let request: ScanRequest =
            serde_json::from_value(json!({"account_id": "acct-1"})).unwrap();

        assert_eq!(request.batch_size, 50);
        assert!(request.skip_already_processed);
        assert!(request.query.is_none());
        assert!(request.max_messages.is_none());
    }
}
