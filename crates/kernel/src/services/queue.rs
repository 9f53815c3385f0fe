//! Background translation queue.
//!
//! Default-language saves submit a [`TranslationJob`] and return immediately.
//! A single worker task drains the bounded channel and runs the fan-out one
//! job at a time. Submission never blocks: a full or closed queue drops the
//! job, logs a warning and counts it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::services::fanout::TranslationFanout;

/// One fan-out request.
#[derive(Debug, Clone)]
pub struct TranslationJob {
    /// Time-ordered id for log correlation.
    pub id: Uuid,
    pub page_id: i64,
    pub tenant_id: String,
    pub layout: Value,
    pub enqueued_at: DateTime<Utc>,
}

impl TranslationJob {
    pub fn new(page_id: i64, tenant_id: impl Into<String>, layout: Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            page_id,
            tenant_id: tenant_id.into(),
            layout,
            enqueued_at: Utc::now(),
        }
    }
}

/// Why a job could not be queued.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("translation queue is full")]
    Full,

    #[error("translation worker has stopped")]
    Closed,
}

/// Sending half of the translation queue.
#[derive(Clone)]
pub struct TranslationQueue {
    tx: mpsc::Sender<TranslationJob>,
    metrics: Arc<Metrics>,
}

impl TranslationQueue {
    /// Queue a job without waiting. Returns the job id.
    pub fn submit(&self, job: TranslationJob) -> Result<Uuid, EnqueueError> {
        let id = job.id;
        let page_id = job.page_id;

        match self.tx.try_send(job) {
            Ok(()) => Ok(id),
            Err(e) => {
                let err = match e {
                    mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
                    mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
                };
                self.metrics.translation_jobs_dropped.inc();
                warn!(job_id = %id, page_id, error = %err, "translation job dropped");
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for TranslationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationQueue")
            .field("capacity", &self.tx.max_capacity())
            .finish()
    }
}

/// Handle to the running worker.
#[derive(Debug)]
pub struct TranslationWorker {
    handle: JoinHandle<u64>,
}

impl TranslationWorker {
    /// Wait until every sender is dropped and the queue is drained.
    ///
    /// Returns the number of jobs processed.
    pub async fn join(self) -> u64 {
        match self.handle.await {
            Ok(processed) => processed,
            Err(e) => {
                warn!(error = %e, "translation worker panicked");
                0
            }
        }
    }
}

/// Start the worker task and return the queue feeding it.
///
/// Must be called from within a tokio runtime.
pub fn spawn_translation_worker(
    fanout: Arc<TranslationFanout>,
    metrics: Arc<Metrics>,
    capacity: usize,
) -> (TranslationQueue, TranslationWorker) {
    let (tx, mut rx) = mpsc::channel::<TranslationJob>(capacity.max(1));

    let handle = tokio::spawn(async move {
        let mut processed = 0u64;
        while let Some(job) = rx.recv().await {
            let waited_ms = (Utc::now() - job.enqueued_at).num_milliseconds();
            let report = fanout
                .translate_layout_to_all_languages(job.page_id, &job.layout, &job.tenant_id)
                .await;
            processed += 1;

            if report.failed.is_empty() && report.error.is_none() {
                info!(
                    job_id = %job.id,
                    page_id = job.page_id,
                    tenant_id = %job.tenant_id,
                    waited_ms,
                    languages = report.translated.len(),
                    leaf_failures = report.leaf_failures,
                    "translation job finished"
                );
            } else {
                warn!(
                    job_id = %job.id,
                    page_id = job.page_id,
                    tenant_id = %job.tenant_id,
                    translated = ?report.translated,
                    failed = ?report.failed,
                    error = ?report.error,
                    "translation job finished with failures"
                );
            }
        }
        info!(processed, "translation worker stopped");
        processed
    });

    (
        TranslationQueue { tx, metrics },
        TranslationWorker { handle },
    )
}
