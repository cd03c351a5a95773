//! Durable job queue facade and the worker loop.

use crate::metrics;
use crate::pipeline::UpdatePipeline;
use depot_catalog::models::JobRow;
use depot_catalog::{CatalogResult, CatalogStore};
use depot_core::JobPayload;
use depot_storage::Progress;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Facade over the catalog's durable job table.
#[derive(Clone)]
pub struct JobQueue {
    catalog: Arc<dyn CatalogStore>,
}

impl JobQueue {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// Enqueue a payload under its identity key. A live job with the same
    /// key makes this a no-op; a failed one is replaced.
    pub async fn enqueue(&self, payload: &JobPayload) -> CatalogResult<String> {
        let job_id = payload.job_id();
        let now = OffsetDateTime::now_utc();
        let row = JobRow {
            job_id: job_id.clone(),
            payload_json: serde_json::to_string(payload)
                .map_err(|e| depot_catalog::CatalogError::Internal(e.to_string()))?,
            state: depot_catalog::models::job_state::QUEUED.to_string(),
            progress: 0.0,
            error: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        };

        let enqueued = self.catalog.enqueue_job(&row).await?;
        if !enqueued {
            tracing::debug!(job_id = %job_id, "Job already queued, skipping enqueue");
        }
        Ok(job_id)
    }

    /// Active and queued jobs, oldest first.
    pub async fn list_unfinished(&self) -> CatalogResult<Vec<JobRow>> {
        self.catalog.list_unfinished_jobs().await
    }
}

/// Handle a running job uses to report progress.
///
/// Async stages report directly; blob-transfer callbacks report through a
/// channel the worker drains into the catalog.
pub struct JobHandle {
    job_id: String,
    catalog: Arc<dyn CatalogStore>,
    tx: mpsc::UnboundedSender<f64>,
}

impl JobHandle {
    fn new(
        job_id: String,
        catalog: Arc<dyn CatalogStore>,
        tx: mpsc::UnboundedSender<f64>,
    ) -> Self {
        Self {
            job_id,
            catalog,
            tx,
        }
    }

    /// Record progress in `[0, 100]`.
    pub async fn update_progress(&self, pct: f64) {
        if let Err(e) = self
            .catalog
            .update_job_progress(&self.job_id, pct, OffsetDateTime::now_utc())
            .await
        {
            tracing::warn!(job_id = %self.job_id, error = %e, "Failed to record job progress");
        }
    }

    /// A storage progress callback mapping `[0, 1]` onto the job's
    /// `[start, end]` percentage band.
    pub fn progress_band(&self, start: f64, end: f64) -> Progress {
        let tx = self.tx.clone();
        Arc::new(move |fraction: f64| {
            let _ = tx.send(start + (end - start) * fraction.clamp(0.0, 1.0));
        })
    }
}

/// A worker leasing jobs from the queue sequentially.
pub struct Worker {
    catalog: Arc<dyn CatalogStore>,
    pipeline: Arc<UpdatePipeline>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        pipeline: Arc<UpdatePipeline>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            catalog,
            pipeline,
            poll_interval,
        }
    }

    /// Spawn the worker loop.
    pub fn spawn(self, index: u32) -> JoinHandle<()> {
        tokio::spawn(async move {
            metrics::WORKERS_ACTIVE.inc();
            tracing::info!(worker = index, "Pipeline worker started");
            loop {
                match self.tick().await {
                    Ok(true) => {}
                    Ok(false) => tokio::time::sleep(self.poll_interval).await,
                    Err(e) => {
                        tracing::error!(worker = index, error = %e, "Worker lease failed");
                        tokio::time::sleep(self.poll_interval).await;
                    }
                }
            }
        })
    }

    /// Lease and execute at most one job. Returns whether a job ran.
    pub async fn tick(&self) -> CatalogResult<bool> {
        let Some(job) = self.catalog.lease_next_job(OffsetDateTime::now_utc()).await? else {
            return Ok(false);
        };
        self.execute(job).await;
        Ok(true)
    }

    async fn execute(&self, job: JobRow) {
        let job_id = job.job_id.clone();
        tracing::info!(job_id = %job_id, attempt = job.attempts, "Executing job");

        let (tx, mut rx) = mpsc::unbounded_channel::<f64>();
        let handle = JobHandle::new(job_id.clone(), self.catalog.clone(), tx);

        // Drain transfer-progress reports into the durable queue row.
        let drain_catalog = self.catalog.clone();
        let drain_job_id = job_id.clone();
        let drain = tokio::spawn(async move {
            while let Some(pct) = rx.recv().await {
                let _ = drain_catalog
                    .update_job_progress(&drain_job_id, pct, OffsetDateTime::now_utc())
                    .await;
            }
        });

        let result = self.pipeline.run(&job, &handle).await;
        drop(handle);
        let _ = drain.await;

        match result {
            Ok(()) => {
                metrics::JOBS_COMPLETED.inc();
                if let Err(e) = self.catalog.complete_job(&job_id).await {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to complete job");
                } else {
                    tracing::info!(job_id = %job_id, "Job completed");
                }
            }
            Err(e) => {
                metrics::JOBS_FAILED.inc();
                tracing::error!(job_id = %job_id, error = %e, "Job failed");
                if let Err(fail_err) = self
                    .catalog
                    .fail_job(&job_id, &e.to_string(), OffsetDateTime::now_utc())
                    .await
                {
                    tracing::error!(job_id = %job_id, error = %fail_err, "Failed to record job failure");
                }
            }
        }
    }
}
