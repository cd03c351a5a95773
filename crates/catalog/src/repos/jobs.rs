//! Durable job-queue repository.

use crate::error::CatalogResult;
use crate::models::JobRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository backing the durable FIFO of pipeline jobs.
///
/// Delivery is at-least-once; job bodies must be idempotent. The `job_id`
/// is the dedup key.
#[async_trait]
pub trait JobRepo: Send + Sync {
    /// Enqueue a job. No-op (returns `false`) when a live job with the same
    /// id exists; a failed job with the id is removed and replaced.
    async fn enqueue_job(&self, job: &JobRow) -> CatalogResult<bool>;

    /// Lease the oldest queued job, atomically marking it active.
    async fn lease_next_job(&self, now: OffsetDateTime) -> CatalogResult<Option<JobRow>>;

    /// Record job progress in `[0, 100]`.
    async fn update_job_progress(
        &self,
        job_id: &str,
        progress: f64,
        now: OffsetDateTime,
    ) -> CatalogResult<()>;

    /// Remove a completed job.
    async fn complete_job(&self, job_id: &str) -> CatalogResult<()>;

    /// Retain a failed job with its error for inspection and re-drive.
    async fn fail_job(&self, job_id: &str, error: &str, now: OffsetDateTime) -> CatalogResult<()>;

    /// Active and queued jobs, oldest first.
    async fn list_unfinished_jobs(&self) -> CatalogResult<Vec<JobRow>>;

    /// Get a job by id.
    async fn get_job(&self, job_id: &str) -> CatalogResult<Option<JobRow>>;

    /// Reset leases abandoned by a dead worker: every active job goes back
    /// to queued. Called once at startup. Returns the number reset.
    async fn requeue_active_jobs(&self, now: OffsetDateTime) -> CatalogResult<u64>;
}
