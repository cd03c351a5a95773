//! Upload repository.

use crate::error::CatalogResult;
use crate::models::UploadRow;
use async_trait::async_trait;
use depot_core::UploadState;
use time::OffsetDateTime;

/// Parameters declared by a `StartUpload` call.
#[derive(Debug, Clone)]
pub struct StartUploadParams {
    pub version_id: String,
    /// Used only when no upload row exists yet.
    pub new_upload_id: String,
    /// Used on insert and on epoch rotation.
    pub new_concurrent_id: String,
    pub hash: String,
    pub chunk_size: i64,
    pub file_size: i64,
    pub chunks_count: i64,
}

/// Result of the `start_upload` upsert.
#[derive(Debug, Clone)]
pub struct StartUploadOutcome {
    pub upload: UploadRow,
    /// Hash of the epoch that was rotated away, so the caller can delete the
    /// stale chunk blob prefix. `None` when no rotation happened.
    pub rotated_from_hash: Option<String>,
}

/// Repository for upload operations.
#[async_trait]
pub trait UploadRepo: Send + Sync {
    /// The `StartUpload` upsert, executed atomically against the row:
    ///
    /// - no row: insert with the new ids in state `none`;
    /// - row with matching `(hash, chunk_size)`: returned unchanged;
    /// - otherwise: rotate `concurrent_id`, reset declared geometry and
    ///   state, and delete the row's chunk receipts.
    async fn start_upload(
        &self,
        params: &StartUploadParams,
        now: OffsetDateTime,
    ) -> CatalogResult<StartUploadOutcome>;

    /// Get an upload by id.
    async fn get_upload(&self, upload_id: &str) -> CatalogResult<Option<UploadRow>>;

    /// Get the upload attached to a version, if any.
    async fn get_upload_by_version(&self, version_id: &str) -> CatalogResult<Option<UploadRow>>;

    /// Compare-and-set the upload state. Returns whether the transition
    /// was applied.
    async fn set_upload_state(
        &self,
        upload_id: &str,
        from: UploadState,
        to: UploadState,
        updated_at: OffsetDateTime,
    ) -> CatalogResult<bool>;
}
