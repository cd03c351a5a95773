//! Upload-chunk repository.

use crate::error::CatalogResult;
use crate::models::UploadChunkRow;
use async_trait::async_trait;

/// Repository for chunk receipts.
#[async_trait]
pub trait ChunkRepo: Send + Sync {
    /// Record a chunk receipt; duplicate `(upload, epoch, offset)` inserts
    /// are silently idempotent.
    async fn insert_chunk_if_absent(&self, chunk: &UploadChunkRow) -> CatalogResult<()>;

    /// Number of chunks recorded for an upload epoch.
    async fn count_chunks(&self, upload_id: &str, concurrent_id: &str) -> CatalogResult<u64>;

    /// Offsets recorded for an upload epoch, ascending.
    async fn list_chunk_offsets(
        &self,
        upload_id: &str,
        concurrent_id: &str,
    ) -> CatalogResult<Vec<i64>>;

    /// Delete every chunk receipt of an upload (all epochs). Returns the
    /// number of rows removed.
    async fn delete_chunks(&self, upload_id: &str) -> CatalogResult<u64>;
}
