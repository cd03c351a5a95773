//! Blob store trait definition.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;

/// Progress callback: monotonically non-decreasing values in `[0.0, 1.0]`,
/// reported at least once on completion.
pub type Progress = Arc<dyn Fn(f64) + Send + Sync>;

/// Object store abstraction over pluggable blob backends.
///
/// Keys always use forward slashes; the folder-level operations of the
/// upload/publish pipeline live in [`crate::ops`] and are built from these
/// primitives.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Check whether an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Put an object atomically from an in-memory buffer.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Put an object atomically from a local file.
    async fn upload(&self, src: &Path, key: &str) -> StorageResult<()>;

    /// Download an object to a local path atomically; on failure the
    /// partial destination is removed.
    async fn download(&self, key: &str, dst: &Path) -> StorageResult<()>;

    /// Delete an object; deleting a missing object is a no-op.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Delete every object under a prefix; idempotent.
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<()>;

    /// List object keys under a prefix.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Static identifier of the backend type, for logs and metrics.
    fn backend_name(&self) -> &'static str;

    /// Verify backend connectivity at startup. Backends without a meaningful
    /// check return `Ok(())`.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
