//! Update-file repository.

use crate::error::CatalogResult;
use crate::models::UpdateFileRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for published file rows.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// The publish commit: insert all file rows and flip the version
    /// PROCESSING → READY in a single transaction. Any failure (including a
    /// lost CAS) aborts the whole transaction and the version stays
    /// PROCESSING for re-drive.
    async fn commit_version_files(
        &self,
        version_id: &str,
        files: &[UpdateFileRow],
        updated_at: OffsetDateTime,
    ) -> CatalogResult<()>;

    /// File rows belonging to any of `version_ids` in any of `categories`.
    async fn list_files_for_versions(
        &self,
        version_ids: &[String],
        categories: &[i32],
    ) -> CatalogResult<Vec<UpdateFileRow>>;

    /// Number of file rows attached to a version.
    async fn count_files(&self, version_id: &str) -> CatalogResult<u64>;
}
