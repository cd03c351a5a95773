//! Version repository.

use crate::error::CatalogResult;
use crate::models::VersionRow;
use async_trait::async_trait;
use depot_core::{VersionNumber, VersionSlot, VersionState};
use time::OffsetDateTime;

/// Repository for version operations.
#[async_trait]
pub trait VersionRepo: Send + Sync {
    /// Allocate the next version number at the given slot and insert the row
    /// in PENDING state, all in one transaction.
    ///
    /// The first version of an empty catalog is `1.0.0` regardless of slot.
    /// A concurrent allocator racing for the same number loses on the
    /// `(major, minor, revision)` unique index and gets `Conflict`; callers
    /// may retry.
    async fn allocate_version(
        &self,
        version_id: &str,
        slot: VersionSlot,
        description: &str,
        now: OffsetDateTime,
    ) -> CatalogResult<VersionRow>;

    /// Get a version by id.
    async fn get_version(&self, version_id: &str) -> CatalogResult<Option<VersionRow>>;

    /// Compare-and-set the version state. Returns whether the transition
    /// was applied (the row was in `from`).
    async fn set_version_state(
        &self,
        version_id: &str,
        from: VersionState,
        to: VersionState,
        updated_at: OffsetDateTime,
    ) -> CatalogResult<bool>;

    /// Update the description. Returns whether the row existed.
    async fn update_version_description(
        &self,
        version_id: &str,
        description: &str,
        updated_at: OffsetDateTime,
    ) -> CatalogResult<bool>;

    /// Paginated listing, newest number first, with the total row count.
    async fn list_versions(&self, page: u32, size: u32) -> CatalogResult<(Vec<VersionRow>, u64)>;

    /// READY versions whose number strictly exceeds `number`, in ascending
    /// `created_at` order.
    async fn list_ready_versions_after(
        &self,
        number: VersionNumber,
    ) -> CatalogResult<Vec<VersionRow>>;
}
