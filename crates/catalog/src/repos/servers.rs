//! Download-server repository.

use crate::error::CatalogResult;
use crate::models::ServerRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for the advertised download mirrors.
#[async_trait]
pub trait ServerRepo: Send + Sync {
    /// All registered mirrors, oldest first.
    async fn list_servers(&self) -> CatalogResult<Vec<ServerRow>>;

    /// Register a mirror URL; duplicates are idempotent.
    async fn insert_server(&self, url: &str, now: OffsetDateTime) -> CatalogResult<()>;
}
