//! Delta-manifest resolver.

use crate::cache::ManifestCache;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use depot_catalog::CatalogStore;
use depot_core::{
    Manifest, ManifestFile, OperatingSystem, TextureFormat, VersionNumber, manifest_cache_key,
    relevant_categories,
};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

/// Computes the file set a client needs to move from its held version to
/// the latest published one, memoized in the shared manifest cache.
#[derive(Clone)]
pub struct ManifestResolver {
    catalog: Arc<dyn CatalogStore>,
    cache: ManifestCache,
}

impl ManifestResolver {
    pub fn new(catalog: Arc<dyn CatalogStore>, cache: ManifestCache) -> Self {
        Self { catalog, cache }
    }

    /// Resolve the manifest for a client at `client` with the given
    /// `(os, texture)` pair.
    pub async fn resolve(
        &self,
        client: VersionNumber,
        os: OperatingSystem,
        texture: TextureFormat,
    ) -> ApiResult<Manifest> {
        let versions = self.catalog.list_ready_versions_after(client).await?;
        let Some(target) = versions.last() else {
            metrics::MANIFESTS_SERVED.inc();
            return Ok(Manifest::up_to_date(&client));
        };

        let source_number = versions[0].number();
        let target_number = target.number();
        let cache_key = manifest_cache_key(&source_number, &target_number, os, texture);

        if let Some(cached) = self.cache.get(&cache_key).await {
            if let Ok(manifest) = serde_json::from_slice::<Manifest>(&cached) {
                metrics::MANIFEST_CACHE_HITS.inc();
                metrics::MANIFESTS_SERVED.inc();
                return Ok(manifest);
            }
        }

        let categories: Vec<i32> = relevant_categories(os, texture)
            .iter()
            .map(|c| c.index())
            .collect();
        let version_ids: Vec<String> =
            versions.iter().map(|v| v.version_id.clone()).collect();
        let created_at: HashMap<&str, time::OffsetDateTime> = versions
            .iter()
            .map(|v| (v.version_id.as_str(), v.created_at))
            .collect();

        let rows = self
            .catalog
            .list_files_for_versions(&version_ids, &categories)
            .await?;

        // Newest-wins dedup by local_path, keyed on the owning version's
        // creation time.
        let mut by_local_path: HashMap<String, depot_catalog::models::UpdateFileRow> =
            HashMap::new();
        for row in rows {
            let row_created = created_at.get(row.version_id.as_str()).copied();
            match by_local_path.get(&row.local_path) {
                Some(existing) => {
                    let existing_created =
                        created_at.get(existing.version_id.as_str()).copied();
                    if row_created > existing_created {
                        by_local_path.insert(row.local_path.clone(), row);
                    }
                }
                None => {
                    by_local_path.insert(row.local_path.clone(), row);
                }
            }
        }

        let files: Vec<ManifestFile> = by_local_path
            .into_values()
            .map(|row| ManifestFile {
                url_path: row.version_id.to_ascii_uppercase(),
                local_path: row.local_path,
                filename: row.file_name,
                extension: row.extension,
                packed_size: row.packed_size as u64,
                original_size: row.file_size as u64,
                crc32: row.crc32,
            })
            .collect();

        let manifest = Manifest {
            version: target_number.to_string(),
            files,
        };

        let serialized = serde_json::to_vec(&manifest)
            .map_err(|e| ApiError::Internal(format!("manifest serialization failed: {e}")))?;
        self.cache.insert(cache_key, Bytes::from(serialized)).await;

        metrics::MANIFESTS_SERVED.inc();
        Ok(manifest)
    }
}
