//! Shared manifest cache with bounded coherence.

use bytes::Bytes;
use moka::future::Cache;
use std::time::Duration;

/// Keyed byte-store for computed manifests.
///
/// Misses are silent; concurrent writers race last-write-wins, which is
/// sound because every writer computes the same value for a given key.
#[derive(Clone)]
pub struct ManifestCache {
    cache: Cache<String, Bytes>,
}

impl ManifestCache {
    /// Create a cache whose entries expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    /// Look up a serialized manifest.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.cache.get(key).await
    }

    /// Store a serialized manifest.
    pub async fn insert(&self, key: String, value: Bytes) {
        self.cache.insert(key, value).await;
    }

    /// Number of live entries (tests and diagnostics).
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_and_miss() {
        let cache = ManifestCache::new(Duration::from_secs(60));
        assert!(cache.get("absent").await.is_none());

        cache
            .insert("update-1.0.0-1.0.2-0-2".to_string(), Bytes::from_static(b"{}"))
            .await;
        assert_eq!(
            cache.get("update-1.0.0-1.0.2-0-2").await.unwrap(),
            Bytes::from_static(b"{}")
        );
    }
}
