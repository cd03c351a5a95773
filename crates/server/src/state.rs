//! Application state shared across handlers and workers.

use crate::auth::TokenIntrospector;
use crate::cache::ManifestCache;
use crate::queue::JobQueue;
use depot_catalog::CatalogStore;
use depot_core::config::AppConfig;
use depot_storage::BlobStore;
use std::sync::Arc;
use std::time::Duration;

/// Long-lived process singletons, initialized by the shell at startup and
/// injected into every handler and worker.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub catalog: Arc<dyn CatalogStore>,
    /// Transient store: upload chunks and assembled zips.
    pub input: Arc<dyn BlobStore>,
    /// Durable store: published packed files.
    pub output: Arc<dyn BlobStore>,
    pub manifest_cache: ManifestCache,
    pub queue: JobQueue,
    pub introspector: Option<Arc<TokenIntrospector>>,
}

impl AppState {
    /// Create application state from initialized handles.
    pub fn new(
        config: AppConfig,
        catalog: Arc<dyn CatalogStore>,
        input: Arc<dyn BlobStore>,
        output: Arc<dyn BlobStore>,
    ) -> Self {
        let manifest_cache =
            ManifestCache::new(Duration::from_secs(config.cache.manifest_ttl_secs));
        let queue = JobQueue::new(catalog.clone());
        let introspector = config
            .auth
            .clone()
            .map(|auth| Arc::new(TokenIntrospector::new(auth)));

        Self {
            config: Arc::new(config),
            catalog,
            input,
            output,
            manifest_cache,
            queue,
            introspector,
        }
    }
}
