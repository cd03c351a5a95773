//! Blob storage abstraction and backends for depot.
//!
//! Two logical stores back the pipeline: an Input store holding transient
//! upload chunks and assembled zips, and an Output store holding published
//! packed files. Both are plain [`BlobStore`] handles built from
//! configuration.

pub mod backends;
pub mod error;
pub mod ops;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use traits::{BlobStore, Progress};

use depot_core::config::StorageConfig;
use std::sync::Arc;

/// Create a blob store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn BlobStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Local { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::Aws {
            bucket,
            endpoint,
            region,
            subpath,
            access_key_id,
            secret_access_key,
            force_path_style,
        } => {
            let backend = S3Backend::new(
                bucket,
                endpoint.clone(),
                region.clone(),
                subpath.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
            )
            .await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::Gcp {
            bucket,
            endpoint,
            subpath,
            access_key_id,
            secret_access_key,
        } => {
            // Google object storage speaks the S3 XML API with HMAC keys;
            // path-style addressing is mandatory there.
            let backend = S3Backend::new(
                bucket,
                Some(endpoint.clone()),
                None,
                subpath.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                true,
            )
            .await?;
            Ok(Arc::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn from_config_filesystem_ok() {
        let temp = tempfile::tempdir().unwrap();
        let config = StorageConfig::Local {
            path: temp.path().join("store"),
        };

        let store = from_config(&config).await.unwrap();
        store
            .put("hello.txt", Bytes::from_static(b"hi"))
            .await
            .unwrap();
        assert!(store.exists("hello.txt").await.unwrap());
        assert_eq!(store.backend_name(), "filesystem");
    }

    #[tokio::test]
    async fn from_config_rejects_partial_credentials() {
        let config = StorageConfig::Aws {
            bucket: "bucket".to_string(),
            endpoint: None,
            region: None,
            subpath: None,
            access_key_id: Some("access".to_string()),
            secret_access_key: None,
            force_path_style: false,
        };

        match from_config(&config).await {
            Err(StorageError::Config(_)) => {}
            _ => panic!("unexpected result from from_config"),
        }
    }
}
