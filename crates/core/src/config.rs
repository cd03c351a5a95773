//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server listener configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP API bind address.
    #[serde(default = "default_api_bind")]
    pub api_bind: String,
    /// gRPC bind address.
    #[serde(default = "default_grpc_bind")]
    pub grpc_bind: String,
}

fn default_api_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_grpc_bind() -> String {
    "0.0.0.0:50051".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_bind: default_api_bind(),
            grpc_bind: default_grpc_bind(),
        }
    }
}

/// Job queue configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue name, used as a label in logs and metrics.
    #[serde(default = "default_queue_name")]
    pub name: String,
    /// Worker loops to spawn. Zero disables in-process job execution.
    #[serde(default = "default_queue_workers")]
    pub workers: u32,
    /// Idle poll interval between lease attempts, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_queue_name() -> String {
    "updates".to_string()
}

fn default_queue_workers() -> u32 {
    1
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
            workers: default_queue_workers(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Manifest cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live for computed manifests, in seconds.
    #[serde(default = "default_manifest_ttl_secs")]
    pub manifest_ttl_secs: u64,
}

fn default_manifest_ttl_secs() -> u64 {
    8 * 60 * 60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            manifest_ttl_secs: default_manifest_ttl_secs(),
        }
    }
}

/// Blob storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Local {
        /// Root directory for blobs.
        path: PathBuf,
    },
    /// S3-compatible object storage.
    Aws {
        bucket: String,
        /// Optional endpoint URL (for MinIO and friends).
        endpoint: Option<String>,
        region: Option<String>,
        /// Optional key prefix inside the bucket.
        subpath: Option<String>,
        /// Falls back to the ambient AWS credential chain when unset.
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        /// Path-style URLs, required for MinIO-style services.
        #[serde(default)]
        force_path_style: bool,
    },
    /// Google object storage via its S3-interoperability API (HMAC keys).
    Gcp {
        bucket: String,
        #[serde(default = "default_gcp_endpoint")]
        endpoint: String,
        subpath: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
    },
}

fn default_gcp_endpoint() -> String {
    "https://storage.googleapis.com".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Local {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Aws {
                access_key_id,
                secret_access_key,
                ..
            }
            | StorageConfig::Gcp {
                access_key_id,
                secret_access_key,
                ..
            } => match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                (Some(_), Some(_)) | (None, None) => Ok(()),
                _ => Err(
                    "storage config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ),
            },
            StorageConfig::Local { .. } => Ok(()),
        }
    }
}

/// Catalog store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "lowercase")]
pub enum CatalogConfig {
    /// SQLite database (testing and single-node deployments).
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL; takes precedence over individual fields.
        url: Option<String>,
        host: Option<String>,
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        username: Option<String>,
        password: Option<String>,
        database: Option<String>,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_max_connections() -> u32 {
    10
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/catalog.db"),
        }
    }
}

impl CatalogConfig {
    /// Validate catalog configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            CatalogConfig::Sqlite { .. } => Ok(()),
            CatalogConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                _ => Err(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ),
            },
        }
    }
}

/// OAuth token introspection configuration (RFC 7662).
///
/// When absent, every authenticated route refuses with 401; the public
/// resolver and server-list routes keep working.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Introspection endpoint URL.
    pub introspection_url: String,
    /// Client id for basic auth against the endpoint.
    pub client_id: Option<String>,
    /// Client secret for basic auth against the endpoint.
    pub client_secret: Option<String>,
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Transient store: upload chunks and assembled zips.
    #[serde(default)]
    pub input_storage: StorageConfig,
    /// Durable store: published packed files.
    #[serde(default)]
    pub output_storage: StorageConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Token introspection; optional for local development.
    pub auth: Option<AuthConfig>,
}

impl AppConfig {
    /// Validate the whole configuration tree.
    pub fn validate(&self) -> Result<(), String> {
        self.catalog.validate()?;
        self.input_storage.validate()?;
        self.output_storage.validate()?;
        if self.queue.poll_interval_ms == 0 {
            return Err("queue.poll_interval_ms cannot be 0".to_string());
        }
        if self.cache.manifest_ttl_secs == 0 {
            return Err("cache.manifest_ttl_secs cannot be 0".to_string());
        }
        Ok(())
    }

    /// Create a test configuration rooted in a scratch directory.
    ///
    /// **For testing only.** Filesystem storage, SQLite catalog, no auth.
    pub fn for_testing(root: &std::path::Path) -> Self {
        Self {
            server: ServerConfig::default(),
            catalog: CatalogConfig::Sqlite {
                path: root.join("catalog.db"),
            },
            input_storage: StorageConfig::Local {
                path: root.join("input"),
            },
            output_storage: StorageConfig::Local {
                path: root.join("output"),
            },
            queue: QueueConfig::default(),
            cache: CacheConfig::default(),
            auth: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_manifest_ttl_default_is_eight_hours() {
        assert_eq!(CacheConfig::default().manifest_ttl_secs, 28800);
    }

    #[test]
    fn test_storage_partial_credentials_rejected() {
        let config = StorageConfig::Aws {
            bucket: "bucket".to_string(),
            endpoint: None,
            region: None,
            subpath: None,
            access_key_id: Some("key".to_string()),
            secret_access_key: None,
            force_path_style: false,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_postgres_requires_url_or_host() {
        let config = CatalogConfig::Postgres {
            url: None,
            host: None,
            port: None,
            username: None,
            password: None,
            database: None,
            max_connections: 10,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_storage_config_tagged_deserialize() {
        let json = r#"{"provider":"local","path":"/tmp/blobs"}"#;
        let config: StorageConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(config, StorageConfig::Local { .. }));

        let json = r#"{"provider":"gcp","bucket":"b"}"#;
        let config: StorageConfig = serde_json::from_str(json).unwrap();
        match config {
            StorageConfig::Gcp { endpoint, .. } => {
                assert_eq!(endpoint, "https://storage.googleapis.com");
            }
            _ => panic!("expected gcp config"),
        }
    }
}
