//! S3-compatible blob store backend using the AWS SDK.
//!
//! Serves the `aws` provider directly and the `gcp` provider through the
//! Google storage S3-interoperability XML API (endpoint override + HMAC
//! credentials).

use crate::error::{StorageError, StorageResult};
use crate::traits::BlobStore;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use bytes::Bytes;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

fn s3_err<E: std::error::Error + Send + Sync + 'static>(err: E) -> StorageError {
    StorageError::S3(Box::new(err))
}

/// S3-compatible blob store.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl S3Backend {
    /// Create a new S3 backend.
    ///
    /// With explicit credentials they are used directly; otherwise the
    /// ambient AWS credential chain applies. `force_path_style` is required
    /// for MinIO-style services.
    pub async fn new(
        bucket: &str,
        endpoint: Option<String>,
        region: Option<String>,
        prefix: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        force_path_style: bool,
    ) -> StorageResult<Self> {
        if access_key_id.is_some() != secret_access_key.is_some() {
            return Err(StorageError::Config(
                "s3 config requires both access_key_id and secret_access_key when either is set"
                    .to_string(),
            ));
        }

        let resolved_region = region.unwrap_or_else(|| "us-east-1".to_string());
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(resolved_region))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if let (Some(key_id), Some(secret)) = (access_key_id, secret_access_key) {
            let credentials =
                aws_sdk_s3::config::Credentials::new(key_id, secret, None, None, "depot-config");
            builder = builder.credentials_provider(credentials);
        }
        builder = builder.force_path_style(force_path_style);

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: bucket.to_string(),
            prefix: prefix.filter(|p| !p.is_empty()),
        })
    }

    /// Apply the configured key prefix.
    fn full_key(&self, key: &str) -> String {
        let key = key.trim_matches('/');
        match &self.prefix {
            Some(prefix) => format!("{}/{key}", prefix.trim_matches('/')),
            None => key.to_string(),
        }
    }

    /// Strip the configured key prefix from a listed key.
    fn strip_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => key
                .strip_prefix(&format!("{}/", prefix.trim_matches('/')))
                .unwrap_or(key)
                .to_string(),
            None => key.to_string(),
        }
    }

    /// Page through every key under a prefix.
    async fn list_full_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let full_prefix = format!("{}/", self.full_key(prefix));
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&full_prefix);
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(s3_err)?;
            for object in response.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl BlobStore for S3Backend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(s3_err(service_err))
                }
            }
        }
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await;
        match result {
            Ok(response) => {
                let data = response.body.collect().await.map_err(s3_err)?;
                Ok(data.into_bytes())
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    Err(StorageError::NotFound(key.to_string()))
                } else {
                    Err(s3_err(service_err))
                }
            }
        }
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(s3_err)?;
        Ok(())
    }

    async fn upload(&self, src: &Path, key: &str) -> StorageResult<()> {
        let body = ByteStream::from_path(src).await.map_err(s3_err)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .body(body)
            .send()
            .await
            .map_err(s3_err)?;
        Ok(())
    }

    async fn download(&self, key: &str, dst: &Path) -> StorageResult<()> {
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = dst.with_extension(format!("partial-{}", Uuid::new_v4()));
        let result = async {
            let response = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(self.full_key(key))
                .send()
                .await;
            let mut body = match response {
                Ok(resp) => resp.body,
                Err(err) => {
                    let service_err = err.into_service_error();
                    if service_err.is_no_such_key() {
                        return Err(StorageError::NotFound(key.to_string()));
                    }
                    return Err(s3_err(service_err));
                }
            };

            let mut file = tokio::fs::File::create(&tmp).await?;
            while let Some(chunk) = body.try_next().await.map_err(s3_err)? {
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            drop(file);

            tokio::fs::rename(&tmp, dst).await?;
            Ok(())
        }
        .await;

        if result.is_err() {
            // The rename is atomic, so only the scratch copy can be partial.
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        result
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(s3_err)?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> StorageResult<()> {
        let keys = self.list_full_keys(prefix).await?;

        for batch in keys.chunks(1000) {
            let objects: Vec<ObjectIdentifier> = batch
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<_, _>>()
                .map_err(s3_err)?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .build()
                .map_err(s3_err)?;
            self.client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(s3_err)?;
        }

        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .list_full_keys(prefix)
            .await?
            .into_iter()
            .map(|key| self.strip_key(&key))
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(s3_err)?;
        Ok(())
    }
}
