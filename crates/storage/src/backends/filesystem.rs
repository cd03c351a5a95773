//! Local filesystem blob store backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::BlobStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Local filesystem blob store.
///
/// Writes are atomic: data lands in a scratch file under the root and is
/// renamed into place.
pub struct FilesystemBackend {
    root: PathBuf,
    scratch: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend rooted at `root`.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        let scratch = root.join(".scratch");
        fs::create_dir_all(&scratch).await?;
        Ok(Self { root, scratch })
    }

    /// Resolve a key to a path under the root, rejecting traversal attempts.
    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let key = key.trim_matches('/');
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
        if key.contains("..") || key.contains('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }
        for component in Path::new(key).components() {
            match component {
                std::path::Component::Normal(_) => {}
                _ => {
                    return Err(StorageError::InvalidKey(format!(
                        "contains unsafe path component: {key}"
                    )));
                }
            }
        }
        Ok(self.root.join(key))
    }

    fn scratch_path(&self) -> PathBuf {
        self.scratch.join(Uuid::new_v4().to_string())
    }

    /// Move a fully written scratch file into place.
    async fn promote(&self, tmp: &Path, key: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        if let Err(e) = fs::rename(tmp, &path).await {
            let _ = fs::remove_file(tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FilesystemBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let tmp = self.scratch_path();
        if let Err(e) = fs::write(&tmp, &data).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        self.promote(&tmp, key).await
    }

    async fn upload(&self, src: &Path, key: &str) -> StorageResult<()> {
        let tmp = self.scratch_path();
        if let Err(e) = fs::copy(src, &tmp).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        self.promote(&tmp, key).await
    }

    async fn download(&self, key: &str, dst: &Path) -> StorageResult<()> {
        let src = self.key_path(key)?;
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp = dst.with_extension(format!("partial-{}", Uuid::new_v4()));
        let result = async {
            match fs::copy(&src, &tmp).await {
                Ok(_) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(StorageError::NotFound(key.to_string()))
                }
                Err(e) => Err(StorageError::from(e)),
            }?;
            fs::rename(&tmp, dst).await?;
            Ok(())
        }
        .await;

        if result.is_err() {
            // The rename is atomic, so only the scratch copy can be partial.
            let _ = fs::remove_file(&tmp).await;
        }
        result
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> StorageResult<()> {
        let path = self.key_path(prefix)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => {
                fs::remove_dir_all(&path).await?;
                Ok(())
            }
            Ok(_) => {
                fs::remove_file(&path).await?;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let prefix = prefix.trim_matches('/').to_string();
        let dir = self.key_path(&prefix)?;
        let root = dir.clone();

        tokio::task::spawn_blocking(move || {
            if !root.exists() {
                return Ok(Vec::new());
            }
            let mut keys = Vec::new();
            for entry in walkdir::WalkDir::new(&root) {
                let entry = entry.map_err(|e| {
                    StorageError::Io(std::io::Error::other(format!("walk failed: {e}")))
                })?;
                if entry.file_type().is_file() {
                    let rel = entry
                        .path()
                        .strip_prefix(&root)
                        .map_err(|e| StorageError::InvalidPath(e.to_string()))?;
                    let rel: Vec<&str> = rel
                        .components()
                        .filter_map(|c| match c {
                            std::path::Component::Normal(part) => part.to_str(),
                            _ => None,
                        })
                        .collect();
                    keys.push(format!("{prefix}/{}", rel.join("/")));
                }
            }
            keys.sort();
            Ok(keys)
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}"))))?
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn build() -> (tempfile::TempDir, FilesystemBackend) {
        let temp = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path().join("blobs")).await.unwrap();
        (temp, backend)
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let (_temp, backend) = build().await;
        backend
            .put("A/B/c.data", Bytes::from_static(b"payload"))
            .await
            .unwrap();
        assert!(backend.exists("A/B/c.data").await.unwrap());
        assert_eq!(backend.get("A/B/c.data").await.unwrap(), "payload");
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let (_temp, backend) = build().await;
        match backend.get("nope").await {
            Err(StorageError::NotFound(_)) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_temp, backend) = build().await;
        backend.put("k", Bytes::from_static(b"x")).await.unwrap();
        backend.delete("k").await.unwrap();
        backend.delete("k").await.unwrap();
        assert!(!backend.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn traversal_keys_rejected() {
        let (_temp, backend) = build().await;
        for key in ["../escape", "a/../../b", "/abs", "a\\b"] {
            assert!(
                matches!(backend.get(key).await, Err(StorageError::InvalidKey(_))),
                "key {key} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn download_cleans_partial_on_failure() {
        let (temp, backend) = build().await;
        let dst = temp.path().join("out/file.bin");
        assert!(backend.download("missing", &dst).await.is_err());
        assert!(!dst.exists());
    }

    #[tokio::test]
    async fn list_returns_prefixed_keys() {
        let (_temp, backend) = build().await;
        backend.put("p/1.data", Bytes::from_static(b"1")).await.unwrap();
        backend.put("p/sub/2.data", Bytes::from_static(b"2")).await.unwrap();
        backend.put("q/3.data", Bytes::from_static(b"3")).await.unwrap();

        let keys = backend.list("p").await.unwrap();
        assert_eq!(keys, vec!["p/1.data", "p/sub/2.data"]);
        assert!(backend.list("absent").await.unwrap().is_empty());
    }
}
