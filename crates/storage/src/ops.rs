//! Folder-level transfer operations over any [`BlobStore`].
//!
//! Folder transfers fan out with bounded concurrency; a single failed file
//! fails the whole call. Progress reports the completed-file fraction and
//! always fires once at the end.

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobStore, Progress};
use bytes::Bytes;
use futures::stream::{self, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Maximum concurrent transfers per folder operation.
pub const MAX_PARALLEL_TRANSFERS: usize = 10;

fn report(progress: &Option<Progress>, value: f64) {
    if let Some(cb) = progress {
        cb(value.clamp(0.0, 1.0));
    }
}

/// Join a key prefix and a relative path into an object key with forward
/// slashes, regardless of the host path separator.
fn key_under_prefix(prefix: &str, rel: &Path) -> StorageResult<String> {
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            std::path::Component::Normal(part) => {
                parts.push(part.to_str().ok_or_else(|| {
                    StorageError::InvalidPath(format!("non-UTF-8 path: {rel:?}"))
                })?);
            }
            _ => {
                return Err(StorageError::InvalidPath(format!(
                    "unexpected path component in {rel:?}"
                )));
            }
        }
    }
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        Ok(parts.join("/"))
    } else {
        Ok(format!("{prefix}/{}", parts.join("/")))
    }
}

/// Download a single object to a local path.
pub async fn download_file(
    store: &dyn BlobStore,
    src_key: &str,
    dst: &Path,
    progress: Option<Progress>,
) -> StorageResult<()> {
    store.download(src_key, dst).await?;
    report(&progress, 1.0);
    Ok(())
}

/// Upload a single local file.
pub async fn upload_file(
    store: &dyn BlobStore,
    src: &Path,
    dst_key: &str,
    progress: Option<Progress>,
) -> StorageResult<()> {
    store.upload(src, dst_key).await?;
    report(&progress, 1.0);
    Ok(())
}

/// Upload an in-memory buffer.
pub async fn upload_buffer(
    store: &dyn BlobStore,
    data: Bytes,
    dst_key: &str,
    progress: Option<Progress>,
) -> StorageResult<()> {
    store.put(dst_key, data).await?;
    report(&progress, 1.0);
    Ok(())
}

/// Download every object under `src_prefix` into `dst_dir`, preserving the
/// relative key structure.
pub async fn download_folder(
    store: &dyn BlobStore,
    src_prefix: &str,
    dst_dir: &Path,
    progress: Option<Progress>,
) -> StorageResult<()> {
    let prefix = src_prefix.trim_end_matches('/').to_string();
    let keys = store.list(&prefix).await?;
    let total = keys.len();
    if total == 0 {
        report(&progress, 1.0);
        return Ok(());
    }

    let done = Arc::new(AtomicUsize::new(0));
    stream::iter(keys.into_iter().map(Ok::<_, StorageError>))
        .try_for_each_concurrent(MAX_PARALLEL_TRANSFERS, |key| {
            let done = done.clone();
            let progress = progress.clone();
            let prefix = prefix.clone();
            async move {
                let rel = key
                    .strip_prefix(&prefix)
                    .map(|r| r.trim_start_matches('/'))
                    .unwrap_or(key.as_str());
                let mut dst: PathBuf = dst_dir.to_path_buf();
                for part in rel.split('/') {
                    dst.push(part);
                }
                store.download(&key, &dst).await?;
                let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                report(&progress, finished as f64 / total as f64);
                Ok(())
            }
        })
        .await?;

    report(&progress, 1.0);
    Ok(())
}

/// Upload every file under `src_dir` to keys below `dst_prefix`.
pub async fn upload_folder(
    store: &dyn BlobStore,
    src_dir: &Path,
    dst_prefix: &str,
    progress: Option<Progress>,
) -> StorageResult<()> {
    let files = collect_files(src_dir).await?;
    let total = files.len();
    if total == 0 {
        report(&progress, 1.0);
        return Ok(());
    }

    let done = Arc::new(AtomicUsize::new(0));
    stream::iter(files.into_iter().map(Ok::<_, StorageError>))
        .try_for_each_concurrent(MAX_PARALLEL_TRANSFERS, |(path, rel)| {
            let done = done.clone();
            let progress = progress.clone();
            async move {
                let key = key_under_prefix(dst_prefix, &rel)?;
                store.upload(&path, &key).await?;
                let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                report(&progress, finished as f64 / total as f64);
                Ok(())
            }
        })
        .await?;

    report(&progress, 1.0);
    Ok(())
}

/// Remove all blobs under a prefix; idempotent.
pub async fn delete_folder(store: &dyn BlobStore, prefix: &str) -> StorageResult<()> {
    store.delete_prefix(prefix).await
}

/// Enumerate regular files under a directory as `(absolute, relative)`.
async fn collect_files(dir: &Path) -> StorageResult<Vec<(PathBuf, PathBuf)>> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&dir) {
            let entry = entry.map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("walk failed: {e}")))
            })?;
            if entry.file_type().is_file() {
                let rel = entry
                    .path()
                    .strip_prefix(&dir)
                    .map_err(|e| StorageError::InvalidPath(e.to_string()))?
                    .to_path_buf();
                files.push((entry.path().to_path_buf(), rel));
            }
        }
        // Deterministic transfer order.
        files.sort();
        Ok(files)
    })
    .await
    .map_err(|e| StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}"))))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::filesystem::FilesystemBackend;
    use std::sync::Mutex;

    fn tracking_progress() -> (Progress, Arc<Mutex<Vec<f64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cb: Progress = Arc::new(move |value| {
            sink.lock().unwrap().push(value);
        });
        (cb, seen)
    }

    #[tokio::test]
    async fn folder_roundtrip_preserves_structure() {
        let temp = tempfile::tempdir().unwrap();
        let store = FilesystemBackend::new(temp.path().join("blobs")).await.unwrap();

        let src = temp.path().join("src");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::write(src.join("a.bin"), b"alpha").unwrap();
        std::fs::write(src.join("nested/b.bin"), b"beta").unwrap();

        let (progress, seen) = tracking_progress();
        upload_folder(&store, &src, "publish/V1", Some(progress))
            .await
            .unwrap();
        {
            let seen = seen.lock().unwrap();
            assert!(!seen.is_empty());
            assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress not monotone");
            assert_eq!(*seen.last().unwrap(), 1.0);
        }

        let mut keys = store.list("publish/V1").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["publish/V1/a.bin", "publish/V1/nested/b.bin"]);

        let dst = temp.path().join("dst");
        download_folder(&store, "publish/V1", &dst, None).await.unwrap();
        assert_eq!(std::fs::read(dst.join("a.bin")).unwrap(), b"alpha");
        assert_eq!(std::fs::read(dst.join("nested/b.bin")).unwrap(), b"beta");
    }

    #[tokio::test]
    async fn delete_folder_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let store = FilesystemBackend::new(temp.path().join("blobs")).await.unwrap();

        upload_buffer(&store, Bytes::from_static(b"x"), "drop/a", None)
            .await
            .unwrap();
        delete_folder(&store, "drop").await.unwrap();
        assert!(store.list("drop").await.unwrap().is_empty());
        // Second delete of an absent prefix succeeds.
        delete_folder(&store, "drop").await.unwrap();
    }

    #[tokio::test]
    async fn empty_folder_reports_completion() {
        let temp = tempfile::tempdir().unwrap();
        let store = FilesystemBackend::new(temp.path().join("blobs")).await.unwrap();

        let out = temp.path().join("out");
        let (progress, seen) = tracking_progress();
        download_folder(&store, "missing", &out, Some(progress))
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap().last().unwrap(), 1.0);
    }
}
