//! Update pipeline job bodies: reassembly and publish.

use crate::layout;
use crate::queue::JobHandle;
use depot_catalog::models::{JobRow, UpdateFileRow};
use depot_catalog::{CatalogError, CatalogStore};
use depot_core::{Category, ContentHash, JobPayload, UploadState, VersionState};
use depot_storage::{BlobStore, StorageError, ops};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// Pipeline job errors. Failed jobs are retained by the queue for re-drive;
/// integrity failures additionally leave the upload in PROCESSING so an
/// operator can investigate instead of the system silently retrying.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("integrity failure: {0}")]
    Integrity(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("empty update folder")]
    EmptyUpdate,

    #[error("archive error: {0}")]
    Archive(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),
}

fn join_err(err: tokio::task::JoinError) -> PipelineError {
    PipelineError::Io(std::io::Error::other(format!("task join failed: {err}")))
}

/// Executes pipeline jobs against the catalog and the two blob stores.
pub struct UpdatePipeline {
    catalog: Arc<dyn CatalogStore>,
    input: Arc<dyn BlobStore>,
    output: Arc<dyn BlobStore>,
}

impl UpdatePipeline {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        input: Arc<dyn BlobStore>,
        output: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            catalog,
            input,
            output,
        }
    }

    /// Execute one leased job.
    pub async fn run(&self, job: &JobRow, handle: &JobHandle) -> Result<(), PipelineError> {
        let payload: JobPayload = serde_json::from_str(&job.payload_json)?;
        match payload {
            JobPayload::ProcessUpload {
                version_id,
                upload_id,
                concurrent_id,
            } => {
                self.process_upload(&version_id, &upload_id, &concurrent_id, handle)
                    .await
            }
            JobPayload::ProcessPublish { version_id } => {
                self.process_publish(&version_id, handle).await
            }
        }
    }

    /// Reassemble the chunks of an upload epoch into the declared zip,
    /// verify its hash, and store it for publishing.
    #[tracing::instrument(skip(self, handle))]
    async fn process_upload(
        &self,
        version_id: &str,
        upload_id: &str,
        concurrent_id: &str,
        handle: &JobHandle,
    ) -> Result<(), PipelineError> {
        let upload = self
            .catalog
            .get_upload(upload_id)
            .await?
            .ok_or_else(|| PipelineError::Precondition(format!("upload {upload_id} not found")))?;
        if upload.concurrent_id != concurrent_id {
            return Err(PipelineError::Precondition(
                "upload epoch rotated since the job was queued".to_string(),
            ));
        }
        if upload.version_id != version_id {
            return Err(PipelineError::Precondition(format!(
                "upload {upload_id} does not belong to version {version_id}"
            )));
        }
        if upload.state == UploadState::Ready.as_str() {
            // A re-driven job that already finished.
            return Ok(());
        }

        let moved = self
            .catalog
            .set_upload_state(
                upload_id,
                UploadState::Pending,
                UploadState::Processing,
                OffsetDateTime::now_utc(),
            )
            .await?;
        if !moved && upload.state != UploadState::Processing.as_str() {
            return Err(PipelineError::Precondition(format!(
                "upload {upload_id} is in state {}, expected pending",
                upload.state
            )));
        }

        let scratch = tempfile::tempdir()?;
        let chunk_dir = scratch.path().join("chunks");
        let chunk_prefix = layout::chunk_prefix(&upload.upload_id, &upload.hash);

        ops::download_folder(
            self.input.as_ref(),
            &chunk_prefix,
            &chunk_dir,
            Some(handle.progress_band(0.0, 50.0)),
        )
        .await?;

        let zip_path = scratch.path().join("update.zip");
        let expected_chunks = upload.chunks_count as usize;
        let assembled_hash = {
            let chunk_dir = chunk_dir.clone();
            let zip_path = zip_path.clone();
            tokio::task::spawn_blocking(move || concatenate_chunks(&chunk_dir, &zip_path, expected_chunks))
                .await
                .map_err(join_err)??
        };
        handle.update_progress(90.0).await;

        if assembled_hash != upload.hash {
            // Leave the upload in PROCESSING for operator inspection; this
            // must not be silently retried into a corrupt publish.
            return Err(PipelineError::Integrity(format!(
                "assembled hash {assembled_hash} does not match declared {}",
                upload.hash
            )));
        }

        ops::upload_file(
            self.input.as_ref(),
            &zip_path,
            &layout::assembled_zip_key(&upload.version_id),
            Some(handle.progress_band(90.0, 100.0)),
        )
        .await?;

        self.catalog
            .set_upload_state(
                upload_id,
                UploadState::Processing,
                UploadState::Ready,
                OffsetDateTime::now_utc(),
            )
            .await?;

        if let Err(e) = ops::delete_folder(self.input.as_ref(), &chunk_prefix).await {
            tracing::warn!(upload_id, error = %e, "Failed to delete chunk blobs");
        }
        self.catalog.delete_chunks(upload_id).await?;

        handle.update_progress(100.0).await;
        Ok(())
    }

    /// Extract, classify, compress, and publish an assembled version, then
    /// commit the file rows and the READY flip in one transaction.
    #[tracing::instrument(skip(self, handle))]
    async fn process_publish(
        &self,
        version_id: &str,
        handle: &JobHandle,
    ) -> Result<(), PipelineError> {
        let version = self
            .catalog
            .get_version(version_id)
            .await?
            .ok_or_else(|| {
                PipelineError::Precondition(format!("version {version_id} not found"))
            })?;
        if version.state == VersionState::Ready.as_str() {
            return Err(PipelineError::Precondition(format!(
                "version {version_id} is already published"
            )));
        }

        let moved = self
            .catalog
            .set_version_state(
                version_id,
                VersionState::Pending,
                VersionState::Processing,
                OffsetDateTime::now_utc(),
            )
            .await?;
        if !moved && version.state != VersionState::Processing.as_str() {
            return Err(PipelineError::Precondition(format!(
                "version {version_id} is in state {}, expected pending",
                version.state
            )));
        }

        let scratch = tempfile::tempdir()?;
        let zip_path = scratch.path().join("update.zip");
        ops::download_file(
            self.input.as_ref(),
            &layout::assembled_zip_key(version_id),
            &zip_path,
            Some(handle.progress_band(0.0, 20.0)),
        )
        .await?;

        let unpacked = scratch.path().join("unpacked");
        {
            let zip_path = zip_path.clone();
            let unpacked = unpacked.clone();
            tokio::task::spawn_blocking(move || extract_archive(&zip_path, &unpacked))
                .await
                .map_err(join_err)??;
        }
        handle.update_progress(25.0).await;

        let entries = {
            let unpacked = unpacked.clone();
            tokio::task::spawn_blocking(move || classify_tree(&unpacked))
                .await
                .map_err(join_err)??
        };
        if entries.is_empty() {
            return Err(PipelineError::EmptyUpdate);
        }

        let processed = scratch.path().join("processed");
        let now = OffsetDateTime::now_utc();
        let total = entries.len();
        let mut rows = Vec::with_capacity(total);

        for (index, entry) in entries.into_iter().enumerate() {
            let data = tokio::fs::read(&entry.path).await?;
            let original_size = data.len() as i64;

            let (packed, crc_hex) = tokio::task::spawn_blocking(move || pack_entry(&data))
                .await
                .map_err(join_err)??;

            let file_name =
                format!("{}_{}", Uuid::new_v4(), crc_hex).to_ascii_uppercase();
            let out_path = processed
                .join(entry.category.folder_name())
                .join(format!("{file_name}{}", depot_core::PACKED_EXTENSION));
            if let Some(parent) = out_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&out_path, &packed).await?;

            rows.push(UpdateFileRow {
                version_id: version_id.to_string(),
                category: entry.category.index() as i64,
                file_name,
                extension: depot_core::PACKED_EXTENSION.to_string(),
                local_path: entry.local_path,
                packed_size: packed.len() as i64,
                file_size: original_size,
                crc32: crc_hex,
                created_at: now,
            });

            if (index + 1) % 100 == 0 || index + 1 == total {
                handle
                    .update_progress(25.0 + 25.0 * (index + 1) as f64 / total as f64)
                    .await;
            }
        }

        // The published tree is the packed one; the manifest's
        // Filename/Extension always match the objects under publish/.
        ops::upload_folder(
            self.output.as_ref(),
            &processed,
            &layout::publish_prefix(version_id),
            Some(handle.progress_band(50.0, 90.0)),
        )
        .await?;

        self.catalog
            .commit_version_files(version_id, &rows, OffsetDateTime::now_utc())
            .await?;

        handle.update_progress(100.0).await;
        Ok(())
    }
}

/// A classified archive entry awaiting packing.
struct ClassifiedEntry {
    category: Category,
    local_path: String,
    path: PathBuf,
}

/// Concatenate downloaded chunk files in offset order and hash the result.
///
/// Chunk names are zero-padded offsets, so the lexical sort is the numeric
/// order.
fn concatenate_chunks(
    chunk_dir: &Path,
    zip_path: &Path,
    expected_chunks: usize,
) -> Result<String, PipelineError> {
    let mut chunk_files: Vec<PathBuf> = std::fs::read_dir(chunk_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    chunk_files.sort();

    if chunk_files.len() != expected_chunks {
        return Err(PipelineError::Precondition(format!(
            "expected {expected_chunks} chunk blobs, found {}",
            chunk_files.len()
        )));
    }

    let mut out = std::fs::File::create(zip_path)?;
    let mut hasher = ContentHash::hasher();
    for path in chunk_files {
        let data = std::fs::read(&path)?;
        hasher.update(&data);
        out.write_all(&data)?;
    }
    out.flush()?;
    Ok(hasher.finalize().to_hex())
}

/// Decompress the whole archive into `dst`.
fn extract_archive(zip_path: &Path, dst: &Path) -> Result<(), PipelineError> {
    let file = std::fs::File::open(zip_path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| PipelineError::Archive(e.to_string()))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| PipelineError::Archive(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        // enclosed_name rejects entries escaping the extraction root.
        let Some(rel) = entry.enclosed_name() else {
            continue;
        };
        let out_path = dst.join(rel);
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

/// Enumerate the extracted tree and classify each file by its folder.
/// Unclassified files are dropped.
fn classify_tree(root: &Path) -> Result<Vec<ClassifiedEntry>, PipelineError> {
    let mut entries = Vec::new();
    for entry in walkdir::WalkDir::new(root) {
        let entry =
            entry.map_err(|e| PipelineError::Io(std::io::Error::other(e.to_string())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| PipelineError::Io(std::io::Error::other(e.to_string())))?;
        let rel: Vec<&str> = rel
            .components()
            .filter_map(|c| match c {
                std::path::Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();
        let rel = rel.join("/");

        if let Some((category, local_path)) = depot_core::classify_path(&rel) {
            entries.push(ClassifiedEntry {
                category,
                local_path,
                path: entry.path().to_path_buf(),
            });
        }
    }
    // Deterministic packing order.
    entries.sort_by(|a, b| {
        (a.category.index(), a.local_path.as_str()).cmp(&(b.category.index(), b.local_path.as_str()))
    });
    Ok(entries)
}

/// CRC-32 then zlib-deflate at level 9: the `.eupdz` payload.
fn pack_entry(data: &[u8]) -> Result<(Vec<u8>, String), PipelineError> {
    let mut crc = flate2::Crc::new();
    crc.update(data);
    let crc_hex = format!("{:08x}", crc.sum());

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(9));
    encoder.write_all(data)?;
    let packed = encoder.finish()?;
    Ok((packed, crc_hex))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    #[test]
    fn test_pack_entry_roundtrip() {
        let original = b"the quick brown fox jumps over the lazy dog".repeat(50);
        let (packed, crc_hex) = pack_entry(&original).unwrap();
        assert!(packed.len() < original.len());
        assert_eq!(crc_hex.len(), 8);

        let mut decoder = ZlibDecoder::new(packed.as_slice());
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).unwrap();
        assert_eq!(decompressed, original);

        // The reported CRC matches the original bytes.
        let mut crc = flate2::Crc::new();
        crc.update(&decompressed);
        assert_eq!(format!("{:08x}", crc.sum()), crc_hex);
    }

    #[test]
    fn test_concatenate_chunks_orders_numerically() {
        let temp = tempfile::tempdir().unwrap();
        let chunk_dir = temp.path().join("chunks");
        std::fs::create_dir_all(&chunk_dir).unwrap();
        // Written out of order; names force numeric assembly order.
        std::fs::write(chunk_dir.join("00000002.data"), b"C").unwrap();
        std::fs::write(chunk_dir.join("00000000.data"), b"A").unwrap();
        std::fs::write(chunk_dir.join("00000001.data"), b"B").unwrap();

        let out = temp.path().join("update.zip");
        let hash = concatenate_chunks(&chunk_dir, &out, 3).unwrap();

        assert_eq!(std::fs::read(&out).unwrap(), b"ABC");
        assert_eq!(hash, ContentHash::compute(b"ABC").to_hex());
    }

    #[test]
    fn test_concatenate_chunks_rejects_missing_chunks() {
        let temp = tempfile::tempdir().unwrap();
        let chunk_dir = temp.path().join("chunks");
        std::fs::create_dir_all(&chunk_dir).unwrap();
        std::fs::write(chunk_dir.join("00000000.data"), b"A").unwrap();

        let out = temp.path().join("update.zip");
        let err = concatenate_chunks(&chunk_dir, &out, 2).unwrap_err();
        assert!(matches!(err, PipelineError::Precondition(_)));
    }
}
