//! Core operations shared by the HTTP and gRPC transports.
//!
//! Both adapters validate transport-level input, call these functions, and
//! map [`ApiError`] to their status vocabulary.

use crate::error::{ApiError, ApiResult};
use crate::layout;
use crate::metrics;
use crate::state::AppState;
use bytes::Bytes;
use depot_catalog::CatalogError;
use depot_catalog::models::{UploadChunkRow, UploadRow, VersionRow};
use depot_catalog::repos::StartUploadParams;
use depot_core::{
    ChunkRange, EpochId, JobPayload, UploadId, UploadState, VersionId, VersionSlot, missing_ranges,
    upload,
};
use serde::Serialize;
use std::collections::HashSet;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Bounds for the manager listing page size.
pub const MIN_PAGE_SIZE: u32 = 4;
pub const MAX_PAGE_SIZE: u32 = 50;

/// Bounds for version descriptions.
pub const MAX_DESCRIPTION_LEN: usize = 256;

/// Allocation retries when racing another creator for the next number.
const ALLOCATE_RETRIES: u32 = 3;

fn fmt_time(t: OffsetDateTime) -> String {
    t.format(&Rfc3339).unwrap_or_default()
}

/// Wire view of a version document.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionView {
    pub id: String,
    pub version: String,
    pub description: String,
    pub state: String,
    pub files_count: u64,
    pub created_at: String,
    pub updated_at: String,
}

impl VersionView {
    fn from_row(row: &VersionRow, files_count: u64) -> Self {
        Self {
            id: row.version_id.clone(),
            version: row.number().to_string(),
            description: row.description.clone(),
            state: row.state.clone(),
            files_count,
            created_at: fmt_time(row.created_at),
            updated_at: fmt_time(row.updated_at),
        }
    }
}

/// Wire view of an upload and what the client still owes.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadView {
    pub upload_id: String,
    pub concurrent_id: String,
    pub state: String,
    pub chunks_count: u64,
    pub missing_ranges: Vec<ChunkRange>,
}

/// Result of a `StartUpload` call.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartUploadView {
    pub upload_id: String,
    pub concurrent_id: String,
    pub chunks_count: u64,
    pub missing_ranges: Vec<ChunkRange>,
}

/// Wire view of a queue entry.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: String,
    pub state: String,
    pub progress: f64,
    pub attempts: i64,
}

/// Parameters of a `StartUpload` call, shared by both transports.
#[derive(Clone, Debug)]
pub struct StartUploadArgs {
    pub version_id: String,
    pub hash: String,
    pub chunk_size: u64,
    pub file_size: u64,
}

fn validate_description(description: &str) -> ApiResult<()> {
    if description.is_empty() || description.len() > MAX_DESCRIPTION_LEN {
        return Err(ApiError::Validation(format!(
            "description must be between 1 and {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(())
}

/// Allocate the next version number and create the version in PENDING.
pub async fn create_version(
    state: &AppState,
    slot_index: i32,
    description: &str,
) -> ApiResult<(String, String)> {
    validate_description(description)?;
    let slot = VersionSlot::from_index(slot_index)?;

    let mut attempt = 0;
    loop {
        let version_id = VersionId::generate().to_hex();
        match state
            .catalog
            .allocate_version(&version_id, slot, description, OffsetDateTime::now_utc())
            .await
        {
            Ok(row) => return Ok((row.version_id, row.number().to_string())),
            Err(CatalogError::Conflict(_)) if attempt < ALLOCATE_RETRIES => {
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Update a version's description.
pub async fn edit_version(state: &AppState, id: &str, description: &str) -> ApiResult<bool> {
    validate_description(description)?;
    let version_id = VersionId::parse(id)?.to_hex();
    Ok(state
        .catalog
        .update_version_description(&version_id, description, OffsetDateTime::now_utc())
        .await?)
}

/// Fetch one version with its file count.
pub async fn fetch_version(state: &AppState, id: &str) -> ApiResult<VersionView> {
    let version_id = VersionId::parse(id)?.to_hex();
    let row = state
        .catalog
        .get_version(&version_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("version {id} not found")))?;
    let files_count = state.catalog.count_files(&version_id).await?;
    Ok(VersionView::from_row(&row, files_count))
}

/// Paginated version listing.
pub async fn list_versions(
    state: &AppState,
    page: u32,
    size: u32,
) -> ApiResult<(Vec<VersionView>, u64)> {
    if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&size) {
        return Err(ApiError::Validation(format!(
            "size must be between {MIN_PAGE_SIZE} and {MAX_PAGE_SIZE}"
        )));
    }

    let (rows, total) = state.catalog.list_versions(page, size).await?;
    let mut views = Vec::with_capacity(rows.len());
    for row in &rows {
        let files_count = state.catalog.count_files(&row.version_id).await?;
        views.push(VersionView::from_row(row, files_count));
    }
    Ok((views, total))
}

async fn upload_view(state: &AppState, row: &UploadRow) -> ApiResult<UploadView> {
    let offsets: HashSet<u64> = state
        .catalog
        .list_chunk_offsets(&row.upload_id, &row.concurrent_id)
        .await?
        .into_iter()
        .map(|o| o as u64)
        .collect();
    Ok(UploadView {
        upload_id: row.upload_id.clone(),
        concurrent_id: row.concurrent_id.clone(),
        state: row.state.clone(),
        chunks_count: row.chunks_count as u64,
        missing_ranges: missing_ranges(&offsets, row.chunks_count as u64),
    })
}

/// The upload attached to a version, with its current missing set.
pub async fn fetch_uploads(state: &AppState, id: &str) -> ApiResult<Vec<UploadView>> {
    let version_id = VersionId::parse(id)?.to_hex();
    match state.catalog.get_upload_by_version(&version_id).await? {
        Some(row) => Ok(vec![upload_view(state, &row).await?]),
        None => Ok(Vec::new()),
    }
}

/// The `StartUpload` operation of the upload coordinator.
pub async fn start_upload(state: &AppState, args: &StartUploadArgs) -> ApiResult<StartUploadView> {
    upload::validate_hash(&args.hash)?;
    upload::validate_chunk_size(args.chunk_size)?;
    upload::validate_file_size(args.file_size)?;

    let version_id = VersionId::parse(&args.version_id)?.to_hex();
    state
        .catalog
        .get_version(&version_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("version {} not found", args.version_id)))?;

    let chunks_count = upload::chunks_count(args.file_size, args.chunk_size);
    let params = StartUploadParams {
        version_id,
        new_upload_id: UploadId::generate().to_hex(),
        new_concurrent_id: EpochId::generate().to_hex(),
        hash: args.hash.clone(),
        chunk_size: args.chunk_size as i64,
        file_size: args.file_size as i64,
        chunks_count: chunks_count as i64,
    };

    let outcome = state
        .catalog
        .start_upload(&params, OffsetDateTime::now_utc())
        .await?;

    // The rotated epoch's blobs are unreachable (reads are epoch-scoped);
    // deletion is best-effort cleanup.
    if let Some(old_hash) = &outcome.rotated_from_hash {
        let prefix = layout::chunk_prefix(&outcome.upload.upload_id, old_hash);
        if let Err(e) = state.input.delete_prefix(&prefix).await {
            tracing::warn!(prefix = %prefix, error = %e, "Failed to delete rotated chunk blobs");
        }
    }

    let view = upload_view(state, &outcome.upload).await?;
    metrics::UPLOADS_STARTED.inc();
    Ok(StartUploadView {
        upload_id: view.upload_id,
        concurrent_id: view.concurrent_id,
        chunks_count: view.chunks_count,
        missing_ranges: view.missing_ranges,
    })
}

/// The `UploadChunk` operation: store the blob, record the receipt, and
/// queue reassembly when the last chunk lands.
pub async fn upload_chunk(
    state: &AppState,
    upload_id: &str,
    concurrent_id: &str,
    offset: u64,
    data: Bytes,
) -> ApiResult<bool> {
    let upload_id = UploadId::parse(upload_id)?.to_hex();
    let concurrent_id = EpochId::parse(concurrent_id)?.to_hex();

    let upload = state
        .catalog
        .get_upload(&upload_id)
        .await?
        .filter(|row| row.concurrent_id == concurrent_id)
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "upload {upload_id} with concurrent id {concurrent_id} not found"
            ))
        })?;

    let chunks_count = upload.chunks_count as u64;
    let expected =
        upload::expected_chunk_len(upload.file_size as u64, upload.chunk_size as u64, offset)?;
    if data.len() as u64 != expected {
        return Err(depot_core::Error::ChunkLengthMismatch {
            offset,
            expected,
            actual: data.len() as u64,
        }
        .into());
    }

    let byte_len = data.len() as i64;
    state
        .input
        .put(&layout::chunk_key(&upload.upload_id, &upload.hash, offset), data)
        .await?;

    state
        .catalog
        .insert_chunk_if_absent(&UploadChunkRow {
            upload_id: upload.upload_id.clone(),
            concurrent_id: upload.concurrent_id.clone(),
            chunk_offset: offset as i64,
            byte_len,
            created_at: OffsetDateTime::now_utc(),
        })
        .await?;
    metrics::CHUNKS_RECEIVED.inc();

    let received = state
        .catalog
        .count_chunks(&upload.upload_id, &upload.concurrent_id)
        .await?;
    let finished = received == chunks_count;

    if finished {
        // Exactly one caller wins the NONE -> PENDING transition and
        // enqueues the reassemble job; the queue dedups the rest by id.
        let won = state
            .catalog
            .set_upload_state(
                &upload.upload_id,
                UploadState::None,
                UploadState::Pending,
                OffsetDateTime::now_utc(),
            )
            .await?;
        if won {
            state
                .queue
                .enqueue(&JobPayload::ProcessUpload {
                    version_id: upload.version_id.clone(),
                    upload_id: upload.upload_id.clone(),
                    concurrent_id: upload.concurrent_id.clone(),
                })
                .await?;
        }
    }

    Ok(finished)
}

/// Queue the publish job for an assembled version.
pub async fn process_version(state: &AppState, id: &str) -> ApiResult<String> {
    let version_id = VersionId::parse(id)?.to_hex();
    let version = state
        .catalog
        .get_version(&version_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("version {id} not found")))?;
    if version.state == depot_core::VersionState::Ready.as_str() {
        return Err(ApiError::Conflict(format!(
            "version {id} is already published"
        )));
    }

    let job_id = state
        .queue
        .enqueue(&JobPayload::ProcessPublish { version_id })
        .await?;
    Ok(job_id)
}

/// Active and waiting queue entries.
pub async fn list_jobs(state: &AppState) -> ApiResult<Vec<JobView>> {
    let rows = state.queue.list_unfinished().await?;
    Ok(rows
        .into_iter()
        .map(|row| JobView {
            id: row.job_id,
            state: row.state,
            progress: row.progress,
            attempts: row.attempts,
        })
        .collect())
}

/// Advertised download mirrors.
pub async fn list_servers(state: &AppState) -> ApiResult<Vec<String>> {
    let rows = state.catalog.list_servers().await?;
    Ok(rows.into_iter().map(|row| row.url).collect())
}
