//! Database models mapping to the catalog schema.
//!
//! Entity ids are stored as 24-character lowercase hex TEXT; sizes and
//! counters as signed integers (the API layer owns the unsigned view).

use sqlx::FromRow;
use time::OffsetDateTime;

/// Version record.
#[derive(Debug, Clone, FromRow)]
pub struct VersionRow {
    pub version_id: String,
    pub major: i64,
    pub minor: i64,
    pub revision: i64,
    pub description: String,
    pub state: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl VersionRow {
    /// The semantic number of this row.
    pub fn number(&self) -> depot_core::VersionNumber {
        depot_core::VersionNumber {
            major: self.major as u32,
            minor: self.minor as u32,
            revision: self.revision as u32,
        }
    }
}

/// Upload record; at most one per version.
#[derive(Debug, Clone, FromRow)]
pub struct UploadRow {
    pub upload_id: String,
    pub version_id: String,
    /// Current concurrent epoch.
    pub concurrent_id: String,
    /// Declared SHA-256 of the assembled file, lowercase hex.
    pub hash: String,
    pub chunk_size: i64,
    pub file_size: i64,
    pub chunks_count: i64,
    pub state: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Chunk receipt, scoped to one upload epoch.
#[derive(Debug, Clone, FromRow)]
pub struct UploadChunkRow {
    pub upload_id: String,
    pub concurrent_id: String,
    pub chunk_offset: i64,
    pub byte_len: i64,
    pub created_at: OffsetDateTime,
}

/// Published packed file belonging to a READY version.
#[derive(Debug, Clone, FromRow)]
pub struct UpdateFileRow {
    pub version_id: String,
    pub category: i64,
    /// Opaque unique packed file name (uppercase `uuid_crc32`).
    pub file_name: String,
    pub extension: String,
    /// Logical relative path; the dedup key across versions.
    pub local_path: String,
    pub packed_size: i64,
    pub file_size: i64,
    pub crc32: String,
    pub created_at: OffsetDateTime,
}

/// Download mirror advertised to clients.
#[derive(Debug, Clone, FromRow)]
pub struct ServerRow {
    pub url: String,
    pub created_at: OffsetDateTime,
}

/// Durable queue entry. `job_id` is the dedup key.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub job_id: String,
    pub payload_json: String,
    /// `queued`, `active`, or `failed`.
    pub state: String,
    /// Percentage in `[0, 100]`.
    pub progress: f64,
    pub error: Option<String>,
    pub attempts: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Job states persisted in the queue table.
pub mod job_state {
    pub const QUEUED: &str = "queued";
    pub const ACTIVE: &str = "active";
    pub const FAILED: &str = "failed";
}
