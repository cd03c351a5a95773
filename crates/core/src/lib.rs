//! Core domain types and shared logic for the depot update service.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Opaque entity identifiers (versions, uploads, concurrent epochs)
//! - Semantic version numbers and lifecycle states
//! - Chunked-upload math (chunk counts, missing ranges)
//! - File categories and path classification
//! - Delta-update manifests
//! - Job payloads for the pipeline queue
//! - Application configuration

pub mod category;
pub mod config;
pub mod error;
pub mod hash;
pub mod id;
pub mod job;
pub mod manifest;
pub mod range;
pub mod upload;
pub mod version;

pub use category::{Category, OperatingSystem, TextureFormat, classify_path, relevant_categories};
pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher};
pub use id::{EpochId, UploadId, VersionId};
pub use job::JobPayload;
pub use manifest::{Manifest, ManifestFile, manifest_cache_key};
pub use range::{ChunkRange, missing_ranges};
pub use upload::UploadState;
pub use version::{VersionNumber, VersionSlot, VersionState};

/// Minimum chunk size: 16 KiB.
pub const MIN_CHUNK_SIZE: u64 = 16 * 1024;

/// Maximum chunk size: 512 KiB.
pub const MAX_CHUNK_SIZE: u64 = 512 * 1024;

/// Minimum upload payload size: 1 KiB.
pub const MIN_FILE_SIZE: u64 = 1024;

/// Maximum upload payload size: 5 GiB.
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Extension carried by every packed update file.
pub const PACKED_EXTENSION: &str = ".eupdz";
