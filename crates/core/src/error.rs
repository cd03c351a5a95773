//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid chunk size: {size} (must be a power of two between {min} and {max})")]
    InvalidChunkSize { size: u64, min: u64, max: u64 },

    #[error("invalid file size: {size} (must be between {min} and {max})")]
    InvalidFileSize { size: u64, min: u64, max: u64 },

    #[error("chunk offset {offset} out of range (chunks count {count})")]
    ChunkOutOfRange { offset: u64, count: u64 },

    #[error("chunk at offset {offset} has length {actual}, expected {expected}")]
    ChunkLengthMismatch {
        offset: u64,
        expected: u64,
        actual: u64,
    },

    #[error("unknown category index: {0}")]
    InvalidCategory(i32),

    #[error("unknown operating system index: {0}")]
    InvalidOperatingSystem(i32),

    #[error("unknown texture format index: {0}")]
    InvalidTextureFormat(i32),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
