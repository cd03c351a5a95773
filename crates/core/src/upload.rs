//! Upload lifecycle state and chunk-geometry validation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upload lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// Accepting chunks for the current epoch.
    None,
    /// All chunks received; reassembly queued.
    Pending,
    /// A reassemble job is running.
    Processing,
    /// Assembled zip verified and stored. Terminal.
    Ready,
}

impl UploadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Ready => "ready",
        }
    }

    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "ready" => Ok(Self::Ready),
            other => Err(crate::Error::InvalidId(format!(
                "unknown upload state: {other}"
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of chunks an upload of `file_size` bytes splits into.
pub fn chunks_count(file_size: u64, chunk_size: u64) -> u64 {
    file_size.div_ceil(chunk_size)
}

/// Validate a declared chunk size: a power of two within the allowed bounds.
pub fn validate_chunk_size(chunk_size: u64) -> crate::Result<()> {
    if !chunk_size.is_power_of_two()
        || chunk_size < crate::MIN_CHUNK_SIZE
        || chunk_size > crate::MAX_CHUNK_SIZE
    {
        return Err(crate::Error::InvalidChunkSize {
            size: chunk_size,
            min: crate::MIN_CHUNK_SIZE,
            max: crate::MAX_CHUNK_SIZE,
        });
    }
    Ok(())
}

/// Validate a declared payload size.
pub fn validate_file_size(file_size: u64) -> crate::Result<()> {
    if file_size < crate::MIN_FILE_SIZE || file_size > crate::MAX_FILE_SIZE {
        return Err(crate::Error::InvalidFileSize {
            size: file_size,
            min: crate::MIN_FILE_SIZE,
            max: crate::MAX_FILE_SIZE,
        });
    }
    Ok(())
}

/// Validate a declared payload digest: 64 lowercase hex characters.
pub fn validate_hash(hash: &str) -> crate::Result<()> {
    let ok = hash.len() == 64
        && hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if ok {
        Ok(())
    } else {
        Err(crate::Error::InvalidHash(format!(
            "expected 64 lowercase hex characters, got {hash:?}"
        )))
    }
}

/// Expected byte length of the chunk at `offset`.
///
/// Every chunk is exactly `chunk_size` bytes except the last, which carries
/// the remainder.
pub fn expected_chunk_len(file_size: u64, chunk_size: u64, offset: u64) -> crate::Result<u64> {
    let count = chunks_count(file_size, chunk_size);
    if offset >= count {
        return Err(crate::Error::ChunkOutOfRange { offset, count });
    }
    if offset + 1 == count {
        Ok(file_size - chunk_size * (count - 1))
    } else {
        Ok(chunk_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};

    #[test]
    fn test_chunks_count() {
        assert_eq!(chunks_count(48 * 1024, 16 * 1024), 3);
        assert_eq!(chunks_count(16 * 1024, 16 * 1024), 1);
        assert_eq!(chunks_count(16 * 1024 + 1, 16 * 1024), 2);
        assert_eq!(chunks_count(1024, 16 * 1024), 1);
    }

    #[test]
    fn test_validate_chunk_size_extremes() {
        assert!(validate_chunk_size(MIN_CHUNK_SIZE).is_ok());
        assert!(validate_chunk_size(MAX_CHUNK_SIZE).is_ok());
        assert!(validate_chunk_size(MIN_CHUNK_SIZE / 2).is_err());
        assert!(validate_chunk_size(MAX_CHUNK_SIZE * 2).is_err());
        // In range but not a power of two.
        assert!(validate_chunk_size(3 * 16 * 1024).is_err());
    }

    #[test]
    fn test_validate_file_size_extremes() {
        assert!(validate_file_size(crate::MIN_FILE_SIZE).is_ok());
        assert!(validate_file_size(crate::MAX_FILE_SIZE).is_ok());
        assert!(validate_file_size(crate::MIN_FILE_SIZE - 1).is_err());
        assert!(validate_file_size(crate::MAX_FILE_SIZE + 1).is_err());
    }

    #[test]
    fn test_validate_hash() {
        assert!(validate_hash(&"a".repeat(64)).is_ok());
        assert!(validate_hash(&"A".repeat(64)).is_err());
        assert!(validate_hash(&"a".repeat(63)).is_err());
        assert!(validate_hash(&"z".repeat(64)).is_err());
    }

    #[test]
    fn test_expected_chunk_len() {
        // 3 full chunks.
        assert_eq!(expected_chunk_len(48 * 1024, 16 * 1024, 0).unwrap(), 16 * 1024);
        assert_eq!(expected_chunk_len(48 * 1024, 16 * 1024, 2).unwrap(), 16 * 1024);
        // Single-byte final chunk.
        assert_eq!(expected_chunk_len(32 * 1024 + 1, 16 * 1024, 2).unwrap(), 1);
        // Single-chunk upload shorter than the chunk size.
        assert_eq!(expected_chunk_len(1024, 16 * 1024, 0).unwrap(), 1024);
        assert!(expected_chunk_len(48 * 1024, 16 * 1024, 3).is_err());
    }

    #[test]
    fn test_upload_state_roundtrip() {
        for state in [
            UploadState::None,
            UploadState::Pending,
            UploadState::Processing,
            UploadState::Ready,
        ] {
            assert_eq!(UploadState::parse(state.as_str()).unwrap(), state);
        }
        assert!(UploadState::Ready.is_terminal());
    }
}
