//! Blob key layouts.
//!
//! Input store:  `{UPLOAD_ID}/{HASH}/{offset:08}.data` chunks and
//! `{VERSION_ID}.zip` assembled payloads, ids and hashes uppercased.
//! Output store: `publish/{VERSION_ID}/{category}/{file_name}.eupdz`.

/// Prefix holding the chunk blobs of one upload epoch.
pub fn chunk_prefix(upload_id: &str, hash: &str) -> String {
    format!(
        "{}/{}",
        upload_id.to_ascii_uppercase(),
        hash.to_ascii_uppercase()
    )
}

/// Key of the chunk blob at `offset`.
pub fn chunk_key(upload_id: &str, hash: &str, offset: u64) -> String {
    format!("{}/{offset:08}.data", chunk_prefix(upload_id, hash))
}

/// Key of a version's assembled zip in the Input store.
pub fn assembled_zip_key(version_id: &str) -> String {
    format!("{}.zip", version_id.to_ascii_uppercase())
}

/// Prefix of a version's published tree in the Output store.
pub fn publish_prefix(version_id: &str) -> String {
    format!("publish/{}", version_id.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_key_zero_pads_offset() {
        let key = chunk_key("ab12", "ff00", 7);
        assert_eq!(key, "AB12/FF00/00000007.data");
        // Lexical order equals numeric order thanks to the padding.
        assert!(chunk_key("a", "b", 9) < chunk_key("a", "b", 10));
    }

    #[test]
    fn test_layout_uppercases_ids() {
        assert_eq!(assembled_zip_key("abc1"), "ABC1.zip");
        assert_eq!(publish_prefix("abc1"), "publish/ABC1");
    }
}
