//! Delta-update manifests served to resolving clients.

use serde::{Deserialize, Serialize};

/// One file a client must fetch.
///
/// Field names are fixed wire names consumed by game clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Uppercase hex id of the owning version; path segment under `publish/`.
    #[serde(rename = "UrlPath")]
    pub url_path: String,
    /// Logical relative path inside the client's version tree.
    #[serde(rename = "LocalPath")]
    pub local_path: String,
    /// Opaque packed file name.
    #[serde(rename = "Filename")]
    pub filename: String,
    #[serde(rename = "Extension")]
    pub extension: String,
    #[serde(rename = "PackedSize")]
    pub packed_size: u64,
    #[serde(rename = "OriginalSize")]
    pub original_size: u64,
    /// Lowercase hex CRC-32 of the original bytes.
    #[serde(rename = "CRC32")]
    pub crc32: String,
}

/// The answer to a resolve request: the target version plus the file set.
/// Clients treat `files` as unordered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub files: Vec<ManifestFile>,
}

impl Manifest {
    /// An empty manifest pinning the client at its current version.
    pub fn up_to_date(version: &crate::VersionNumber) -> Self {
        Self {
            version: version.to_string(),
            files: Vec::new(),
        }
    }
}

/// Cache key for a computed manifest.
pub fn manifest_cache_key(
    source: &crate::VersionNumber,
    target: &crate::VersionNumber,
    os: crate::OperatingSystem,
    texture: crate::TextureFormat,
) -> String {
    format!(
        "update-{source}-{target}-{}-{}",
        os.index(),
        texture.index()
    )
}
