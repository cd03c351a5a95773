//! File categories and zip-path classification.
//!
//! Every entry of an uploaded archive belongs to exactly one category,
//! decided by the top-level folder it lives under. Matching proceeds from
//! the highest category index downward so texture- and OS-specific folders
//! win over the coarser `desktop/`, `mobile/`, and `general/` roots.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Delivery category of an update file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    General = 0,
    Desktop = 1,
    Mobile = 2,
    Windows = 3,
    Linux = 4,
    MacOs = 5,
    Android = 6,
    Ios = 7,
    Uncompressed = 8,
    Bc3 = 9,
    Bc7 = 10,
    Etc2 = 11,
    Astc = 12,
}

impl Category {
    /// All categories, ordered by index.
    pub const ALL: [Category; 13] = [
        Category::General,
        Category::Desktop,
        Category::Mobile,
        Category::Windows,
        Category::Linux,
        Category::MacOs,
        Category::Android,
        Category::Ios,
        Category::Uncompressed,
        Category::Bc3,
        Category::Bc7,
        Category::Etc2,
        Category::Astc,
    ];

    pub fn index(self) -> i32 {
        self as i32
    }

    pub fn from_index(index: i32) -> crate::Result<Self> {
        Self::ALL
            .get(usize::try_from(index).map_err(|_| crate::Error::InvalidCategory(index))?)
            .copied()
            .ok_or(crate::Error::InvalidCategory(index))
    }

    /// Folder the category's entries live under, both inside the uploaded
    /// zip and in the published output tree.
    pub fn folder_name(self) -> &'static str {
        match self {
            Category::General => "general",
            Category::Desktop => "desktop",
            Category::Mobile => "mobile",
            Category::Windows => "windows",
            Category::Linux => "linux",
            Category::MacOs => "macos",
            Category::Android => "android",
            Category::Ios => "ios",
            Category::Uncompressed => "uncompressed",
            Category::Bc3 => "bc3",
            Category::Bc7 => "bc7",
            Category::Etc2 => "etc2",
            Category::Astc => "astc",
        }
    }
}

/// Operating system reported by a resolving client.
///
/// The wire range is `[0, 5]`; index 5 is reserved and rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    Windows = 0,
    Linux = 1,
    MacOs = 2,
    Android = 3,
    Ios = 4,
}

impl OperatingSystem {
    pub fn index(self) -> i32 {
        self as i32
    }

    pub fn from_index(index: i32) -> crate::Result<Self> {
        match index {
            0 => Ok(Self::Windows),
            1 => Ok(Self::Linux),
            2 => Ok(Self::MacOs),
            3 => Ok(Self::Android),
            4 => Ok(Self::Ios),
            other => Err(crate::Error::InvalidOperatingSystem(other)),
        }
    }

    /// Coarse platform family the OS belongs to.
    pub fn platform_category(self) -> Category {
        match self {
            Self::Windows | Self::Linux | Self::MacOs => Category::Desktop,
            Self::Android | Self::Ios => Category::Mobile,
        }
    }

    /// The OS-specific category.
    pub fn os_category(self) -> Category {
        match self {
            Self::Windows => Category::Windows,
            Self::Linux => Category::Linux,
            Self::MacOs => Category::MacOs,
            Self::Android => Category::Android,
            Self::Ios => Category::Ios,
        }
    }
}

/// Texture format family reported by a resolving client. Wire range `[0, 4]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureFormat {
    Uncompressed = 0,
    Bc3 = 1,
    Bc7 = 2,
    Etc2 = 3,
    Astc = 4,
}

impl TextureFormat {
    pub fn index(self) -> i32 {
        self as i32
    }

    pub fn from_index(index: i32) -> crate::Result<Self> {
        match index {
            0 => Ok(Self::Uncompressed),
            1 => Ok(Self::Bc3),
            2 => Ok(Self::Bc7),
            3 => Ok(Self::Etc2),
            4 => Ok(Self::Astc),
            other => Err(crate::Error::InvalidTextureFormat(other)),
        }
    }

    pub fn category(self) -> Category {
        match self {
            Self::Uncompressed => Category::Uncompressed,
            Self::Bc3 => Category::Bc3,
            Self::Bc7 => Category::Bc7,
            Self::Etc2 => Category::Etc2,
            Self::Astc => Category::Astc,
        }
    }
}

/// The categories delivered to a client with the given `(os, texture)` pair:
/// general files, the platform family, the OS, and the texture format.
pub fn relevant_categories(os: OperatingSystem, texture: TextureFormat) -> [Category; 4] {
    [
        Category::General,
        os.platform_category(),
        os.os_category(),
        texture.category(),
    ]
}

/// One anchored regex per category folder, ordered by category index.
/// Group 1 captures the logical path below the category root.
static FOLDER_PATTERNS: LazyLock<Vec<(Category, Regex)>> = LazyLock::new(|| {
    Category::ALL
        .iter()
        .map(|&category| {
            let pattern = format!("^{}/(.+)$", category.folder_name());
            (category, Regex::new(&pattern).expect("category regex"))
        })
        .collect()
});

/// Classify an archive entry path into `(category, local_path)`.
///
/// Separators are normalized to forward slashes first. Matching runs from
/// the highest category index downward; the first match wins. Paths outside
/// every category folder return `None` and are dropped by the pipeline.
pub fn classify_path(path: &str) -> Option<(Category, String)> {
    let normalized = path.replace('\\', "/");
    for (category, pattern) in FOLDER_PATTERNS.iter().rev() {
        if let Some(caps) = pattern.captures(&normalized) {
            return Some((*category, caps[1].to_string()));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_index_roundtrip() {
        for category in Category::ALL {
            assert_eq!(Category::from_index(category.index()).unwrap(), category);
        }
        assert!(Category::from_index(13).is_err());
        assert!(Category::from_index(-1).is_err());
    }

    #[test]
    fn test_reserved_os_index_rejected() {
        assert!(OperatingSystem::from_index(5).is_err());
        assert!(OperatingSystem::from_index(6).is_err());
        assert_eq!(
            OperatingSystem::from_index(0).unwrap(),
            OperatingSystem::Windows
        );
    }

    #[test]
    fn test_platform_lookup() {
        assert_eq!(
            OperatingSystem::Windows.platform_category(),
            Category::Desktop
        );
        assert_eq!(
            OperatingSystem::MacOs.platform_category(),
            Category::Desktop
        );
        assert_eq!(
            OperatingSystem::Android.platform_category(),
            Category::Mobile
        );
        assert_eq!(OperatingSystem::Ios.platform_category(), Category::Mobile);
    }

    #[test]
    fn test_relevant_categories() {
        let set = relevant_categories(OperatingSystem::Windows, TextureFormat::Bc7);
        assert_eq!(
            set,
            [
                Category::General,
                Category::Desktop,
                Category::Windows,
                Category::Bc7
            ]
        );
    }

    #[test]
    fn test_classify_basic_folders() {
        assert_eq!(
            classify_path("general/data/a.png"),
            Some((Category::General, "data/a.png".to_string()))
        );
        assert_eq!(
            classify_path("windows/w.dll"),
            Some((Category::Windows, "w.dll".to_string()))
        );
        assert_eq!(
            classify_path("bc7/b.ktx"),
            Some((Category::Bc7, "b.ktx".to_string()))
        );
    }

    #[test]
    fn test_classify_normalizes_backslashes() {
        assert_eq!(
            classify_path("astc\\textures\\t.ktx"),
            Some((Category::Astc, "textures/t.ktx".to_string()))
        );
    }

    #[test]
    fn test_classify_unmatched_dropped() {
        assert_eq!(classify_path("readme.txt"), None);
        assert_eq!(classify_path("unknown/x.bin"), None);
        // A bare category folder with no file under it matches nothing.
        assert_eq!(classify_path("general/"), None);
    }
}
