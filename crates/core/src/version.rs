//! Semantic version numbers and version lifecycle states.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Wire format accepted for client-reported versions.
static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})\.(\d{1,3})\.(\d{1,5})$").expect("version regex"));

/// A semantic `(major, minor, revision)` release number.
///
/// Derived ordering is lexicographic over the fields, which matches the
/// release order because numbers are assigned monotonically.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct VersionNumber {
    pub major: u32,
    pub minor: u32,
    pub revision: u32,
}

impl VersionNumber {
    /// The number assigned to the first version of an empty catalog.
    pub fn first() -> Self {
        Self {
            major: 1,
            minor: 0,
            revision: 0,
        }
    }

    /// Parse from the `"major.minor.revision"` wire form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let caps = VERSION_RE
            .captures(s)
            .ok_or_else(|| crate::Error::InvalidVersion(s.to_string()))?;
        // The regex bounds each component well below u32::MAX.
        Ok(Self {
            major: caps[1].parse().expect("bounded by regex"),
            minor: caps[2].parse().expect("bounded by regex"),
            revision: caps[3].parse().expect("bounded by regex"),
        })
    }

    /// The successor at the given slot; lower slots reset to zero.
    pub fn bump(self, slot: VersionSlot) -> Self {
        match slot {
            VersionSlot::Major => Self {
                major: self.major + 1,
                minor: 0,
                revision: 0,
            },
            VersionSlot::Minor => Self {
                major: self.major,
                minor: self.minor + 1,
                revision: 0,
            },
            VersionSlot::Revision => Self {
                major: self.major,
                minor: self.minor,
                revision: self.revision + 1,
            },
        }
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.revision)
    }
}

/// Which component of the version number a create request bumps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionSlot {
    Major,
    Minor,
    Revision,
}

impl VersionSlot {
    /// Parse from the wire value (`0`, `1`, `2`).
    pub fn from_index(index: i32) -> crate::Result<Self> {
        match index {
            0 => Ok(Self::Major),
            1 => Ok(Self::Minor),
            2 => Ok(Self::Revision),
            other => Err(crate::Error::InvalidVersion(format!(
                "unknown version slot: {other}"
            ))),
        }
    }
}

/// Version lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionState {
    /// Created, awaiting an upload and publish.
    Pending,
    /// A publish job is transforming the payload.
    Processing,
    /// Published; visible to the resolver. Terminal.
    Ready,
}

impl VersionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Ready => "ready",
        }
    }

    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "ready" => Ok(Self::Ready),
            other => Err(crate::Error::InvalidVersion(format!(
                "unknown version state: {other}"
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for VersionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_number_display_parse() {
        let v = VersionNumber {
            major: 1,
            minor: 0,
            revision: 2,
        };
        assert_eq!(v.to_string(), "1.0.2");
        assert_eq!(VersionNumber::parse("1.0.2").unwrap(), v);
    }

    #[test]
    fn test_version_number_parse_bounds() {
        assert!(VersionNumber::parse("0.0.0").is_ok());
        assert!(VersionNumber::parse("99.999.99999").is_ok());
        assert!(VersionNumber::parse("100.0.0").is_err());
        assert!(VersionNumber::parse("1.0").is_err());
        assert!(VersionNumber::parse("1.0.0.0").is_err());
        assert!(VersionNumber::parse("a.b.c").is_err());
    }

    #[test]
    fn test_version_number_ordering() {
        let a = VersionNumber::parse("1.0.2").unwrap();
        let b = VersionNumber::parse("1.1.0").unwrap();
        let c = VersionNumber::parse("2.0.0").unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_bump_resets_lower_slots() {
        let v = VersionNumber::parse("1.2.3").unwrap();
        assert_eq!(v.bump(VersionSlot::Major).to_string(), "2.0.0");
        assert_eq!(v.bump(VersionSlot::Minor).to_string(), "1.3.0");
        assert_eq!(v.bump(VersionSlot::Revision).to_string(), "1.2.4");
    }

    #[test]
    fn test_state_roundtrip() {
        for state in [
            VersionState::Pending,
            VersionState::Processing,
            VersionState::Ready,
        ] {
            assert_eq!(VersionState::parse(state.as_str()).unwrap(), state);
        }
        assert!(VersionState::parse("bogus").is_err());
        assert!(VersionState::Ready.is_terminal());
        assert!(!VersionState::Processing.is_terminal());
    }
}
