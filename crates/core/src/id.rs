//! Opaque 12-byte entity identifiers.
//!
//! Ids are 4 big-endian bytes of creation time (seconds) followed by 8
//! random bytes, rendered as 24 hex characters. Blob keys and manifest
//! `UrlPath` values use the uppercase form.

use std::fmt;

fn generate_bytes() -> [u8; 12] {
    let secs = time::OffsetDateTime::now_utc().unix_timestamp().max(0) as u32;
    let mut bytes = [0u8; 12];
    bytes[..4].copy_from_slice(&secs.to_be_bytes());
    bytes[4..].copy_from_slice(&rand::random::<[u8; 8]>());
    bytes
}

fn parse_bytes(s: &str) -> Option<[u8; 12]> {
    if s.len() != 24 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let mut out = [0u8; 12];
    for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
        let hex = std::str::from_utf8(chunk).ok()?;
        out[i] = u8::from_str_radix(hex, 16).ok()?;
    }
    Some(out)
}

fn encode_hex(bytes: &[u8; 12]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name([u8; 12]);

        impl $name {
            /// Generate a new random id.
            pub fn generate() -> Self {
                Self(generate_bytes())
            }

            /// Parse from a 24-character hex string (case-insensitive).
            pub fn parse(s: &str) -> crate::Result<Self> {
                parse_bytes(&s.to_ascii_lowercase())
                    .map(Self)
                    .ok_or_else(|| {
                        crate::Error::InvalidId(format!(concat!("invalid ", $label, ": {}"), s))
                    })
            }

            /// Lowercase hex form (storage and wire representation).
            pub fn to_hex(&self) -> String {
                encode_hex(&self.0)
            }

            /// Uppercase hex form (blob keys, manifest `UrlPath`).
            pub fn to_hex_upper(&self) -> String {
                self.to_hex().to_ascii_uppercase()
            }

            /// Raw id bytes.
            pub fn as_bytes(&self) -> &[u8; 12] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }
    };
}

entity_id!(
    /// Identifier of a published or pending version.
    VersionId,
    "version id"
);
entity_id!(
    /// Identifier of an upload attached to a version.
    UploadId,
    "upload id"
);
entity_id!(
    /// Concurrent-epoch tag scoping chunk rows and blobs to one upload attempt.
    EpochId,
    "concurrent id"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip() {
        let id = VersionId::generate();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 24);
        assert!(hex.bytes().all(|b| b.is_ascii_hexdigit()));
        let parsed = VersionId::parse(&hex).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_id_parse_accepts_uppercase() {
        let id = UploadId::generate();
        let parsed = UploadId::parse(&id.to_hex_upper()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_id_parse_rejects_garbage() {
        assert!(EpochId::parse("not-an-id").is_err());
        assert!(EpochId::parse("abcd").is_err());
        assert!(EpochId::parse(&"g".repeat(24)).is_err());
    }

    #[test]
    fn test_upper_hex_is_upper() {
        let id = VersionId::generate();
        assert_eq!(id.to_hex_upper(), id.to_hex().to_ascii_uppercase());
    }
}
