//! Pipeline job payloads and identity keys.

use serde::{Deserialize, Serialize};

/// Work item executed by the pipeline worker.
///
/// The job id doubles as the queue's dedup key: one live reassemble job per
/// upload epoch, one live publish job per version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// Reassemble uploaded chunks into the declared zip and verify its hash.
    ProcessUpload {
        version_id: String,
        upload_id: String,
        concurrent_id: String,
    },
    /// Extract, classify, compress, and publish an assembled version.
    ProcessPublish { version_id: String },
}

impl JobPayload {
    /// The dedup key for this payload.
    pub fn job_id(&self) -> String {
        match self {
            Self::ProcessUpload {
                version_id,
                upload_id,
                concurrent_id,
            } => format!("version-{version_id}-{upload_id}-{concurrent_id}"),
            Self::ProcessPublish { version_id } => format!("version-{version_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_keys() {
        let upload = JobPayload::ProcessUpload {
            version_id: "v".to_string(),
            upload_id: "u".to_string(),
            concurrent_id: "c".to_string(),
        };
        assert_eq!(upload.job_id(), "version-v-u-c");

        let publish = JobPayload::ProcessPublish {
            version_id: "v".to_string(),
        };
        assert_eq!(publish.job_id(), "version-v");
    }

    #[test]
    fn test_payload_json_roundtrip() {
        let payload = JobPayload::ProcessPublish {
            version_id: "abc".to_string(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("process_publish"));
        let back: JobPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }
}
