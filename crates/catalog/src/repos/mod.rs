//! Repository trait definitions, one per collection.

pub mod chunks;
pub mod files;
pub mod jobs;
pub mod servers;
pub mod uploads;
pub mod versions;

pub use chunks::ChunkRepo;
pub use files::FileRepo;
pub use jobs::JobRepo;
pub use servers::ServerRepo;
pub use uploads::{StartUploadOutcome, StartUploadParams, UploadRepo};
pub use versions::VersionRepo;
