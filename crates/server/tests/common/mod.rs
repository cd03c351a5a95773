//! Shared test fixtures.
#![allow(dead_code)] // not every test binary uses every fixture

use depot_catalog::{CatalogStore, SqliteStore};
use depot_core::config::{AppConfig, AuthConfig};
use depot_server::{AppState, UpdatePipeline, Worker};
use depot_storage::{BlobStore, FilesystemBackend};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

pub struct TestHarness {
    // Keeps the scratch tree alive for the test's duration.
    pub temp: tempfile::TempDir,
    pub state: AppState,
    pub worker: Worker,
}

/// Build a full in-process stack: SQLite catalog, filesystem blob stores,
/// and a worker wired to the same queue.
pub async fn harness() -> TestHarness {
    harness_with_config(|_| {}).await
}

/// Same as [`harness`] but lets the caller adjust the config first.
pub async fn harness_with_config(adjust: impl FnOnce(&mut AppConfig)) -> TestHarness {
    let temp = tempfile::tempdir().unwrap();
    let mut config = AppConfig::for_testing(temp.path());
    adjust(&mut config);

    let catalog: Arc<dyn CatalogStore> = Arc::new(
        SqliteStore::new(temp.path().join("catalog.db"))
            .await
            .unwrap(),
    );
    let input: Arc<dyn BlobStore> = Arc::new(
        FilesystemBackend::new(temp.path().join("input"))
            .await
            .unwrap(),
    );
    let output: Arc<dyn BlobStore> = Arc::new(
        FilesystemBackend::new(temp.path().join("output"))
            .await
            .unwrap(),
    );

    let state = AppState::new(config, catalog.clone(), input.clone(), output.clone());
    let pipeline = Arc::new(UpdatePipeline::new(catalog.clone(), input, output));
    let worker = Worker::new(catalog, pipeline, Duration::from_millis(10));

    TestHarness {
        temp,
        state,
        worker,
    }
}

/// Spawn a loopback RFC 7662 introspection stub and return its URL as an
/// [`AuthConfig`].
pub async fn spawn_introspection_stub(active: bool, scope: &str) -> AuthConfig {
    let scope = scope.to_string();
    let handler = move || {
        let scope = scope.clone();
        async move {
            axum::Json(serde_json::json!({
                "active": active,
                "scope": scope,
                "sub": "tester",
            }))
        }
    };
    let app = axum::Router::new().route("/introspect", axum::routing::post(handler));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    AuthConfig {
        introspection_url: format!("http://{addr}/introspect"),
        client_id: Some("depot".to_string()),
        client_secret: Some("secret".to_string()),
    }
}

/// Build an in-memory zip from `(path, contents)` entries.
pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use zip::write::SimpleFileOptions;

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (path, data) in entries {
            writer.start_file(*path, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

/// Deterministic incompressible payload (xorshift64) so test archives
/// keep their size through deflate.
pub fn pseudo_bytes(len: usize, seed: u8) -> Vec<u8> {
    let mut state = 0x9E37_79B9_7F4A_7C15u64 ^ ((seed as u64 + 1).wrapping_mul(0xD1B5_4A32_D192_ED03));
    let mut out = Vec::with_capacity(len + 8);
    while out.len() < len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.extend_from_slice(&state.to_le_bytes());
    }
    out.truncate(len);
    out
}

/// Lowercase hex SHA-256 of a buffer.
pub fn sha256_hex(data: &[u8]) -> String {
    depot_core::ContentHash::compute(data).to_hex()
}

/// Run the worker until the queue has no leasable work left.
pub async fn drain_queue(worker: &Worker) {
    while worker.tick().await.unwrap() {}
}
