//! Prometheus metrics for the depot server.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static UPLOADS_STARTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_uploads_started_total",
        "Total number of upload sessions started or resumed",
    )
    .expect("metric creation failed")
});

pub static CHUNKS_RECEIVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_chunks_received_total",
        "Total number of chunks accepted",
    )
    .expect("metric creation failed")
});

pub static JOBS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_jobs_completed_total",
        "Total number of pipeline jobs completed",
    )
    .expect("metric creation failed")
});

pub static JOBS_FAILED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_jobs_failed_total",
        "Total number of pipeline jobs failed",
    )
    .expect("metric creation failed")
});

pub static MANIFESTS_SERVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_manifests_served_total",
        "Total number of delta manifests served",
    )
    .expect("metric creation failed")
});

pub static MANIFEST_CACHE_HITS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_manifest_cache_hits_total",
        "Total number of manifest cache hits",
    )
    .expect("metric creation failed")
});

pub static WORKERS_ACTIVE: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("depot_workers_active", "Worker loops currently running")
        .expect("metric creation failed")
});

/// Register all metrics with the global registry. Idempotent.
pub fn register_metrics() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(UPLOADS_STARTED.clone()))
            .expect("register metric");
        REGISTRY
            .register(Box::new(CHUNKS_RECEIVED.clone()))
            .expect("register metric");
        REGISTRY
            .register(Box::new(JOBS_COMPLETED.clone()))
            .expect("register metric");
        REGISTRY
            .register(Box::new(JOBS_FAILED.clone()))
            .expect("register metric");
        REGISTRY
            .register(Box::new(MANIFESTS_SERVED.clone()))
            .expect("register metric");
        REGISTRY
            .register(Box::new(MANIFEST_CACHE_HITS.clone()))
            .expect("register metric");
        REGISTRY
            .register(Box::new(WORKERS_ACTIVE.clone()))
            .expect("register metric");
    });
}

/// GET /metrics - Prometheus text exposition.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {e}"),
        )
            .into_response();
    }
    (
        StatusCode::OK,
        [("content-type", encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
