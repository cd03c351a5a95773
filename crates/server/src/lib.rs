//! HTTP/gRPC API server, pipeline worker, and resolver for depot.
//!
//! This crate provides the control plane:
//! - Version management and chunked-upload coordination
//! - The durable job queue and the update pipeline worker
//! - The delta-manifest resolver with its shared cache
//! - Both transports (axum HTTP, tonic gRPC) as thin adapters

pub mod auth;
pub mod cache;
pub mod error;
pub mod grpc;
pub mod handlers;
pub mod layout;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod resolver;
pub mod routes;
pub mod service;
pub mod state;

pub use cache::ManifestCache;
pub use error::{ApiError, ApiResult};
pub use grpc::UpdateGrpcService;
pub use pipeline::UpdatePipeline;
pub use queue::{JobQueue, Worker};
pub use resolver::ManifestResolver;
pub use routes::create_router;
pub use state::AppState;
