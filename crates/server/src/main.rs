//! depot server binary.

use anyhow::{Context, Result};
use clap::Parser;
use depot_core::config::AppConfig;
use depot_server::{AppState, UpdateGrpcService, UpdatePipeline, Worker, create_router};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// depot - game client update distribution service
#[derive(Parser, Debug)]
#[command(name = "depotd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "DEPOT_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("depot v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide/override
    // everything).
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("DEPOT_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;

    depot_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    // Initialize the two blob stores and verify connectivity before
    // accepting requests.
    let input = depot_storage::from_config(&config.input_storage)
        .await
        .context("failed to initialize input storage")?;
    input
        .health_check()
        .await
        .context("input storage health check failed")?;
    let output = depot_storage::from_config(&config.output_storage)
        .await
        .context("failed to initialize output storage")?;
    output
        .health_check()
        .await
        .context("output storage health check failed")?;
    tracing::info!(
        input = input.backend_name(),
        output = output.backend_name(),
        "Blob stores initialized"
    );

    let catalog = depot_catalog::from_config(&config.catalog)
        .await
        .context("failed to initialize catalog store")?;
    catalog
        .health_check()
        .await
        .context("catalog health check failed")?;
    tracing::info!("Catalog store initialized");

    // Leases abandoned by a dead instance go back to the queue; job bodies
    // are idempotent under re-drive.
    let requeued = catalog
        .requeue_active_jobs(time::OffsetDateTime::now_utc())
        .await
        .context("failed to requeue abandoned jobs")?;
    if requeued > 0 {
        tracing::warn!(count = requeued, "Requeued jobs abandoned by a previous instance");
    }

    let state = AppState::new(config.clone(), catalog.clone(), input, output);

    // Worker pool
    if config.queue.workers >= 1 {
        let pipeline = Arc::new(UpdatePipeline::new(
            catalog.clone(),
            state.input.clone(),
            state.output.clone(),
        ));
        for index in 0..config.queue.workers {
            Worker::new(
                catalog.clone(),
                pipeline.clone(),
                Duration::from_millis(config.queue.poll_interval_ms),
            )
            .spawn(index);
        }
        tracing::info!(
            workers = config.queue.workers,
            queue = %config.queue.name,
            "Pipeline workers spawned"
        );
    } else {
        tracing::info!("In-process job execution disabled");
    }

    // HTTP transport
    let api_addr: SocketAddr = config
        .server
        .api_bind
        .parse()
        .context("invalid api bind address")?;
    let listener = tokio::net::TcpListener::bind(api_addr)
        .await
        .with_context(|| format!("failed to bind to {api_addr}"))?;
    let app = create_router(state.clone());
    tracing::info!("HTTP API listening on {api_addr}");
    let http = tokio::spawn(async move { axum::serve(listener, app).await });

    // gRPC transport
    let grpc_addr: SocketAddr = config
        .server
        .grpc_bind
        .parse()
        .context("invalid grpc bind address")?;
    let grpc_service = UpdateGrpcService::new(state).into_server();
    tracing::info!("gRPC listening on {grpc_addr}");
    let grpc = tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(grpc_service)
            .serve(grpc_addr)
            .await
    });

    tokio::select! {
        result = http => result.context("HTTP server task failed")?.context("HTTP server failed")?,
        result = grpc => result.context("gRPC server task failed")?.context("gRPC server failed")?,
    }

    Ok(())
}
