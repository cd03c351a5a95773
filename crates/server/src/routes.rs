//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Public resolver surface
        .route("/api/v1/updates/servers/list", get(handlers::list_servers))
        .route(
            "/api/v1/updates/list/{version}/{os}/{texture}/{offset}",
            get(handlers::get_update_list),
        )
        // Manager surface
        .route(
            "/api/v1/updates/manager/version/create",
            post(handlers::create_version),
        )
        .route(
            "/api/v1/updates/manager/version/edit",
            post(handlers::edit_version),
        )
        .route(
            "/api/v1/updates/manager/version/process",
            put(handlers::process_version),
        )
        .route(
            "/api/v1/updates/manager/version/list",
            get(handlers::list_versions),
        )
        .route(
            "/api/v1/updates/manager/version/fetch/{id}",
            get(handlers::fetch_version),
        )
        .route(
            "/api/v1/updates/manager/version/jobs",
            get(handlers::list_jobs),
        );

    let metrics_routes = Router::new().route("/metrics", get(metrics_handler));

    Router::new()
        .merge(api_routes)
        .merge(metrics_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
