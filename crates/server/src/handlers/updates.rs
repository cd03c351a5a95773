//! Public resolver-facing handlers (no auth).

use crate::error::ApiResult;
use crate::resolver::ManifestResolver;
use crate::service;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use depot_core::{Manifest, OperatingSystem, TextureFormat, VersionNumber};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ServersResponse {
    pub servers: Vec<String>,
}

/// GET /api/v1/updates/servers/list - advertised download mirrors.
pub async fn list_servers(State(state): State<AppState>) -> ApiResult<Json<ServersResponse>> {
    let servers = service::list_servers(&state).await?;
    Ok(Json(ServersResponse { servers }))
}

/// GET /api/v1/updates/list/{version}/{os}/{texture}/{offset} - delta manifest.
///
/// `offset` is accepted for wire compatibility; the manifest is computed
/// whole and callers page client-side.
#[tracing::instrument(skip(state))]
pub async fn get_update_list(
    State(state): State<AppState>,
    Path((version, os, texture, _offset)): Path<(String, i32, i32, u64)>,
) -> ApiResult<Json<Manifest>> {
    let client = VersionNumber::parse(&version)?;
    let os = OperatingSystem::from_index(os)?;
    let texture = TextureFormat::from_index(texture)?;

    let resolver = ManifestResolver::new(state.catalog.clone(), state.manifest_cache.clone());
    let manifest = resolver.resolve(client, os, texture).await?;
    Ok(Json(manifest))
}
