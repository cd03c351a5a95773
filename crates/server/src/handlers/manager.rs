//! Authenticated manager handlers.

use crate::auth::{Role, require_auth};
use crate::error::{ApiError, ApiResult};
use crate::service::{self, JobView, VersionView};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Maximum request body size for manager endpoints (1 MiB).
const MAX_BODY_SIZE: usize = 1024 * 1024;

async fn parse_body<T: DeserializeOwned>(req: Request) -> ApiResult<T> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_BODY_SIZE)
        .await
        .map_err(|e| ApiError::Validation(format!("failed to read body: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Validation(format!("invalid JSON: {e}")))
}

#[derive(Debug, Deserialize)]
pub struct CreateVersionRequest {
    /// 0 = major, 1 = minor, 2 = revision.
    #[serde(rename = "type")]
    pub slot: i32,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct CreateVersionResponse {
    pub id: String,
    pub version: String,
}

/// POST /api/v1/updates/manager/version/create
pub async fn create_version(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<CreateVersionResponse>> {
    require_auth(&req)?.require_role(Role::UpdateEdit)?;
    let body: CreateVersionRequest = parse_body(req).await?;

    let (id, version) = service::create_version(&state, body.slot, &body.description).await?;
    tracing::info!(version_id = %id, version = %version, "Version created");
    Ok(Json(CreateVersionResponse { id, version }))
}

#[derive(Debug, Deserialize)]
pub struct EditVersionRequest {
    pub id: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// POST /api/v1/updates/manager/version/edit
pub async fn edit_version(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<SuccessResponse>> {
    require_auth(&req)?.require_role(Role::UpdateEdit)?;
    let body: EditVersionRequest = parse_body(req).await?;

    let success = service::edit_version(&state, &body.id, &body.description).await?;
    Ok(Json(SuccessResponse { success }))
}

#[derive(Debug, Deserialize)]
pub struct ProcessVersionRequest {
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessVersionResponse {
    pub job_id: String,
}

/// PUT /api/v1/updates/manager/version/process
pub async fn process_version(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<ProcessVersionResponse>> {
    require_auth(&req)?.require_role(Role::UpdateEdit)?;
    let body: ProcessVersionRequest = parse_body(req).await?;

    let job_id = service::process_version(&state, &body.id).await?;
    tracing::info!(version_id = %body.id, job_id = %job_id, "Publish queued");
    Ok(Json(ProcessVersionResponse { job_id }))
}

#[derive(Debug, Deserialize)]
pub struct ListVersionsQuery {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub size: u32,
}

fn default_page_size() -> u32 {
    20
}

#[derive(Debug, Serialize)]
pub struct ListVersionsResponse {
    pub versions: Vec<VersionView>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

/// GET /api/v1/updates/manager/version/list
pub async fn list_versions(
    State(state): State<AppState>,
    Query(query): Query<ListVersionsQuery>,
    req: Request,
) -> ApiResult<Json<ListVersionsResponse>> {
    require_auth(&req)?.require_role(Role::UpdateView)?;

    let (versions, total) = service::list_versions(&state, query.page, query.size).await?;
    Ok(Json(ListVersionsResponse {
        versions,
        total,
        page: query.page,
        size: query.size,
    }))
}

/// GET /api/v1/updates/manager/version/fetch/{id}
pub async fn fetch_version(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<Json<VersionView>> {
    require_auth(&req)?.require_role(Role::UpdateView)?;
    let view = service::fetch_version(&state, &id).await?;
    Ok(Json(view))
}

#[derive(Debug, Serialize)]
pub struct JobsResponse {
    pub jobs: Vec<JobView>,
}

/// GET /api/v1/updates/manager/version/jobs
pub async fn list_jobs(State(state): State<AppState>, req: Request) -> ApiResult<Json<JobsResponse>> {
    require_auth(&req)?.require_role(Role::UpdateView)?;
    let jobs = service::list_jobs(&state).await?;
    Ok(Json(JobsResponse { jobs }))
}
