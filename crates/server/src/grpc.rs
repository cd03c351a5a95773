//! gRPC transport for the update service.

use crate::auth::{AuthenticatedUser, Role};
use crate::service::{self, StartUploadArgs};
use crate::state::AppState;
use bytes::Bytes;
use tonic::{Request, Response, Status};

pub mod proto {
    tonic::include_proto!("depot.update.v1");
}

use proto::update_service_server::{UpdateService, UpdateServiceServer};

/// gRPC adapter over the shared service layer.
pub struct UpdateGrpcService {
    state: AppState,
}

impl UpdateGrpcService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn into_server(self) -> UpdateServiceServer<Self> {
        UpdateServiceServer::new(self)
    }

    /// Verify the bearer token in request metadata and require a role.
    async fn authorize<T>(
        &self,
        request: &Request<T>,
        role: Role,
    ) -> Result<AuthenticatedUser, Status> {
        let token = request
            .metadata()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| {
                if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                    Some(&v[7..])
                } else {
                    None
                }
            });
        let Some(token) = token else {
            return Err(Status::unauthenticated("authentication required"));
        };
        let Some(introspector) = &self.state.introspector else {
            return Err(Status::unauthenticated(
                "token introspection is not configured",
            ));
        };

        let user = introspector.introspect(token).await?;
        user.require_role(role)?;
        Ok(user)
    }
}

fn version_info(view: service::VersionView) -> proto::VersionInfo {
    proto::VersionInfo {
        id: view.id,
        version: view.version,
        description: view.description,
        state: view.state,
        files_count: view.files_count,
        created_at: view.created_at,
        updated_at: view.updated_at,
    }
}

fn chunk_ranges(ranges: Vec<depot_core::ChunkRange>) -> Vec<proto::ChunkRange> {
    ranges
        .into_iter()
        .map(|r| proto::ChunkRange {
            start: r.start,
            end: r.end,
        })
        .collect()
}

#[tonic::async_trait]
impl UpdateService for UpdateGrpcService {
    async fn create_version(
        &self,
        request: Request<proto::CreateVersionRequest>,
    ) -> Result<Response<proto::CreateVersionResponse>, Status> {
        self.authorize(&request, Role::UpdateEdit).await?;
        let req = request.into_inner();

        let (id, version) = service::create_version(&self.state, req.r#type, &req.description).await?;
        Ok(Response::new(proto::CreateVersionResponse { id, version }))
    }

    async fn edit_version(
        &self,
        request: Request<proto::EditVersionRequest>,
    ) -> Result<Response<proto::EditVersionResponse>, Status> {
        self.authorize(&request, Role::UpdateEdit).await?;
        let req = request.into_inner();

        let success = service::edit_version(&self.state, &req.id, &req.description).await?;
        Ok(Response::new(proto::EditVersionResponse { success }))
    }

    async fn fetch_version(
        &self,
        request: Request<proto::FetchVersionRequest>,
    ) -> Result<Response<proto::VersionInfo>, Status> {
        self.authorize(&request, Role::UpdateView).await?;
        let req = request.into_inner();

        let view = service::fetch_version(&self.state, &req.id).await?;
        Ok(Response::new(version_info(view)))
    }

    async fn list_versions(
        &self,
        request: Request<proto::ListVersionsRequest>,
    ) -> Result<Response<proto::ListVersionsResponse>, Status> {
        self.authorize(&request, Role::UpdateView).await?;
        let req = request.into_inner();

        let (versions, total) = service::list_versions(&self.state, req.page, req.size).await?;
        Ok(Response::new(proto::ListVersionsResponse {
            versions: versions.into_iter().map(version_info).collect(),
            total,
        }))
    }

    async fn fetch_uploads(
        &self,
        request: Request<proto::FetchUploadsRequest>,
    ) -> Result<Response<proto::FetchUploadsResponse>, Status> {
        self.authorize(&request, Role::UpdateView).await?;
        let req = request.into_inner();

        let uploads = service::fetch_uploads(&self.state, &req.version_id).await?;
        Ok(Response::new(proto::FetchUploadsResponse {
            uploads: uploads
                .into_iter()
                .map(|view| proto::UploadInfo {
                    upload_id: view.upload_id,
                    concurrent_id: view.concurrent_id,
                    state: view.state,
                    chunks_count: view.chunks_count,
                    missing_ranges: chunk_ranges(view.missing_ranges),
                })
                .collect(),
        }))
    }

    async fn start_upload_version(
        &self,
        request: Request<proto::StartUploadVersionRequest>,
    ) -> Result<Response<proto::StartUploadVersionResponse>, Status> {
        self.authorize(&request, Role::UpdateEdit).await?;
        let req = request.into_inner();

        let view = service::start_upload(
            &self.state,
            &StartUploadArgs {
                version_id: req.version_id,
                hash: req.hash,
                chunk_size: req.chunk_size,
                file_size: req.file_size,
            },
        )
        .await?;
        Ok(Response::new(proto::StartUploadVersionResponse {
            upload_id: view.upload_id,
            concurrent_id: view.concurrent_id,
            chunks_count: view.chunks_count,
            missing_ranges: chunk_ranges(view.missing_ranges),
        }))
    }

    async fn upload_version_chunk(
        &self,
        request: Request<proto::UploadVersionChunkRequest>,
    ) -> Result<Response<proto::UploadVersionChunkResponse>, Status> {
        self.authorize(&request, Role::UpdateEdit).await?;
        let req = request.into_inner();

        let finished = service::upload_chunk(
            &self.state,
            &req.upload_id,
            &req.concurrent_id,
            req.offset,
            Bytes::from(req.data),
        )
        .await?;
        Ok(Response::new(proto::UploadVersionChunkResponse { finished }))
    }

    async fn process_version(
        &self,
        request: Request<proto::ProcessVersionRequest>,
    ) -> Result<Response<proto::ProcessVersionResponse>, Status> {
        self.authorize(&request, Role::UpdateEdit).await?;
        let req = request.into_inner();

        let job_id = service::process_version(&self.state, &req.id).await?;
        Ok(Response::new(proto::ProcessVersionResponse { job_id }))
    }
}
