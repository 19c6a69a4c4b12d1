//! Presigned client-direct upload endpoints.

use axum::extract::{Json, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use uuid::Uuid;

use common::prelude::VirtualPath;

use crate::auth::Auth;
use crate::fs::presign::PresignPutOutcome;
use crate::http_server::envelope::{ApiError, ApiResponse};
use crate::ServiceState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignRequest {
    /// Directory the file lands in.
    pub path: String,
    pub file_name: String,
    /// Declared but unused: the signed content type comes from the
    /// filename.
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Auth(auth): Auth,
    Json(req): Json<PresignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let path = VirtualPath::parse(&req.path)?;
    let outcome = state
        .fs()
        .presign_put(&auth, &path, &req.file_name, req.file_size)
        .await?;
    Ok(ApiResponse::<PresignPutOutcome>::ok(outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub file_id: Uuid,
    pub object_key: String,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
    // Mirrors of what presign returned; accepted for client convenience.
    #[serde(default)]
    pub target_path: Option<String>,
    #[serde(default)]
    pub storage_config_id: Option<Uuid>,
    #[serde(default)]
    pub mount_id: Option<Uuid>,
}

pub async fn commit_handler(
    State(state): State<ServiceState>,
    Auth(auth): Auth,
    Json(req): Json<CommitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .fs()
        .presign_commit(
            &auth,
            &req.file_id,
            &req.object_key,
            req.etag.as_deref(),
            req.file_size,
        )
        .await?;

    Ok(ApiResponse::ok(serde_json::json!({
        "fileId": record.id,
        "objectKey": record.object_key,
        "status": record.status.as_str(),
        "etag": record.etag,
        "size": record.size,
    })))
}
