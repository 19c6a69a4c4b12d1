//! Client-driven backend multipart endpoints (init / part / complete /
//! abort). The server holds no session state between calls: the client
//! carries the upload id and object key, and the key is re-checked against
//! the path on every call.

use axum::body::Bytes;
use axum::extract::{Json, Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;

use common::prelude::VirtualPath;
use s3_driver::CompletedPartInfo;

use crate::auth::Auth;
use crate::fs::MultipartInit;
use crate::http_server::envelope::{ApiError, ApiResponse};
use crate::ServiceState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    pub path: String,
    #[serde(default)]
    pub filename: Option<String>,
    /// Declared but unused: the content type is inferred from the target
    /// filename, never trusted from the client.
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

pub async fn init_handler(
    State(state): State<ServiceState>,
    Auth(auth): Auth,
    Json(req): Json<InitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut path = VirtualPath::parse(&req.path)?;
    if let Some(filename) = &req.filename {
        if path.dir_hint() {
            path = path.join(filename).map_err(crate::fs::error::FsError::from)?;
        }
    }
    let init = state.fs().multipart_init(&auth, &path).await?;
    Ok(ApiResponse::<MultipartInit>::ok(init))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartQuery {
    pub path: String,
    pub upload_id: String,
    pub part_number: i32,
    #[serde(default)]
    pub is_last_part: bool,
    pub key: String,
}

pub async fn part_handler(
    State(state): State<ServiceState>,
    Auth(auth): Auth,
    Query(query): Query<PartQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let path = VirtualPath::parse(&query.path)?;
    let etag = state
        .fs()
        .multipart_part(
            &auth,
            &path,
            &query.upload_id,
            query.part_number,
            &query.key,
            body,
        )
        .await?;
    Ok(ApiResponse::ok(serde_json::json!({
        "etag": etag,
        "partNumber": query.part_number,
        "isLastPart": query.is_last_part,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletePart {
    pub part_number: i32,
    pub etag: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub path: String,
    pub upload_id: String,
    pub parts: Vec<CompletePart>,
    pub key: String,
}

pub async fn complete_handler(
    State(state): State<ServiceState>,
    Auth(auth): Auth,
    Json(req): Json<CompleteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let path = VirtualPath::parse(&req.path)?;
    let parts = req
        .parts
        .into_iter()
        .map(|p| CompletedPartInfo {
            part_number: p.part_number,
            etag: p.etag,
        })
        .collect();
    let file = state
        .fs()
        .multipart_complete(&auth, &path, &req.upload_id, parts, &req.key)
        .await?;
    Ok(ApiResponse::created(file))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortRequest {
    pub path: String,
    pub upload_id: String,
    pub key: String,
}

/// Always acknowledges: the client must be able to clean up even when the
/// backend abort fails.
pub async fn abort_handler(
    State(state): State<ServiceState>,
    Auth(auth): Auth,
    Json(req): Json<AbortRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let path = VirtualPath::parse(&req.path)?;
    state
        .fs()
        .multipart_abort(&auth, &path, &req.upload_id, &req.key)
        .await?;
    Ok(ApiResponse::ack())
}
