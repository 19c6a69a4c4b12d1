//! Batch remove / copy endpoints.

use axum::extract::{Json, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use uuid::Uuid;

use common::prelude::VirtualPath;

use crate::auth::Auth;
use crate::fs::batch::{BatchCopyOutcome, BatchRemoveOutcome, CopyItem};
use crate::fs::error::FsError;
use crate::http_server::envelope::{ApiError, ApiResponse};
use crate::ServiceState;

#[derive(Debug, Deserialize)]
pub struct BatchRemoveRequest {
    pub paths: Vec<String>,
}

pub async fn remove_handler(
    State(state): State<ServiceState>,
    Auth(auth): Auth,
    Json(req): Json<BatchRemoveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let paths = req
        .paths
        .iter()
        .map(|p| VirtualPath::parse(p))
        .collect::<Result<Vec<_>, _>>()
        .map_err(FsError::from)?;
    let outcome = state.fs().batch_remove(&auth, &paths).await?;
    Ok(ApiResponse::<BatchRemoveOutcome>::ok(outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCopyRequest {
    pub items: Vec<CopyItem>,
    #[serde(default)]
    pub skip_existing: bool,
}

pub async fn copy_handler(
    State(state): State<ServiceState>,
    Auth(auth): Auth,
    Json(req): Json<BatchCopyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .fs()
        .batch_copy(&auth, &req.items, req.skip_existing)
        .await?;
    Ok(ApiResponse::<BatchCopyOutcome>::ok(outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyCommitRequest {
    pub target_mount_id: Uuid,
    /// Target virtual paths the client finished copying itself.
    pub files: Vec<String>,
}

/// After a client-side cross-storage copy, refresh mtimes and listings
/// around each target so the copied files are visible immediately.
pub async fn copy_commit_handler(
    State(state): State<ServiceState>,
    Auth(auth): Auth,
    Json(req): Json<CopyCommitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let fs = state.fs();
    let mut refreshed = 0usize;
    for file in &req.files {
        let path = VirtualPath::parse(file).map_err(FsError::from)?;
        let resolved = fs.resolver().resolve(&auth, &path).await?;
        if resolved.mount.id != req.target_mount_id {
            return Err(FsError::Conflict(format!(
                "path {path} does not resolve to the target mount"
            ))
            .into());
        }
        fs.after_mutation(&resolved, false).await?;
        refreshed += 1;
    }
    Ok(ApiResponse::ok(serde_json::json!({ "refreshed": refreshed })))
}
