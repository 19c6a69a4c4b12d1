use axum::extract::{Json, State};
use axum::response::IntoResponse;
use serde::Deserialize;

use common::prelude::VirtualPath;

use crate::auth::Auth;
use crate::http_server::envelope::{ApiError, ApiResponse};
use crate::ServiceState;

#[derive(Debug, Deserialize)]
pub struct MkdirRequest {
    pub path: String,
}

/// Idempotent: re-creating an existing directory succeeds.
pub async fn handler(
    State(state): State<ServiceState>,
    Auth(auth): Auth,
    Json(req): Json<MkdirRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let path = VirtualPath::parse(&req.path)?;
    state.fs().mkdir(&auth, &path).await?;
    Ok(ApiResponse::created(serde_json::json!({ "path": path })))
}
