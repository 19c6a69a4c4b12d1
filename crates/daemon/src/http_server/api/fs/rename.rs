use axum::extract::{Json, State};
use axum::response::IntoResponse;
use serde::Deserialize;

use common::prelude::VirtualPath;

use crate::auth::Auth;
use crate::http_server::envelope::{ApiError, ApiResponse};
use crate::ServiceState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    pub old_path: String,
    pub new_path: String,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Auth(auth): Auth,
    Json(req): Json<RenameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let old_path = VirtualPath::parse(&req.old_path)?;
    let new_path = VirtualPath::parse(&req.new_path)?;
    state.fs().rename(&auth, &old_path, &new_path).await?;
    Ok(ApiResponse::ack())
}
