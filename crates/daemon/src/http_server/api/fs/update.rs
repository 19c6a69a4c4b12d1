use axum::extract::{Json, State};
use axum::response::IntoResponse;
use serde::Deserialize;

use common::prelude::VirtualPath;

use crate::auth::Auth;
use crate::http_server::envelope::{ApiError, ApiResponse};
use crate::ServiceState;

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub path: String,
    /// Full replacement content; this endpoint backs inline text editors.
    pub content: String,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Auth(auth): Auth,
    Json(req): Json<UpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let path = VirtualPath::parse(&req.path)?;
    let file = state.fs().update_inline(&auth, &path, req.content).await?;
    Ok(ApiResponse::ok(file))
}
