use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;

use common::prelude::VirtualPath;

use crate::auth::Auth;
use crate::http_server::envelope::{ApiError, ApiResponse};
use crate::ServiceState;

#[derive(Debug, Deserialize)]
pub struct RemoveQuery {
    pub path: String,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Auth(auth): Auth,
    Query(query): Query<RemoveQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let path = VirtualPath::parse(&query.path)?;
    state.fs().remove(&auth, &path).await?;
    Ok(ApiResponse::ack())
}
