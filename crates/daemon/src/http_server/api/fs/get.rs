use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;

use common::prelude::VirtualPath;

use crate::auth::Auth;
use crate::fs::entry::FsEntry;
use crate::http_server::envelope::{ApiError, ApiResponse};
use crate::ServiceState;

#[derive(Debug, Deserialize)]
pub struct GetQuery {
    pub path: String,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Auth(auth): Auth,
    Query(query): Query<GetQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let path = VirtualPath::parse(&query.path)?;
    let entry = state.fs().stat(&auth, &path).await?;
    Ok(ApiResponse::<FsEntry>::ok(entry))
}
