use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;

use common::prelude::VirtualPath;

use crate::auth::Auth;
use crate::fs::entry::DirectoryListing;
use crate::http_server::envelope::{ApiError, ApiResponse};
use crate::ServiceState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub path: String,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Auth(auth): Auth,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let path = VirtualPath::parse(&query.path)?;
    let listing = state.fs().list(&auth, &path).await?;
    Ok(ApiResponse::<DirectoryListing>::ok(listing))
}
