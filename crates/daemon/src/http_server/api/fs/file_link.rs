use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;

use common::prelude::VirtualPath;

use crate::auth::Auth;
use crate::http_server::envelope::{ApiError, ApiResponse};
use crate::ServiceState;

#[derive(Debug, Deserialize)]
pub struct FileLinkQuery {
    pub path: String,
    /// Seconds of validity; the storage config default applies when unset.
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub force_download: bool,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Auth(auth): Auth,
    Query(query): Query<FileLinkQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let path = VirtualPath::parse(&query.path)?;
    let url = state
        .fs()
        .file_link(
            &auth,
            &path,
            query.expires_in.map(Duration::from_secs),
            query.force_download,
        )
        .await?;

    Ok(ApiResponse::ok(serde_json::json!({
        "url": url,
        "expiresIn": query.expires_in,
        "forceDownload": query.force_download,
    })))
}
