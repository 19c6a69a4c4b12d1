use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use uuid::Uuid;

use common::prelude::VirtualPath;

use crate::auth::Auth;
use crate::fs::error::FsError;
use crate::fs::search::{SearchResults, SearchScope};
use crate::http_server::envelope::{ApiError, ApiResponse};
use crate::ServiceState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub mount_id: Option<Uuid>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn handler(
    State(state): State<ServiceState>,
    Auth(auth): Auth,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let path_prefix = match &query.path {
        Some(path) => Some(VirtualPath::parse(path).map_err(FsError::from)?),
        None => None,
    };
    // `scope=mount` narrows to one mount; anything else searches all
    // visible mounts.
    let mount_id = match query.scope.as_deref() {
        Some("mount") => query.mount_id,
        _ => None,
    };

    let results = state
        .fs()
        .search(
            &auth,
            &query.q,
            SearchScope {
                mount_id,
                path_prefix,
            },
            query.limit,
            query.offset,
        )
        .await?;
    Ok(ApiResponse::<SearchResults>::ok(results))
}
