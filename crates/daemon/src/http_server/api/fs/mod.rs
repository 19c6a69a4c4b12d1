use axum::routing::{delete, get, post};
use axum::Router;

pub mod batch;
pub mod download;
pub mod file_link;
pub mod get;
pub mod list;
pub mod mkdir;
pub mod multipart;
pub mod presign;
pub mod remove;
pub mod rename;
pub mod search;
pub mod update;
pub mod upload;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/list", get(list::handler))
        .route("/get", get(get::handler))
        .route("/download", get(download::handler))
        .route("/mkdir", post(mkdir::handler))
        .route("/upload", post(upload::handler))
        .route("/multipart/init", post(multipart::init_handler))
        .route("/multipart/part", post(multipart::part_handler))
        .route("/multipart/complete", post(multipart::complete_handler))
        .route("/multipart/abort", post(multipart::abort_handler))
        .route("/presign", post(presign::handler))
        .route("/presign/commit", post(presign::commit_handler))
        .route("/rename", post(rename::handler))
        .route("/remove", delete(remove::handler))
        .route("/batch-remove", post(batch::remove_handler))
        .route("/batch-copy", post(batch::copy_handler))
        .route("/batch-copy-commit", post(batch::copy_commit_handler))
        .route("/search", get(search::handler))
        .route("/file-link", get(file_link::handler))
        .route("/update", post(update::handler))
        .with_state(state)
}
