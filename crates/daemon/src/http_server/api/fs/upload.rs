//! Multipart/form-data upload endpoint.
//!
//! The `file` field is consumed as a stream. Bodies that stay under the
//! direct-upload limit (or that request `use_multipart=false`) go through a
//! single PutObject; anything larger spills into the streaming multipart
//! pipeline without re-reading what was already buffered.

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;

use common::prelude::VirtualPath;

use crate::auth::Auth;
use crate::fs::error::FsError;
use crate::fs::DIRECT_UPLOAD_LIMIT;
use crate::http_server::envelope::{ApiError, ApiResponse};
use crate::ServiceState;

pub async fn handler(
    State(state): State<ServiceState>,
    Auth(auth): Auth,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut path: Option<VirtualPath> = None;
    let mut use_multipart = true;
    let mut uploaded = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| FsError::BadRequest(e.to_string()))?
    {
        match field.name().unwrap_or_default() {
            "path" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| FsError::BadRequest(e.to_string()))?;
                path = Some(VirtualPath::parse(&value).map_err(FsError::from)?);
            }
            "use_multipart" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| FsError::BadRequest(e.to_string()))?;
                use_multipart = value != "false" && value != "0";
            }
            "file" => {
                let target = path.clone().ok_or_else(|| {
                    FsError::BadRequest("path field must precede file field".to_string())
                })?;

                // Buffer up to the direct limit; past that, hand the buffered
                // head plus the rest of the field to the streaming pipeline.
                let mut buffered = BytesMut::new();
                let mut spilled = false;
                while let Some(chunk) = field.chunk().await.transpose() {
                    let chunk = chunk.map_err(|e| FsError::BadRequest(e.to_string()))?;
                    buffered.extend_from_slice(&chunk);
                    if use_multipart && buffered.len() as u64 > DIRECT_UPLOAD_LIMIT {
                        spilled = true;
                        break;
                    }
                }

                let file = if spilled {
                    let head =
                        futures::stream::iter([Ok::<Bytes, MultipartError>(buffered.freeze())]);
                    let body = Box::pin(head.chain(field));
                    state
                        .fs()
                        .upload_streaming(&auth, &target, body, None)
                        .await?
                } else {
                    state
                        .fs()
                        .upload_bytes(&auth, &target, buffered.freeze())
                        .await?
                };
                uploaded = Some(file);
            }
            other => {
                tracing::debug!(field = other, "ignoring unknown upload form field");
            }
        }
    }

    let uploaded =
        uploaded.ok_or_else(|| FsError::BadRequest("missing file field".to_string()))?;
    Ok(ApiResponse::created(uploaded))
}
