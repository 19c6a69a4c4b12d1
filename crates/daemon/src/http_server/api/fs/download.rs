//! Proxy-or-redirect download endpoint.
//!
//! With `web_proxy` set on the resolving mount the object streams through
//! this process, honouring `Range` and rewriting `Content-Disposition`;
//! otherwise the client is redirected to a presigned URL.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use common::mime;
use common::prelude::VirtualPath;
use s3_driver::{attachment_disposition, inline_disposition};

use crate::auth::Auth;
use crate::fs::DownloadOutcome;
use crate::http_server::envelope::ApiError;
use crate::ServiceState;

/// Proxied content is immutable object data; a year of caching is safe.
const CACHE_CONTROL_VALUE: &str = "public, max-age=31536000";

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub path: String,
    /// Inline preview instead of attachment download.
    #[serde(default)]
    pub inline: bool,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Auth(auth): Auth,
    Query(query): Query<DownloadQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let path = VirtualPath::parse(&query.path)?;
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());

    let outcome = state
        .fs()
        .download(&auth, &path, range, query.inline)
        .await?;

    match outcome {
        DownloadOutcome::Redirect { url } => Ok(Redirect::temporary(&url).into_response()),
        DownloadOutcome::Proxy {
            body,
            filename,
            inline,
        } => {
            let status = if body.content_range.is_some() {
                StatusCode::PARTIAL_CONTENT
            } else {
                StatusCode::OK
            };
            let content_type = if inline {
                mime::preview_content_type(&filename)
            } else {
                mime::download_content_type(&filename)
            };
            let disposition = if inline {
                inline_disposition(&filename)
            } else {
                attachment_disposition(&filename)
            };

            let mut builder = Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_DISPOSITION, disposition)
                .header(header::CACHE_CONTROL, CACHE_CONTROL_VALUE)
                .header(header::ACCEPT_RANGES, "bytes");
            if let Some(content_range) = &body.content_range {
                builder = builder.header(header::CONTENT_RANGE, content_range.clone());
            }
            if let Some(len) = body.content_length {
                builder = builder.header(header::CONTENT_LENGTH, len);
            }
            if let Some(etag) = &body.etag {
                builder = builder.header(header::ETAG, etag.clone());
            }

            let stream = ReaderStream::new(body.body.into_async_read());
            Ok(builder
                .body(Body::from_stream(stream))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
        }
    }
}
