//! Uniform JSON response envelope for the `/api` surface.
//!
//! Every response carries `{code, message, data, success, errorId?}`. For
//! internal failures the envelope exposes only a short error id; full
//! detail goes to the server log under that id.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthError;
use crate::fs::error::FsError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub code: u16,
    pub message: String,
    pub data: Option<T>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_id: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            message: "ok".to_string(),
            data: Some(data),
            success: true,
            error_id: None,
        }
    }

    pub fn created(data: T) -> Self {
        Self {
            code: StatusCode::CREATED.as_u16(),
            message: "created".to_string(),
            data: Some(data),
            success: true,
            error_id: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn ack() -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            message: "ok".to_string(),
            data: None,
            success: true,
            error_id: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

/// Error wrapper every `/api/fs` handler returns.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub FsError);

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError(FsError::from(err))
    }
}

impl From<common::prelude::PathError> for ApiError {
    fn from(err: common::prelude::PathError) -> Self {
        ApiError(FsError::from(err))
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError(FsError::from(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = err.status();

        let (message, error_id) = if err.is_internal() {
            let error_id = Uuid::new_v4().simple().to_string()[..8].to_string();
            tracing::error!(error_id, error = ?err, "request failed");
            (format!("internal error (id {error_id})"), Some(error_id))
        } else {
            (err.to_string(), None)
        };

        let body = ApiResponse::<serde_json::Value> {
            code: status.as_u16(),
            message: format!("{}: {message}", err.kind()),
            data: None,
            success: false,
            error_id,
        };
        (status, Json(body)).into_response()
    }
}

/// Auth failures outside the fs error domain (extractor rejections).
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
