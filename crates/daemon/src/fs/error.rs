//! Error surface of the filesystem façade.
//!
//! Upstream storage error text is never reflected to clients; it is logged
//! against a short error id at the HTTP layer and the caller sees only the
//! mapped kind.

use axum::http::StatusCode;
use common::prelude::PathError;
use s3_driver::S3DriverError;

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("path is outside the allowed prefix: {0}")]
    PathForbidden(String),

    #[error("no mount covers path: {0}")]
    MountNotFound(String),

    #[error("missing required permission: {0}")]
    PermissionDenied(&'static str),

    #[error("authentication required")]
    Unauthorized,

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("path is locked: {0}")]
    Locked(String),

    #[error("storage capacity exhausted")]
    CapacityExhausted,

    #[error("rename across mounts is not supported")]
    CrossMountRename,

    #[error("body size mismatch: declared {declared}, received {actual}")]
    SizeMismatch { declared: u64, actual: u64 },

    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(u64),

    #[error("malformed request body: {0}")]
    BadRequest(String),

    #[error("upstream storage unavailable")]
    Upstream(#[source] S3DriverError),

    #[error("metadata store error")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl FsError {
    /// Stable machine-readable kind, mirrored into the response envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            FsError::InvalidPath(_) => "invalidPath",
            FsError::NotFound(_) => "notFound",
            FsError::Conflict(_) => "conflict",
            FsError::PathForbidden(_) => "pathForbidden",
            FsError::MountNotFound(_) => "mountNotFound",
            FsError::PermissionDenied(_) => "permissionDenied",
            FsError::Unauthorized => "unauthorized",
            FsError::Unsupported(_) => "unsupported",
            FsError::Locked(_) => "locked",
            FsError::CapacityExhausted => "capacityExhausted",
            FsError::CrossMountRename => "crossMountRename",
            FsError::SizeMismatch { .. } => "sizeMismatch",
            FsError::PayloadTooLarge(_) => "payloadTooLarge",
            FsError::BadRequest(_) => "badRequest",
            FsError::Upstream(_) => "upstreamUnavailable",
            FsError::Database(_) | FsError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            FsError::InvalidPath(_) | FsError::BadRequest(_) | FsError::CrossMountRename => {
                StatusCode::BAD_REQUEST
            }
            FsError::SizeMismatch { .. } => StatusCode::BAD_REQUEST,
            FsError::NotFound(_) | FsError::MountNotFound(_) => StatusCode::NOT_FOUND,
            FsError::Conflict(_) => StatusCode::CONFLICT,
            FsError::PathForbidden(_) | FsError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            FsError::Unauthorized => StatusCode::UNAUTHORIZED,
            FsError::Unsupported(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            FsError::Locked(_) => StatusCode::LOCKED,
            FsError::CapacityExhausted => StatusCode::INSUFFICIENT_STORAGE,
            FsError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            FsError::Upstream(_) => StatusCode::BAD_GATEWAY,
            FsError::Database(_) | FsError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether full detail should be hidden behind an error id.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            FsError::Upstream(_) | FsError::Database(_) | FsError::Internal(_)
        )
    }
}

impl From<S3DriverError> for FsError {
    fn from(err: S3DriverError) -> Self {
        match err {
            S3DriverError::NotFound(what) => FsError::NotFound(what),
            S3DriverError::Unsupported(op) => FsError::Unsupported(op.to_string()),
            other => FsError::Upstream(other),
        }
    }
}

impl From<PathError> for FsError {
    fn from(err: PathError) -> Self {
        FsError::InvalidPath(err.to_string())
    }
}

impl From<crate::auth::AuthError> for FsError {
    fn from(err: crate::auth::AuthError) -> Self {
        match err {
            crate::auth::AuthError::MissingCredentials => FsError::Unauthorized,
            crate::auth::AuthError::InvalidCredentials => FsError::Unauthorized,
            crate::auth::AuthError::PermissionDenied(flag) => FsError::PermissionDenied(flag),
            crate::auth::AuthError::Database(e) => FsError::Database(e),
        }
    }
}
