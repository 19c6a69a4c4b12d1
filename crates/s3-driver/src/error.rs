//! Error types for the storage driver.

use aws_sdk_s3::error::{DisplayErrorContext, SdkError};

/// Errors that can occur when talking to an S3-compatible backend.
#[derive(Debug, thiserror::Error)]
pub enum S3DriverError {
    /// Object does not exist
    #[error("object not found: {0}")]
    NotFound(String),

    /// Driver does not support the requested capability
    #[error("operation not supported by this storage driver: {0}")]
    Unsupported(&'static str),

    /// Invalid driver configuration
    #[error("invalid storage configuration: {0}")]
    InvalidConfig(String),

    /// Presigned URL generation failed
    #[error("presigning failed: {0}")]
    Presign(String),

    /// Backend error that survived the retry budget
    #[error("upstream storage error during {op} (status {status:?}): {message}")]
    Upstream {
        op: &'static str,
        status: Option<u16>,
        message: String,
    },
}

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, S3DriverError>;

/// Collapse an SDK error into a driver error, pulling the HTTP status out of
/// the raw response when one is available. The SDK has already burned its
/// retry budget by the time this runs.
pub(crate) fn map_sdk_err<E>(op: &'static str, err: SdkError<E>) -> S3DriverError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    if status == Some(404) {
        return S3DriverError::NotFound(op.to_string());
    }
    S3DriverError::Upstream {
        op,
        status,
        message: DisplayErrorContext(&err).to_string(),
    }
}

/// HTTP status of an SDK error, when the response got far enough to have one.
pub(crate) fn sdk_status<E>(err: &SdkError<E>) -> Option<u16>
where
    E: std::error::Error + Send + Sync + 'static,
{
    err.raw_response().map(|r| r.status().as_u16())
}
