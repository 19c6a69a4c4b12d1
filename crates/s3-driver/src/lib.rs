//! Thin capability-scoped wrapper over an S3-compatible endpoint.
//!
//! One [`S3Driver`] wraps one bucket on one endpoint. Provider differences
//! (AWS, Cloudflare R2, Backblaze B2, generic MinIO-style services) are
//! handled at configuration time as retry budget, request timeout and
//! checksum behaviour, never by branching inside operations. Callers query
//! [`S3Driver::has_capability`] and get a typed `Unsupported` refusal instead
//! of silent degradation.

mod config;
mod driver;
mod error;
mod multipart;
mod presign;
mod provider;

pub use config::ConnectionConfig;
pub use driver::{ListPage, ObjectBody, ObjectHead, ObjectInfo, PutOutcome, S3Driver};
pub use error::{Result, S3DriverError};
pub use multipart::{CompletedPartInfo, MultipartOutcome};
pub use presign::{attachment_disposition, inline_disposition};
pub use provider::{Capability, ProviderKind};

/// S3 minimum size for any non-final multipart part.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;
