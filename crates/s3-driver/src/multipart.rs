//! Multipart upload operations with per-part retry.

use std::time::Duration;

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;

use crate::driver::S3Driver;
use crate::error::{map_sdk_err, Result, S3DriverError};
use crate::provider::Capability;

/// Attempts per individual part upload. Part bodies are not idempotent at
/// the SDK layer, so retries happen here.
const PART_ATTEMPTS: u32 = 3;
const PART_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// An uploaded part the caller must echo back at completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPartInfo {
    pub part_number: i32,
    pub etag: String,
}

/// Result of completing a multipart upload.
#[derive(Debug, Clone)]
pub struct MultipartOutcome {
    pub etag: Option<String>,
}

impl S3Driver {
    /// Start a multipart upload, returning the upload id.
    pub async fn create_multipart(&self, key: &str, content_type: &str) -> Result<String> {
        self.require(Capability::Multipart, "create_multipart_upload")?;

        let output = self
            .client()
            .create_multipart_upload()
            .bucket(self.bucket())
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| map_sdk_err("create_multipart_upload", e))?;

        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| S3DriverError::Upstream {
                op: "create_multipart_upload",
                status: None,
                message: "backend did not return an upload id".to_string(),
            })
    }

    /// Upload one part. Retried up to three times with `1s * 2^(attempt-1)`
    /// backoff before the error surfaces.
    pub async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        self.require(Capability::Multipart, "upload_part")?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = self
                .client()
                .upload_part()
                .bucket(self.bucket())
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(data.clone()))
                .send()
                .await;

            match result {
                Ok(output) => {
                    return Ok(output.e_tag().unwrap_or_default().to_string());
                }
                Err(err) if attempt < PART_ATTEMPTS => {
                    let backoff = PART_BACKOFF_BASE * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        part_number,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "part upload failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(map_sdk_err("upload_part", err)),
            }
        }
    }

    /// Commit a multipart upload with the accumulated part list.
    pub async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPartInfo],
    ) -> Result<MultipartOutcome> {
        self.require(Capability::Multipart, "complete_multipart_upload")?;

        let completed = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect::<Vec<_>>();

        let output = self
            .client()
            .complete_multipart_upload()
            .bucket(self.bucket())
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| map_sdk_err("complete_multipart_upload", e))?;

        Ok(MultipartOutcome {
            etag: output.e_tag().map(str::to_string),
        })
    }

    /// Release backend state for an in-flight multipart upload.
    pub async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<()> {
        self.require(Capability::Multipart, "abort_multipart_upload")?;

        self.client()
            .abort_multipart_upload()
            .bucket(self.bucket())
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| map_sdk_err("abort_multipart_upload", e))?;

        Ok(())
    }
}
