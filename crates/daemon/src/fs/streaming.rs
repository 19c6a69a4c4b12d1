//! Server-side streaming multipart upload.
//!
//! Consumes a request body as a stream and writes it to the object store in
//! 5 MiB parts with bounded memory: at most `queue_depth` parts are ever
//! buffered or in flight, so residency is capped at `queue_depth * part_size`
//! bytes regardless of body size. The multipart session is created when the
//! first byte arrives; zero-byte bodies never open one and fall back to a
//! plain empty PutObject, since object stores reject zero-part completes.
//!
//! If the request future is dropped mid-stream (client disconnect) the
//! abort guard fires and releases the backend session best-effort.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use s3_driver::{CompletedPartInfo, S3Driver, MIN_PART_SIZE};
use tokio::task::JoinHandle;

use crate::fs::error::FsError;

/// Tuning for the bounded producer/consumer pipeline.
#[derive(Debug, Clone, Copy)]
pub struct StreamingConfig {
    /// Size of every non-final part. Clamped up to the S3 minimum.
    pub part_size: usize,
    /// Parts allowed to be buffered/in flight at once.
    pub queue_depth: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            part_size: MIN_PART_SIZE as usize,
            queue_depth: 2,
        }
    }
}

impl StreamingConfig {
    fn normalized(self) -> Self {
        Self {
            part_size: self.part_size.max(MIN_PART_SIZE as usize),
            queue_depth: self.queue_depth.clamp(1, 3),
        }
    }
}

/// Outcome of a streamed write.
#[derive(Debug, Clone)]
pub struct StreamedUpload {
    pub etag: Option<String>,
    pub size: u64,
    pub parts: usize,
}

/// Releases a multipart session if the upload never reaches a terminal
/// state, including when the request future is dropped.
struct AbortGuard {
    driver: Arc<S3Driver>,
    key: String,
    upload_id: String,
    armed: bool,
}

impl AbortGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }

    async fn abort_now(&mut self) {
        self.disarm();
        if let Err(error) = self.driver.abort_multipart(&self.key, &self.upload_id).await {
            tracing::warn!(key = %self.key, %error, "failed to abort multipart upload");
        }
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let driver = self.driver.clone();
        let key = std::mem::take(&mut self.key);
        let upload_id = std::mem::take(&mut self.upload_id);
        tokio::spawn(async move {
            if let Err(error) = driver.abort_multipart(&key, &upload_id).await {
                tracing::warn!(key = %key, %error, "failed to abort abandoned multipart upload");
            }
        });
    }
}

type PartHandle = JoinHandle<Result<CompletedPartInfo, FsError>>;

fn spawn_part(
    driver: Arc<S3Driver>,
    key: String,
    upload_id: String,
    part_number: i32,
    data: Bytes,
) -> PartHandle {
    tokio::spawn(async move {
        let etag = driver
            .upload_part(&key, &upload_id, part_number, data)
            .await?;
        Ok(CompletedPartInfo { part_number, etag })
    })
}

async fn settle(
    joined: Option<Result<Result<CompletedPartInfo, FsError>, tokio::task::JoinError>>,
) -> Result<CompletedPartInfo, FsError> {
    match joined {
        Some(result) => {
            result.map_err(|e| FsError::Internal(format!("part upload task failed: {e}")))?
        }
        None => Err(FsError::Internal("part task vanished".to_string())),
    }
}

/// Stream `body` into `key`.
///
/// `declared_len`, when known, is checked against the bytes actually read;
/// a mismatch aborts the session and fails the request.
pub async fn upload_stream<S, E>(
    driver: Arc<S3Driver>,
    key: &str,
    content_type: &str,
    mut body: S,
    declared_len: Option<u64>,
    config: StreamingConfig,
) -> Result<StreamedUpload, FsError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let config = config.normalized();

    let mut total: u64 = 0;
    let mut buffer = BytesMut::with_capacity(config.part_size.min(64 * 1024));
    let mut guard: Option<AbortGuard> = None;
    let mut upload_id: Option<String> = None;
    let mut next_part_number: i32 = 1;
    let mut in_flight: FuturesUnordered<PartHandle> = FuturesUnordered::new();
    let mut completed: Vec<CompletedPartInfo> = Vec::new();

    macro_rules! fail {
        ($guard:expr, $err:expr) => {{
            if let Some(g) = $guard.as_mut() {
                g.abort_now().await;
            }
            return Err($err);
        }};
    }

    loop {
        let chunk = match body.next().await {
            None => break,
            Some(Ok(chunk)) => chunk,
            Some(Err(error)) => {
                fail!(guard, FsError::BadRequest(format!("body read failed: {error}")))
            }
        };
        if chunk.is_empty() {
            continue;
        }

        // The session opens on the first byte, never for empty bodies.
        if upload_id.is_none() {
            let id = match driver.create_multipart(key, content_type).await {
                Ok(id) => id,
                Err(e) => return Err(e.into()),
            };
            guard = Some(AbortGuard {
                driver: driver.clone(),
                key: key.to_string(),
                upload_id: id.clone(),
                armed: true,
            });
            upload_id = Some(id);
        }

        total += chunk.len() as u64;
        if let Some(declared) = declared_len {
            if total > declared {
                fail!(
                    guard,
                    FsError::SizeMismatch {
                        declared,
                        actual: total,
                    }
                )
            }
        }
        buffer.extend_from_slice(&chunk);

        while buffer.len() >= config.part_size {
            let data = buffer.split_to(config.part_size).freeze();
            if in_flight.len() >= config.queue_depth {
                match settle(in_flight.next().await).await {
                    Ok(part) => completed.push(part),
                    Err(e) => fail!(guard, e),
                }
            }
            in_flight.push(spawn_part(
                driver.clone(),
                key.to_string(),
                upload_id.clone().expect("session open"),
                next_part_number,
                data,
            ));
            next_part_number += 1;
        }
    }

    if let Some(declared) = declared_len {
        if total != declared {
            fail!(
                guard,
                FsError::SizeMismatch {
                    declared,
                    actual: total,
                }
            )
        }
    }

    let Some(upload_id) = upload_id else {
        // Zero bytes total: plain empty object instead of a multipart
        // session the backend would refuse to complete.
        let outcome = driver.put_object(key, Bytes::new(), content_type).await?;
        return Ok(StreamedUpload {
            etag: outcome.etag,
            size: 0,
            parts: 0,
        });
    };

    // Final short part carries the remainder.
    if !buffer.is_empty() {
        if in_flight.len() >= config.queue_depth {
            match settle(in_flight.next().await).await {
                Ok(part) => completed.push(part),
                Err(e) => fail!(guard, e),
            }
        }
        in_flight.push(spawn_part(
            driver.clone(),
            key.to_string(),
            upload_id.clone(),
            next_part_number,
            buffer.freeze(),
        ));
        next_part_number += 1;
    }

    while let Some(handle) = in_flight.next().await {
        match settle(Some(handle)).await {
            Ok(part) => completed.push(part),
            Err(e) => fail!(guard, e),
        }
    }

    completed.sort_by_key(|p| p.part_number);

    let outcome = match driver.complete_multipart(key, &upload_id, &completed).await {
        Ok(outcome) => outcome,
        Err(e) => fail!(guard, e.into()),
    };
    if let Some(g) = guard.as_mut() {
        g.disarm();
    }

    tracing::debug!(
        key,
        size = total,
        parts = completed.len(),
        "streamed multipart upload complete"
    );

    Ok(StreamedUpload {
        etag: outcome.etag,
        size: total,
        parts: completed.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_normalisation() {
        let cfg = StreamingConfig {
            part_size: 1024,
            queue_depth: 16,
        }
        .normalized();
        assert_eq!(cfg.part_size, MIN_PART_SIZE as usize);
        assert_eq!(cfg.queue_depth, 3);

        let cfg = StreamingConfig {
            part_size: 8 * 1024 * 1024,
            queue_depth: 0,
        }
        .normalized();
        assert_eq!(cfg.part_size, 8 * 1024 * 1024);
        assert_eq!(cfg.queue_depth, 1);
    }

    #[test]
    fn test_part_math_for_42_mib() {
        // A 42 MiB body should slice into 8 full 5 MiB parts + one ~2 MiB
        // remainder: 42 = 8 * 5 + 2.
        let part_size = MIN_PART_SIZE;
        let body: u64 = 42 * 1024 * 1024;
        let full_parts = body / part_size;
        let remainder = body % part_size;
        assert_eq!(full_parts, 8);
        assert_eq!(remainder, 2 * 1024 * 1024);
    }
}
