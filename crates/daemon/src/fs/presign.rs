//! Client-direct uploads via presigned PUT URLs.
//!
//! `presign_put` signs a URL and records a pending shared-file row;
//! `presign_commit` confirms the upload once the client has PUT the bytes.
//! The content type is always inferred server-side from the filename; the
//! client's declared type is never signed into the URL.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use common::mime;
use common::prelude::VirtualPath;

use crate::auth::AuthResult;
use crate::database::SharedFileRecord;
use crate::fs::error::FsError;
use crate::fs::FileSystem;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignPutOutcome {
    pub presigned_url: String,
    pub object_key: String,
    pub file_id: Uuid,
    pub mimetype: String,
    pub expires_in_seconds: u64,
}

impl FileSystem {
    /// Sign a PUT URL for `filename` under directory `path` and track the
    /// pending upload.
    pub async fn presign_put(
        &self,
        auth: &AuthResult,
        path: &VirtualPath,
        filename: &str,
        declared_size: Option<u64>,
    ) -> Result<PresignPutOutcome, FsError> {
        auth.require_file().map_err(FsError::from)?;

        let target = path.join(filename).map_err(FsError::from)?;
        let resolved = self.resolver().resolve(auth, &target).await?;
        if resolved.sub_path.is_empty() {
            return Err(FsError::InvalidPath(
                "cannot write to a mount root".to_string(),
            ));
        }
        if let Some(size) = declared_size {
            self.check_capacity(&resolved, size).await?;
        }

        let driver = self.driver_for(&resolved)?;
        let content_type = mime::content_type_for_name(filename);

        let record = self
            .database()
            .create_pending_shared_file(
                resolved.file_key(),
                &resolved.storage.id,
                Some(&resolved.mount.id),
                Some(target.as_str()),
                filename,
                &content_type,
                auth.principal_id.map(|id| id.to_string()).as_deref(),
            )
            .await?;

        let presigned_url = driver
            .presign_put(resolved.file_key(), None, &content_type)
            .await?;

        Ok(PresignPutOutcome {
            presigned_url,
            object_key: resolved.object_key.clone(),
            file_id: record.id,
            mimetype: content_type,
            expires_in_seconds: driver.default_signed_ttl().as_secs(),
        })
    }

    /// Confirm a client-direct upload.
    ///
    /// A missing etag is accepted (some S3-compatible services strip it
    /// when the PUT runs under CORS) but logged, since the record then
    /// cannot be used for integrity checks.
    pub async fn presign_commit(
        &self,
        auth: &AuthResult,
        file_id: &Uuid,
        object_key: &str,
        etag: Option<&str>,
        size: Option<i64>,
    ) -> Result<SharedFileRecord, FsError> {
        auth.require_file().map_err(FsError::from)?;

        let record = self
            .database()
            .get_shared_file(file_id)
            .await?
            .ok_or_else(|| FsError::NotFound(format!("upload {file_id}")))?;

        if record.object_key != object_key {
            return Err(FsError::Conflict(format!(
                "object key does not match upload {file_id}"
            )));
        }

        if etag.is_none() {
            tracing::warn!(
                %file_id,
                object_key,
                "presign commit without etag; bucket CORS likely strips it"
            );
        }

        let committed = self
            .database()
            .commit_shared_file(file_id, etag, size)
            .await?
            .ok_or_else(|| FsError::NotFound(format!("upload {file_id}")))?;

        // Freshen listings around the target so the new object is visible.
        if let Some(target) = &committed.target_path {
            if let Ok(path) = VirtualPath::parse(target) {
                if let Ok(resolved) = self.resolver().resolve(auth, &path).await {
                    self.after_mutation(&resolved, false).await?;
                }
            }
        }

        tracing::info!(
            %file_id,
            object_key,
            committed_at = %committed
                .committed_at
                .unwrap_or_else(OffsetDateTime::now_utc),
            "client-direct upload committed"
        );

        Ok(committed)
    }
}
