//! Best-effort batch operations.

use serde::{Deserialize, Serialize};

use common::prelude::VirtualPath;
use uuid::Uuid;

use crate::auth::AuthResult;
use crate::fs::error::FsError;
use crate::fs::resolve::ROOT_MARKER;
use crate::fs::FileSystem;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub path: String,
    pub reason: String,
}

/// Outcome of `batch_remove`: nothing aborts on first failure.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BatchRemoveOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyItem {
    pub source_path: VirtualPath,
    pub target_path: VirtualPath,
}

/// One item of a cross-storage copy handed back to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossStorageItem {
    pub source_path: VirtualPath,
    pub target_path: VirtualPath,
    pub target_mount_id: Uuid,
    pub target_storage_config_id: Uuid,
}

/// Outcome of `batch_copy`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum BatchCopyOutcome {
    /// All items lived within one storage config and were copied
    /// backend-side.
    Completed {
        succeeded: Vec<String>,
        skipped: Vec<String>,
        failed: Vec<BatchFailure>,
    },
    /// Source and target live on different storage configs. The server does
    /// not stream between buckets; the client runs presigned upload +
    /// authenticated download cycles instead.
    CrossStorage {
        requires_client_side_copy: bool,
        items: Vec<CrossStorageItem>,
    },
}

impl FileSystem {
    /// Remove many paths, collecting per-item failures.
    pub async fn batch_remove(
        &self,
        auth: &AuthResult,
        paths: &[VirtualPath],
    ) -> Result<BatchRemoveOutcome, FsError> {
        auth.require_file().map_err(FsError::from)?;

        let mut outcome = BatchRemoveOutcome::default();
        for path in paths {
            match self.remove(auth, path).await {
                Ok(()) => outcome.succeeded.push(path.to_string()),
                Err(e) => outcome.failed.push(BatchFailure {
                    path: path.to_string(),
                    reason: e.kind().to_string(),
                }),
            }
        }
        Ok(outcome)
    }

    /// Copy many files. Within one storage config this is backend-side
    /// `CopyObject`; across configs the server refuses to stream and
    /// returns the item list for a client-side copy.
    pub async fn batch_copy(
        &self,
        auth: &AuthResult,
        items: &[CopyItem],
        skip_existing: bool,
    ) -> Result<BatchCopyOutcome, FsError> {
        auth.require_file().map_err(FsError::from)?;

        // One pass to detect cross-storage pairs before any copy runs.
        let mut cross: Vec<CrossStorageItem> = Vec::new();
        for item in items {
            let source = self.resolver().resolve(auth, &item.source_path).await?;
            let target = self.resolver().resolve(auth, &item.target_path).await?;
            if source.storage.id != target.storage.id {
                cross.push(CrossStorageItem {
                    source_path: item.source_path.clone(),
                    target_path: item.target_path.clone(),
                    target_mount_id: target.mount.id,
                    target_storage_config_id: target.storage.id,
                });
            }
        }
        if !cross.is_empty() {
            return Ok(BatchCopyOutcome::CrossStorage {
                requires_client_side_copy: true,
                items: cross,
            });
        }

        let mut succeeded = Vec::new();
        let mut skipped = Vec::new();
        let mut failed = Vec::new();

        for item in items {
            match self.copy_one(auth, item, skip_existing).await {
                Ok(true) => succeeded.push(item.target_path.to_string()),
                Ok(false) => skipped.push(item.target_path.to_string()),
                Err(e) => failed.push(BatchFailure {
                    path: item.source_path.to_string(),
                    reason: e.kind().to_string(),
                }),
            }
        }

        Ok(BatchCopyOutcome::Completed {
            succeeded,
            skipped,
            failed,
        })
    }

    /// Copy one item within a single storage config. Returns `Ok(false)`
    /// when the target existed and `skip_existing` asked to leave it alone.
    async fn copy_one(
        &self,
        auth: &AuthResult,
        item: &CopyItem,
        skip_existing: bool,
    ) -> Result<bool, FsError> {
        let source = self.resolver().resolve(auth, &item.source_path).await?;
        let target = self.resolver().resolve(auth, &item.target_path).await?;
        let driver = self.driver_for(&source)?;

        if self.exists(auth, &item.target_path).await? {
            if skip_existing {
                return Ok(false);
            }
            return Err(FsError::Conflict(item.target_path.to_string()));
        }

        match driver.head_object(source.file_key()).await {
            Ok(head)
                if !head
                    .content_type
                    .as_deref()
                    .map(|ct| ct.starts_with(common::mime::DIRECTORY_CONTENT_TYPE))
                    .unwrap_or(false) =>
            {
                driver
                    .copy_object(source.file_key(), target.file_key())
                    .await?;
            }
            Ok(_) | Err(s3_driver::S3DriverError::NotFound(_)) => {
                // Directory copy: replicate every key under the prefix.
                let page = driver.list_all(&source.list_prefix(), None).await?;
                if page.objects.is_empty() {
                    return Err(FsError::NotFound(item.source_path.to_string()));
                }
                let src_prefix = source.list_prefix();
                let dst_prefix = target.list_prefix();
                for obj in &page.objects {
                    if obj.key == ROOT_MARKER {
                        continue;
                    }
                    let rest = obj.key.strip_prefix(&src_prefix).unwrap_or(&obj.key);
                    driver
                        .copy_object(&obj.key, &format!("{dst_prefix}{rest}"))
                        .await?;
                }
            }
            Err(e) => return Err(e.into()),
        }

        self.after_mutation(&target, false).await?;
        Ok(true)
    }
}
