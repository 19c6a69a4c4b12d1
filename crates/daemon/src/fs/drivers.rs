//! Per-storage-config driver cache.
//!
//! Building an [`S3Driver`] means decrypting credentials and constructing an
//! SDK client, so drivers are built once per storage config and reused for
//! the life of the process. Plaintext credentials exist only inside the
//! constructed client, never on disk.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::prelude::Secret;
use s3_driver::{ConnectionConfig, S3Driver};
use uuid::Uuid;

use crate::database::StorageConfigRecord;
use crate::fs::error::FsError;

pub struct DriverCache {
    secret: Secret,
    inner: Mutex<HashMap<Uuid, Arc<S3Driver>>>,
}

impl DriverCache {
    pub fn new(secret: Secret) -> Self {
        Self {
            secret,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Driver for a storage config, building and caching it on first use.
    pub fn get_or_build(&self, config: &StorageConfigRecord) -> Result<Arc<S3Driver>, FsError> {
        if let Some(driver) = self.inner.lock().expect("driver cache poisoned").get(&config.id) {
            return Ok(driver.clone());
        }

        let access_key = self
            .secret
            .decrypt_str(&config.access_key_sealed)
            .map_err(|e| FsError::Internal(format!("cannot unseal credentials: {e}")))?;
        let secret_key = self
            .secret
            .decrypt_str(&config.secret_key_sealed)
            .map_err(|e| FsError::Internal(format!("cannot unseal credentials: {e}")))?;

        let driver = S3Driver::new(ConnectionConfig {
            endpoint: config.endpoint.clone(),
            region: config.region.clone(),
            bucket: config.bucket.clone(),
            access_key,
            secret_key,
            path_style: config.path_style,
            provider: config.provider(),
            default_signed_ttl: Duration::from_secs(config.default_signed_ttl.max(0) as u64),
        })
        .map(Arc::new)?;

        self.inner
            .lock()
            .expect("driver cache poisoned")
            .insert(config.id, driver.clone());

        tracing::info!(
            storage_config = %config.id,
            bucket = %config.bucket,
            provider = %config.provider(),
            "built storage driver"
        );

        Ok(driver)
    }

    /// Drop a cached driver, e.g. after its config changed.
    pub fn evict(&self, config_id: &Uuid) {
        self.inner
            .lock()
            .expect("driver cache poisoned")
            .remove(config_id);
    }
}
