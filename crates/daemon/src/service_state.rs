//! Process-wide shared state.
//!
//! The directory cache, lock table and driver cache are singletons living
//! for the whole process; handlers reach them through cheap clones of
//! [`State`]. Credentials are decrypted once when a driver is first built
//! and stay in process memory only.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use common::prelude::{Secret, SecretError};

use crate::database::{Database, DatabaseSetupError};
use crate::fs::cache::DirectoryCache;
use crate::fs::drivers::DriverCache;
use crate::fs::streaming::StreamingConfig;
use crate::fs::FileSystem;
use crate::service_config::{AdminCredentials, Config};
use crate::webdav::locks::LockManager;

/// Grace period the shutdown hook waits for in-flight multipart aborts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct State {
    db: Database,
    admin: Arc<AdminCredentials>,
    dir_cache: Arc<DirectoryCache>,
    locks: Arc<LockManager>,
    drivers: Arc<DriverCache>,
    config: Arc<Config>,
}

impl State {
    pub async fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        let db = Database::connect(&config.database_url).await?;
        let secret = Secret::derive(&config.encryption_secret)?;

        Ok(Self {
            db,
            admin: Arc::new(config.admin_credentials()),
            dir_cache: Arc::new(DirectoryCache::new()),
            locks: Arc::new(LockManager::new()),
            drivers: Arc::new(DriverCache::new(secret)),
            config: Arc::new(config.clone()),
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn admin(&self) -> &AdminCredentials {
        &self.admin
    }

    pub fn dir_cache(&self) -> &Arc<DirectoryCache> {
        &self.dir_cache
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// An operation-level façade bound to this state.
    pub fn fs(&self) -> FileSystem {
        FileSystem::new(
            self.db.clone(),
            self.dir_cache.clone(),
            self.drivers.clone(),
            StreamingConfig {
                queue_depth: self.config.streaming_queue_depth,
                ..StreamingConfig::default()
            },
        )
    }

    /// Invalidation hook for storage-config edits and removals. The admin
    /// surface managing configs lives outside this service; it calls here
    /// so the cached driver (stale endpoint, stale credentials) is rebuilt
    /// on next use and every listing cached for a mount bound to the
    /// config is dropped at once.
    pub async fn storage_config_changed(
        &self,
        storage_config_id: &Uuid,
    ) -> Result<(), sqlx::Error> {
        self.drivers.evict(storage_config_id);

        let stale_mounts: Vec<Uuid> = self
            .db
            .list_mounts()
            .await?
            .into_iter()
            .filter(|m| m.storage_config_id == *storage_config_id)
            .map(|m| m.id)
            .collect();
        if !stale_mounts.is_empty() {
            self.dir_cache.invalidate_mounts(stale_mounts);
        }
        Ok(())
    }

    /// Flush caches and give spawned multipart aborts a moment to settle.
    /// Called once after the servers have drained.
    pub async fn shutdown(&self) {
        self.dir_cache.invalidate_all();
        let swept = self.locks.sweep();
        if swept > 0 {
            tracing::debug!(swept, "released expired locks at shutdown");
        }
        tokio::time::sleep(SHUTDOWN_GRACE).await;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("database setup failed: {0}")]
    Database(#[from] DatabaseSetupError),

    #[error("invalid encryption secret: {0}")]
    Secret(#[from] SecretError),
}
