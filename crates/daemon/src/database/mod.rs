mod api_key_queries;
mod dir_mtime_queries;
mod models;
mod mount_queries;
mod settings_queries;
mod shared_file_queries;
mod storage_config_queries;

use std::ops::Deref;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub use models::{
    ApiKeyRecord, MountRecord, SharedFileRecord, SharedFileStatus, StorageConfigRecord,
};
pub use settings_queries::{UploadMode, WEBDAV_UPLOAD_MODE_KEY};
pub use storage_config_queries::NewStorageConfig;

#[derive(Clone, Debug)]
pub struct Database(SqlitePool);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS principals (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS api_keys (
    id TEXT PRIMARY KEY,
    principal_id TEXT REFERENCES principals (id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    secret TEXT NOT NULL UNIQUE,
    permissions TEXT NOT NULL DEFAULT '',
    basic_path TEXT NOT NULL DEFAULT '/',
    expires_at TEXT,
    last_used TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS storage_configs (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    provider_type TEXT NOT NULL DEFAULT 'generic',
    endpoint TEXT,
    region TEXT NOT NULL DEFAULT 'us-east-1',
    bucket TEXT NOT NULL,
    access_key_sealed TEXT NOT NULL,
    secret_key_sealed TEXT NOT NULL,
    path_style INTEGER NOT NULL DEFAULT 0,
    root_prefix TEXT NOT NULL DEFAULT '',
    default_signed_ttl INTEGER NOT NULL DEFAULT 3600,
    total_capacity_bytes INTEGER,
    cache_ttl_seconds INTEGER NOT NULL DEFAULT 300,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS mounts (
    id TEXT PRIMARY KEY,
    mount_path TEXT NOT NULL,
    storage_config_id TEXT NOT NULL REFERENCES storage_configs (id) ON DELETE CASCADE,
    web_proxy INTEGER NOT NULL DEFAULT 0,
    cache_ttl_seconds INTEGER NOT NULL DEFAULT 0,
    last_used_at TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_mounts_path ON mounts (mount_path);

CREATE TABLE IF NOT EXISTS shared_files (
    id TEXT PRIMARY KEY,
    object_key TEXT NOT NULL,
    storage_config_id TEXT NOT NULL REFERENCES storage_configs (id) ON DELETE CASCADE,
    mount_id TEXT REFERENCES mounts (id) ON DELETE SET NULL,
    target_path TEXT,
    filename TEXT NOT NULL,
    mimetype TEXT NOT NULL,
    size INTEGER,
    etag TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    created_by TEXT,
    created_at TEXT NOT NULL,
    committed_at TEXT
);

CREATE TABLE IF NOT EXISTS dir_mtimes (
    mount_id TEXT NOT NULL REFERENCES mounts (id) ON DELETE CASCADE,
    dir_path TEXT NOT NULL,
    modified_at TEXT NOT NULL,
    PRIMARY KEY (mount_id, dir_path)
);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT NOT NULL PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

impl Database {
    /// Connect to the metadata store and bring the schema up to date.
    ///
    /// `sqlite::memory:` is accepted for tests and throwaway setups.
    pub async fn connect(database_url: &str) -> Result<Self, DatabaseSetupError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(DatabaseSetupError::Unavailable)?
            .create_if_missing(true)
            .foreign_keys(true);

        // A pooled in-memory database would give every connection its own
        // empty store; pin it to one connection.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            16
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(DatabaseSetupError::Unavailable)?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(DatabaseSetupError::MigrationFailed)?;

        Ok(Database(pool))
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self(pool)
    }

    /// Liveness probe for the readiness endpoint.
    pub async fn is_ready(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.0).await.is_ok()
    }
}

impl Deref for Database {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseSetupError {
    #[error("error occurred while attempting database migration: {0}")]
    MigrationFailed(sqlx::Error),

    #[error("unable to perform initial connection and check of the database: {0}")]
    Unavailable(sqlx::Error),
}
