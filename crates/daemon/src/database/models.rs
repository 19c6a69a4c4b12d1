//! Row and domain types for the metadata store.
//!
//! Raw rows keep ids and paths as TEXT the way SQLite stores them; the
//! public `*Record` types carry parsed `Uuid`s and canonical paths. Rows in
//! the database are trusted; a malformed id there is a corruption bug, not
//! a request error.

use common::prelude::VirtualPath;
use s3_driver::ProviderKind;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct MountRow {
    pub id: String,
    pub mount_path: String,
    pub storage_config_id: String,
    pub web_proxy: bool,
    pub cache_ttl_seconds: i64,
    pub last_used_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

/// A binding of a virtual directory to a storage configuration.
#[derive(Debug, Clone)]
pub struct MountRecord {
    pub id: Uuid,
    pub mount_path: VirtualPath,
    pub storage_config_id: Uuid,
    /// When true, downloads and previews stream through this service
    /// instead of redirecting to a presigned URL.
    pub web_proxy: bool,
    /// Listing cache TTL override; the effective TTL is the max of this and
    /// the storage config's value, and 0 on both disables caching.
    pub cache_ttl_seconds: i64,
    pub last_used_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl From<MountRow> for MountRecord {
    fn from(row: MountRow) -> Self {
        MountRecord {
            id: Uuid::parse_str(&row.id).expect("invalid mount UUID in database"),
            mount_path: VirtualPath::parse(&row.mount_path)
                .expect("invalid mount path in database"),
            storage_config_id: Uuid::parse_str(&row.storage_config_id)
                .expect("invalid storage config UUID in database"),
            web_proxy: row.web_proxy,
            cache_ttl_seconds: row.cache_ttl_seconds,
            last_used_at: row.last_used_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct StorageConfigRow {
    pub id: String,
    pub name: String,
    pub provider_type: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key_sealed: String,
    pub secret_key_sealed: String,
    pub path_style: bool,
    pub root_prefix: String,
    pub default_signed_ttl: i64,
    pub total_capacity_bytes: Option<i64>,
    pub cache_ttl_seconds: i64,
    pub created_at: OffsetDateTime,
}

/// One S3-compatible bucket and how to reach it. Credentials are sealed at
/// rest; only the driver cache ever sees them decrypted.
#[derive(Debug, Clone)]
pub struct StorageConfigRecord {
    pub id: Uuid,
    pub name: String,
    pub provider_type: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key_sealed: String,
    pub secret_key_sealed: String,
    pub path_style: bool,
    /// Key prefix transparently prepended to every object key.
    pub root_prefix: String,
    pub default_signed_ttl: i64,
    /// Hard usage cap in bytes; `None` means unlimited.
    pub total_capacity_bytes: Option<i64>,
    pub cache_ttl_seconds: i64,
    pub created_at: OffsetDateTime,
}

impl StorageConfigRecord {
    pub fn provider(&self) -> ProviderKind {
        ProviderKind::parse(&self.provider_type)
    }
}

impl From<StorageConfigRow> for StorageConfigRecord {
    fn from(row: StorageConfigRow) -> Self {
        StorageConfigRecord {
            id: Uuid::parse_str(&row.id).expect("invalid storage config UUID in database"),
            name: row.name,
            provider_type: row.provider_type,
            endpoint: row.endpoint,
            region: row.region,
            bucket: row.bucket,
            access_key_sealed: row.access_key_sealed,
            secret_key_sealed: row.secret_key_sealed,
            path_style: row.path_style,
            root_prefix: row.root_prefix,
            default_signed_ttl: row.default_signed_ttl,
            total_capacity_bytes: row.total_capacity_bytes,
            cache_ttl_seconds: row.cache_ttl_seconds,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ApiKeyRow {
    pub id: String,
    pub name: String,
    pub secret: String,
    pub permissions: String,
    pub basic_path: String,
    pub expires_at: Option<OffsetDateTime>,
    pub last_used: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

/// An API key principal with its capability flags and path scope.
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub name: String,
    pub secret: String,
    /// Comma-separated capability flags as stored; parsed by the auth layer.
    pub permissions: String,
    /// The key may only operate under this virtual path prefix.
    pub basic_path: VirtualPath,
    pub expires_at: Option<OffsetDateTime>,
    pub last_used: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl ApiKeyRecord {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

impl From<ApiKeyRow> for ApiKeyRecord {
    fn from(row: ApiKeyRow) -> Self {
        ApiKeyRecord {
            id: Uuid::parse_str(&row.id).expect("invalid api key UUID in database"),
            name: row.name,
            secret: row.secret,
            permissions: row.permissions,
            basic_path: VirtualPath::parse(&row.basic_path)
                .expect("invalid api key basic path in database"),
            expires_at: row.expires_at,
            last_used: row.last_used,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedFileStatus {
    Pending,
    Committed,
}

impl SharedFileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SharedFileStatus::Pending => "pending",
            SharedFileStatus::Committed => "committed",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "committed" => SharedFileStatus::Committed,
            _ => SharedFileStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct SharedFileRow {
    pub id: String,
    pub object_key: String,
    pub storage_config_id: String,
    pub mount_id: Option<String>,
    pub target_path: Option<String>,
    pub filename: String,
    pub mimetype: String,
    pub size: Option<i64>,
    pub etag: Option<String>,
    pub status: String,
    pub created_by: Option<String>,
    pub created_at: OffsetDateTime,
    pub committed_at: Option<OffsetDateTime>,
}

/// A client-direct (presigned) upload being tracked from issue to commit.
#[derive(Debug, Clone)]
pub struct SharedFileRecord {
    pub id: Uuid,
    pub object_key: String,
    pub storage_config_id: Uuid,
    pub mount_id: Option<Uuid>,
    pub target_path: Option<String>,
    pub filename: String,
    pub mimetype: String,
    pub size: Option<i64>,
    pub etag: Option<String>,
    pub status: SharedFileStatus,
    pub created_by: Option<String>,
    pub created_at: OffsetDateTime,
    pub committed_at: Option<OffsetDateTime>,
}

impl From<SharedFileRow> for SharedFileRecord {
    fn from(row: SharedFileRow) -> Self {
        SharedFileRecord {
            id: Uuid::parse_str(&row.id).expect("invalid shared file UUID in database"),
            object_key: row.object_key,
            storage_config_id: Uuid::parse_str(&row.storage_config_id)
                .expect("invalid storage config UUID in database"),
            mount_id: row
                .mount_id
                .map(|m| Uuid::parse_str(&m).expect("invalid mount UUID in database")),
            target_path: row.target_path,
            filename: row.filename,
            mimetype: row.mimetype,
            size: row.size,
            etag: row.etag,
            status: SharedFileStatus::parse(&row.status),
            created_by: row.created_by,
            created_at: row.created_at,
            committed_at: row.committed_at,
        }
    }
}
