use time::OffsetDateTime;
use uuid::Uuid;

use super::models::{StorageConfigRecord, StorageConfigRow};
use super::Database;

/// Field bundle for creating a storage config; the caller has already
/// sealed the credentials.
#[derive(Debug, Clone)]
pub struct NewStorageConfig {
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
}

impl Database {
    pub async fn get_storage_config(
        &self,
        id: &Uuid,
    ) -> Result<Option<StorageConfigRecord>, sqlx::Error> {
        let row = sqlx::query_as::<_, StorageConfigRow>(
            r#"
            SELECT id, name, provider_type, endpoint, region, bucket,
                   access_key_sealed, secret_key_sealed, path_style, root_prefix,
                   default_signed_ttl, total_capacity_bytes, cache_ttl_seconds, created_at
            FROM storage_configs
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&**self)
        .await?;

        Ok(row.map(StorageConfigRecord::from))
    }

    pub async fn list_storage_configs(&self) -> Result<Vec<StorageConfigRecord>, sqlx::Error> {
        let rows = sqlx::query_as::<_, StorageConfigRow>(
            r#"
            SELECT id, name, provider_type, endpoint, region, bucket,
                   access_key_sealed, secret_key_sealed, path_style, root_prefix,
                   default_signed_ttl, total_capacity_bytes, cache_ttl_seconds, created_at
            FROM storage_configs
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&**self)
        .await?;

        Ok(rows.into_iter().map(StorageConfigRecord::from).collect())
    }

    pub async fn create_storage_config(
        &self,
        new: NewStorageConfig,
    ) -> Result<StorageConfigRecord, sqlx::Error> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        sqlx::query(
            r#"
            INSERT INTO storage_configs
                (id, name, provider_type, endpoint, region, bucket,
                 access_key_sealed, secret_key_sealed, path_style, root_prefix,
                 default_signed_ttl, total_capacity_bytes, cache_ttl_seconds, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(id.to_string())
        .bind(&new.name)
        .bind(&new.provider_type)
        .bind(&new.endpoint)
        .bind(&new.region)
        .bind(&new.bucket)
        .bind(&new.access_key_sealed)
        .bind(&new.secret_key_sealed)
        .bind(new.path_style)
        .bind(&new.root_prefix)
        .bind(new.default_signed_ttl)
        .bind(new.total_capacity_bytes)
        .bind(new.cache_ttl_seconds)
        .bind(now)
        .execute(&**self)
        .await?;

        Ok(StorageConfigRecord {
            id,
            name: new.name,
            provider_type: new.provider_type,
            endpoint: new.endpoint,
            region: new.region,
            bucket: new.bucket,
            access_key_sealed: new.access_key_sealed,
            secret_key_sealed: new.secret_key_sealed,
            path_style: new.path_style,
            root_prefix: new.root_prefix,
            default_signed_ttl: new.default_signed_ttl,
            total_capacity_bytes: new.total_capacity_bytes,
            cache_ttl_seconds: new.cache_ttl_seconds,
            created_at: now,
        })
    }
}
