use time::OffsetDateTime;
use uuid::Uuid;

use common::prelude::VirtualPath;

use super::models::{MountRecord, MountRow};
use super::Database;

impl Database {
    /// All mounts, ordered so that longest-prefix resolution can scan them
    /// front to back: deeper paths first, newest first within equal depth.
    pub async fn list_mounts(&self) -> Result<Vec<MountRecord>, sqlx::Error> {
        let rows = sqlx::query_as::<_, MountRow>(
            r#"
            SELECT id, mount_path, storage_config_id, web_proxy,
                   cache_ttl_seconds, last_used_at, created_at
            FROM mounts
            ORDER BY LENGTH(mount_path) DESC, created_at DESC
            "#,
        )
        .fetch_all(&**self)
        .await?;

        Ok(rows.into_iter().map(MountRecord::from).collect())
    }

    pub async fn get_mount(&self, id: &Uuid) -> Result<Option<MountRecord>, sqlx::Error> {
        let row = sqlx::query_as::<_, MountRow>(
            r#"
            SELECT id, mount_path, storage_config_id, web_proxy,
                   cache_ttl_seconds, last_used_at, created_at
            FROM mounts
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&**self)
        .await?;

        Ok(row.map(MountRecord::from))
    }

    pub async fn create_mount(
        &self,
        mount_path: &VirtualPath,
        storage_config_id: &Uuid,
        web_proxy: bool,
        cache_ttl_seconds: i64,
    ) -> Result<MountRecord, sqlx::Error> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        sqlx::query(
            r#"
            INSERT INTO mounts (id, mount_path, storage_config_id, web_proxy,
                                cache_ttl_seconds, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(id.to_string())
        .bind(mount_path.as_str())
        .bind(storage_config_id.to_string())
        .bind(web_proxy)
        .bind(cache_ttl_seconds)
        .bind(now)
        .execute(&**self)
        .await?;

        Ok(MountRecord {
            id,
            mount_path: mount_path.clone(),
            storage_config_id: *storage_config_id,
            web_proxy,
            cache_ttl_seconds,
            last_used_at: None,
            created_at: now,
        })
    }

    pub async fn delete_mount(&self, id: &Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM mounts WHERE id = ?1")
            .bind(id.to_string())
            .execute(&**self)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fire-and-forget bookkeeping; callers spawn this off the request path.
    pub async fn touch_mount(&self, id: &Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE mounts SET last_used_at = ?1 WHERE id = ?2")
            .bind(OffsetDateTime::now_utc())
            .bind(id.to_string())
            .execute(&**self)
            .await?;
        Ok(())
    }
}
