use time::OffsetDateTime;
use uuid::Uuid;

use super::models::{SharedFileRecord, SharedFileRow, SharedFileStatus};
use super::Database;

const SHARED_FILE_COLUMNS: &str = r#"
    id, object_key, storage_config_id, mount_id, target_path, filename,
    mimetype, size, etag, status, created_by, created_at, committed_at
"#;

impl Database {
    /// Record a presigned PUT that has been issued but not yet confirmed.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_pending_shared_file(
        &self,
        object_key: &str,
        storage_config_id: &Uuid,
        mount_id: Option<&Uuid>,
        target_path: Option<&str>,
        filename: &str,
        mimetype: &str,
        created_by: Option<&str>,
    ) -> Result<SharedFileRecord, sqlx::Error> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        sqlx::query(
            r#"
            INSERT INTO shared_files
                (id, object_key, storage_config_id, mount_id, target_path,
                 filename, mimetype, status, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(id.to_string())
        .bind(object_key)
        .bind(storage_config_id.to_string())
        .bind(mount_id.map(|m| m.to_string()))
        .bind(target_path)
        .bind(filename)
        .bind(mimetype)
        .bind(SharedFileStatus::Pending.as_str())
        .bind(created_by)
        .bind(now)
        .execute(&**self)
        .await?;

        Ok(SharedFileRecord {
            id,
            object_key: object_key.to_string(),
            storage_config_id: *storage_config_id,
            mount_id: mount_id.copied(),
            target_path: target_path.map(str::to_string),
            filename: filename.to_string(),
            mimetype: mimetype.to_string(),
            size: None,
            etag: None,
            status: SharedFileStatus::Pending,
            created_by: created_by.map(str::to_string),
            created_at: now,
            committed_at: None,
        })
    }

    pub async fn get_shared_file(
        &self,
        id: &Uuid,
    ) -> Result<Option<SharedFileRecord>, sqlx::Error> {
        let row = sqlx::query_as::<_, SharedFileRow>(&format!(
            "SELECT {SHARED_FILE_COLUMNS} FROM shared_files WHERE id = ?1"
        ))
        .bind(id.to_string())
        .fetch_optional(&**self)
        .await?;

        Ok(row.map(SharedFileRecord::from))
    }

    /// Mark an upload as committed, recording whatever the client could
    /// observe of the final object.
    pub async fn commit_shared_file(
        &self,
        id: &Uuid,
        etag: Option<&str>,
        size: Option<i64>,
    ) -> Result<Option<SharedFileRecord>, sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE shared_files
            SET status = ?1, etag = ?2, size = ?3, committed_at = ?4
            WHERE id = ?5
            "#,
        )
        .bind(SharedFileStatus::Committed.as_str())
        .bind(etag)
        .bind(size)
        .bind(OffsetDateTime::now_utc())
        .bind(id.to_string())
        .execute(&**self)
        .await?;

        self.get_shared_file(id).await
    }

    pub async fn delete_shared_file(&self, id: &Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM shared_files WHERE id = ?1")
            .bind(id.to_string())
            .execute(&**self)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
