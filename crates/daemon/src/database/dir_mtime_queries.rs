use std::collections::HashMap;

use time::OffsetDateTime;
use uuid::Uuid;

use super::Database;

impl Database {
    /// Stamp every directory in `dir_paths` with `modified_at`.
    ///
    /// Callers pass the full ancestor chain of a mutated path, so a reader
    /// that sees the new entry also sees a parent mtime at least as new.
    pub async fn stamp_dir_mtimes(
        &self,
        mount_id: &Uuid,
        dir_paths: &[String],
        modified_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        let mount_id = mount_id.to_string();
        for dir_path in dir_paths {
            sqlx::query(
                r#"
                INSERT INTO dir_mtimes (mount_id, dir_path, modified_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT (mount_id, dir_path)
                DO UPDATE SET modified_at = excluded.modified_at
                "#,
            )
            .bind(&mount_id)
            .bind(dir_path)
            .bind(modified_at)
            .execute(&**self)
            .await?;
        }
        Ok(())
    }

    pub async fn get_dir_mtime(
        &self,
        mount_id: &Uuid,
        dir_path: &str,
    ) -> Result<Option<OffsetDateTime>, sqlx::Error> {
        let row: Option<(OffsetDateTime,)> = sqlx::query_as(
            "SELECT modified_at FROM dir_mtimes WHERE mount_id = ?1 AND dir_path = ?2",
        )
        .bind(mount_id.to_string())
        .bind(dir_path)
        .fetch_optional(&**self)
        .await?;

        Ok(row.map(|(t,)| t))
    }

    /// Modification times for every immediate child directory of `parent`,
    /// keyed by the child's sub path. Used to decorate listing entries that
    /// only exist as common prefixes.
    pub async fn get_child_dir_mtimes(
        &self,
        mount_id: &Uuid,
        dir_paths: &[String],
    ) -> Result<HashMap<String, OffsetDateTime>, sqlx::Error> {
        let mut out = HashMap::new();
        let mount_id = mount_id.to_string();
        for dir_path in dir_paths {
            let row: Option<(OffsetDateTime,)> = sqlx::query_as(
                "SELECT modified_at FROM dir_mtimes WHERE mount_id = ?1 AND dir_path = ?2",
            )
            .bind(&mount_id)
            .bind(dir_path)
            .fetch_optional(&**self)
            .await?;
            if let Some((t,)) = row {
                out.insert(dir_path.clone(), t);
            }
        }
        Ok(out)
    }

    /// Drop all stamps for a mount; used when the mount goes away.
    pub async fn clear_dir_mtimes(&self, mount_id: &Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM dir_mtimes WHERE mount_id = ?1")
            .bind(mount_id.to_string())
            .execute(&**self)
            .await?;
        Ok(())
    }
}
