use time::OffsetDateTime;
use uuid::Uuid;

use common::prelude::VirtualPath;

use super::models::{ApiKeyRecord, ApiKeyRow};
use super::Database;

impl Database {
    /// Look an API key up by its secret value.
    ///
    /// Expiry is handled lazily here: an expired row is deleted on sight and
    /// the lookup reports no key.
    pub async fn find_api_key(&self, secret: &str) -> Result<Option<ApiKeyRecord>, sqlx::Error> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            SELECT id, name, secret, permissions, basic_path,
                   expires_at, last_used, created_at
            FROM api_keys
            WHERE secret = ?1
            "#,
        )
        .bind(secret)
        .fetch_optional(&**self)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let record = ApiKeyRecord::from(row);

        if record.is_expired(OffsetDateTime::now_utc()) {
            tracing::info!(key_id = %record.id, "deleting expired api key");
            self.delete_api_key(&record.id).await?;
            return Ok(None);
        }

        Ok(Some(record))
    }

    pub async fn create_api_key(
        &self,
        name: &str,
        secret: &str,
        permissions: &str,
        basic_path: &VirtualPath,
        expires_at: Option<OffsetDateTime>,
    ) -> Result<ApiKeyRecord, sqlx::Error> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        sqlx::query(
            r#"
            INSERT INTO api_keys (id, name, secret, permissions, basic_path,
                                  expires_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(id.to_string())
        .bind(name)
        .bind(secret)
        .bind(permissions)
        .bind(basic_path.as_str())
        .bind(expires_at)
        .bind(now)
        .execute(&**self)
        .await?;

        Ok(ApiKeyRecord {
            id,
            name: name.to_string(),
            secret: secret.to_string(),
            permissions: permissions.to_string(),
            basic_path: basic_path.clone(),
            expires_at,
            last_used: None,
            created_at: now,
        })
    }

    pub async fn delete_api_key(&self, id: &Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = ?1")
            .bind(id.to_string())
            .execute(&**self)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn touch_api_key(&self, id: &Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE api_keys SET last_used = ?1 WHERE id = ?2")
            .bind(OffsetDateTime::now_utc())
            .bind(id.to_string())
            .execute(&**self)
            .await?;
        Ok(())
    }
}
