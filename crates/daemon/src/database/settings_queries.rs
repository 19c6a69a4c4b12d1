use super::Database;

/// Settings key selecting how WebDAV PUT bodies are written to storage.
pub const WEBDAV_UPLOAD_MODE_KEY: &str = "webdav_upload_mode";

/// How an incoming body reaches the object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadMode {
    /// Buffer small bodies and do a single PutObject.
    Direct,
    /// Stream through a bounded multipart pipeline.
    #[default]
    Multipart,
}

impl UploadMode {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "direct" => UploadMode::Direct,
            _ => UploadMode::Multipart,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadMode::Direct => "direct",
            UploadMode::Multipart => "multipart",
        }
    }
}

impl Database {
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&**self)
            .await?;
        Ok(row.map(|(v,)| v))
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?1, ?2)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&**self)
        .await?;
        Ok(())
    }

    pub async fn webdav_upload_mode(&self) -> Result<UploadMode, sqlx::Error> {
        Ok(self
            .get_setting(WEBDAV_UPLOAD_MODE_KEY)
            .await?
            .map(|v| UploadMode::parse(&v))
            .unwrap_or_default())
    }
}
