//! Driver connection configuration.

use std::time::Duration;

use crate::provider::ProviderKind;

/// Everything needed to build one [`crate::S3Driver`].
///
/// Credentials arrive here already decrypted; the metadata store only ever
/// holds the sealed form.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Custom endpoint URL; `None` means the AWS default for the region.
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    /// Path-style addressing (`endpoint/bucket/key`) instead of
    /// virtual-host style. Required by most self-hosted services.
    pub path_style: bool,
    pub provider: ProviderKind,
    /// Expiry applied to presigned URLs when the caller does not override.
    pub default_signed_ttl: Duration,
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.bucket.is_empty() {
            return Err("bucket must not be empty".to_string());
        }
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err("credentials must not be empty".to_string());
        }
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(format!("endpoint must be an http(s) URL: {endpoint}"));
            }
        }
        Ok(())
    }
}
