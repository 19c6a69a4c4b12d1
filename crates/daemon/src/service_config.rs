use std::net::SocketAddr;
use std::path::PathBuf;

/// Runtime configuration for the gateway daemon.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server listens on.
    pub listen_addr: SocketAddr,

    /// SQLite URL for the metadata store, e.g. `sqlite://stowage.db`.
    /// `sqlite::memory:` gives a throwaway store.
    pub database_url: String,

    /// Passphrase the credential-sealing key is derived from
    /// (`ENCRYPTION_SECRET`).
    pub encryption_secret: String,

    /// Admin Basic username; the admin token doubles as its password.
    pub admin_username: String,
    /// Admin bearer token.
    pub admin_token: String,

    // logging
    pub log_level: tracing::Level,
    /// Directory for rolling log files; stdout only when unset.
    pub log_dir: Option<PathBuf>,

    // upload tuning
    /// Bodies at or under this size may take the buffered direct path when
    /// the WebDAV upload mode is `direct`.
    pub direct_upload_threshold: u64,
    /// Ready parts allowed in the streaming pipeline (clamped to 1..=3).
    pub streaming_queue_depth: usize,
    /// Request body cap for the JSON/multipart API surface.
    pub body_limit: usize,
}

impl Config {
    pub fn admin_credentials(&self) -> AdminCredentials {
        AdminCredentials {
            username: self.admin_username.clone(),
            token: self.admin_token.clone(),
        }
    }
}

/// The admin credential pair checked by the auth layer.
#[derive(Debug, Clone)]
pub struct AdminCredentials {
    username: String,
    token: String,
}

impl AdminCredentials {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }

    pub fn matches_token(&self, token: &str) -> bool {
        !self.token.is_empty() && constant_time_eq(self.token.as_bytes(), token.as_bytes())
    }

    pub fn matches_basic(&self, username: &str, password: &str) -> bool {
        username == self.username && self.matches_token(password)
    }
}

/// Comparison that does not leak the matching prefix length through timing.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_credentials() {
        let admin = AdminCredentials::new("admin", "tok-123");
        assert!(admin.matches_token("tok-123"));
        assert!(!admin.matches_token("tok-124"));
        assert!(admin.matches_basic("admin", "tok-123"));
        assert!(!admin.matches_basic("root", "tok-123"));
    }

    #[test]
    fn test_empty_token_never_matches() {
        let admin = AdminCredentials::new("admin", "");
        assert!(!admin.matches_token(""));
    }
}
