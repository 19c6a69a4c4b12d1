//! Shared harness for daemon integration tests.
//!
//! Tests run against a file-backed SQLite store in a temp directory; the
//! pieces under test here (auth, resolution, locks, the HTTP surface's
//! non-storage paths) never reach a real bucket.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::str::FromStr;

use tempfile::TempDir;
use time::OffsetDateTime;
use uuid::Uuid;

use ::common::prelude::{Secret, VirtualPath};
use stowage_daemon::database::{Database, MountRecord, NewStorageConfig, StorageConfigRecord};
use stowage_daemon::{ServiceConfig, ServiceState};

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_TOKEN: &str = "test-admin-token";
pub const ENCRYPTION_SECRET: &str = "test-encryption-secret";

pub fn test_config(dir: &std::path::Path) -> ServiceConfig {
    ServiceConfig {
        listen_addr: SocketAddr::from_str("127.0.0.1:0").unwrap(),
        database_url: format!("sqlite://{}/stowage-test.db", dir.display()),
        encryption_secret: ENCRYPTION_SECRET.to_string(),
        admin_username: ADMIN_USERNAME.to_string(),
        admin_token: ADMIN_TOKEN.to_string(),
        log_level: tracing::Level::WARN,
        log_dir: None,
        direct_upload_threshold: 5 * 1024 * 1024,
        streaming_queue_depth: 2,
        body_limit: 64 * 1024 * 1024,
    }
}

pub async fn setup_state() -> (ServiceState, TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = test_config(dir.path());
    let state = ServiceState::from_config(&config)
        .await
        .expect("create service state");
    (state, dir)
}

/// Storage config pointing at a localhost endpoint nothing listens on;
/// tests that would hit it stop at resolution or auth instead.
pub async fn seed_storage(db: &Database, name: &str, root_prefix: &str) -> StorageConfigRecord {
    let secret = Secret::derive(ENCRYPTION_SECRET).unwrap();
    db.create_storage_config(NewStorageConfig {
        name: name.to_string(),
        provider_type: "generic".to_string(),
        endpoint: Some("http://127.0.0.1:19000".to_string()),
        region: "us-east-1".to_string(),
        bucket: format!("{name}-bucket"),
        access_key_sealed: secret.encrypt_str("test-access-key").unwrap(),
        secret_key_sealed: secret.encrypt_str("test-secret-key").unwrap(),
        path_style: true,
        root_prefix: root_prefix.to_string(),
        default_signed_ttl: 3600,
        total_capacity_bytes: None,
        cache_ttl_seconds: 300,
    })
    .await
    .expect("create storage config")
}

pub async fn seed_mount(
    db: &Database,
    mount_path: &str,
    storage_config_id: &Uuid,
    web_proxy: bool,
) -> MountRecord {
    db.create_mount(
        &VirtualPath::parse(mount_path).unwrap(),
        storage_config_id,
        web_proxy,
        0,
    )
    .await
    .expect("create mount")
}

pub async fn seed_api_key(
    db: &Database,
    secret: &str,
    permissions: &str,
    basic_path: &str,
    expires_at: Option<OffsetDateTime>,
) {
    db.create_api_key(
        "test-key",
        secret,
        permissions,
        &VirtualPath::parse(basic_path).unwrap(),
        expires_at,
    )
    .await
    .expect("create api key");
}

pub fn basic_auth_header(username: &str, password: &str) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}
