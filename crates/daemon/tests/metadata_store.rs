//! Metadata store round trips: sealed credentials, settings, shared files,
//! directory mtimes.

mod common;

use time::OffsetDateTime;
use uuid::Uuid;

use ::common::prelude::Secret;
use stowage_daemon::database::{SharedFileStatus, UploadMode};

use crate::common as harness;

#[tokio::test]
async fn test_storage_config_roundtrip_with_sealed_credentials() {
    let (state, _dir) = harness::setup_state().await;
    let db = state.database();

    let created = harness::seed_storage(db, "primary", "tenant").await;
    let loaded = db.get_storage_config(&created.id).await.unwrap().unwrap();

    assert_eq!(loaded.bucket, "primary-bucket");
    assert_eq!(loaded.root_prefix, "tenant");
    // Never stored in the clear, but recoverable under the process secret.
    assert_ne!(loaded.access_key_sealed, "test-access-key");
    let secret = Secret::derive(harness::ENCRYPTION_SECRET).unwrap();
    assert_eq!(
        secret.decrypt_str(&loaded.access_key_sealed).unwrap(),
        "test-access-key"
    );
}

#[tokio::test]
async fn test_mount_listing_orders_longest_first() {
    let (state, _dir) = harness::setup_state().await;
    let db = state.database();
    let storage = harness::seed_storage(db, "primary", "").await;

    harness::seed_mount(db, "/a", &storage.id, false).await;
    harness::seed_mount(db, "/a/deep/nested", &storage.id, false).await;
    harness::seed_mount(db, "/a/deep", &storage.id, false).await;

    let mounts = db.list_mounts().await.unwrap();
    let paths: Vec<&str> = mounts.iter().map(|m| m.mount_path.as_str()).collect();
    assert_eq!(paths, vec!["/a/deep/nested", "/a/deep", "/a"]);
}

#[tokio::test]
async fn test_webdav_upload_mode_setting() {
    let (state, _dir) = harness::setup_state().await;
    let db = state.database();

    // Default when unset.
    assert_eq!(db.webdav_upload_mode().await.unwrap(), UploadMode::Multipart);

    db.set_setting("webdav_upload_mode", "direct").await.unwrap();
    assert_eq!(db.webdav_upload_mode().await.unwrap(), UploadMode::Direct);

    db.set_setting("webdav_upload_mode", "garbage").await.unwrap();
    assert_eq!(db.webdav_upload_mode().await.unwrap(), UploadMode::Multipart);
}

#[tokio::test]
async fn test_shared_file_commit_flow() {
    let (state, _dir) = harness::setup_state().await;
    let db = state.database();
    let storage = harness::seed_storage(db, "primary", "").await;
    let mount = harness::seed_mount(db, "/m", &storage.id, false).await;

    let pending = db
        .create_pending_shared_file(
            "docs/report.pdf",
            &storage.id,
            Some(&mount.id),
            Some("/m/docs/report.pdf"),
            "report.pdf",
            "application/pdf",
            None,
        )
        .await
        .unwrap();
    assert_eq!(pending.status, SharedFileStatus::Pending);
    assert!(pending.etag.is_none());

    let committed = db
        .commit_shared_file(&pending.id, Some("\"abc123\""), Some(1024))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(committed.status, SharedFileStatus::Committed);
    assert_eq!(committed.etag.as_deref(), Some("\"abc123\""));
    assert_eq!(committed.size, Some(1024));
    assert!(committed.committed_at.is_some());

    // Commit without etag is allowed (CORS-stripped uploads).
    let pending2 = db
        .create_pending_shared_file(
            "docs/b.bin",
            &storage.id,
            Some(&mount.id),
            None,
            "b.bin",
            "application/octet-stream",
            None,
        )
        .await
        .unwrap();
    let committed2 = db
        .commit_shared_file(&pending2.id, None, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(committed2.status, SharedFileStatus::Committed);
    assert!(committed2.etag.is_none());
}

#[tokio::test]
async fn test_storage_config_change_drops_bound_mount_listings() {
    use std::sync::Arc;
    use std::time::Duration;

    use ::common::prelude::VirtualPath;
    use stowage_daemon::fs::cache::CacheKey;
    use stowage_daemon::fs::entry::DirectoryListing;

    let (state, _dir) = harness::setup_state().await;
    let db = state.database();

    let edited = harness::seed_storage(db, "edited", "").await;
    let untouched = harness::seed_storage(db, "untouched", "").await;
    let edited_mount = harness::seed_mount(db, "/edited", &edited.id, false).await;
    let untouched_mount = harness::seed_mount(db, "/untouched", &untouched.id, false).await;

    let ttl = Duration::from_secs(300);
    let listing = |path: &str| {
        Arc::new(DirectoryListing {
            path: VirtualPath::parse(path).unwrap(),
            entries: Vec::new(),
            refreshed_at: OffsetDateTime::now_utc(),
        })
    };
    let key = |mount_id, sub_path: &str| CacheKey {
        mount_id,
        sub_path: sub_path.to_string(),
        principal_class: "admin".to_string(),
    };

    state
        .dir_cache()
        .put(key(edited_mount.id, "docs"), listing("/edited/docs"), ttl);
    state.dir_cache().put(
        key(untouched_mount.id, "docs"),
        listing("/untouched/docs"),
        ttl,
    );

    state.storage_config_changed(&edited.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(state.dir_cache().get(&key(edited_mount.id, "docs")).is_none());
    assert!(state
        .dir_cache()
        .get(&key(untouched_mount.id, "docs"))
        .is_some());
}

#[tokio::test]
async fn test_dir_mtime_stamping() {
    let (state, _dir) = harness::setup_state().await;
    let db = state.database();
    let storage = harness::seed_storage(db, "primary", "").await;
    let mount = harness::seed_mount(db, "/m", &storage.id, false).await;

    let t1 = OffsetDateTime::now_utc();
    db.stamp_dir_mtimes(
        &mount.id,
        &["".to_string(), "a".to_string(), "a/b".to_string()],
        t1,
    )
    .await
    .unwrap();

    assert_eq!(db.get_dir_mtime(&mount.id, "a").await.unwrap(), Some(t1));
    assert_eq!(db.get_dir_mtime(&mount.id, "").await.unwrap(), Some(t1));
    assert_eq!(db.get_dir_mtime(&mount.id, "zz").await.unwrap(), None);

    // Restamping moves the time forward.
    let t2 = t1 + time::Duration::seconds(5);
    db.stamp_dir_mtimes(&mount.id, &["a".to_string()], t2)
        .await
        .unwrap();
    assert_eq!(db.get_dir_mtime(&mount.id, "a").await.unwrap(), Some(t2));
    assert_eq!(db.get_dir_mtime(&mount.id, "").await.unwrap(), Some(t1));

    let unknown_mount = Uuid::new_v4();
    assert_eq!(db.get_dir_mtime(&unknown_mount, "a").await.unwrap(), None);
}
