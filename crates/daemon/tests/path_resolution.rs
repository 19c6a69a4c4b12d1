//! Mount resolution integration tests against a real metadata store.

mod common;

use std::time::Duration;

use ::common::prelude::VirtualPath;

use stowage_daemon::auth::AuthResult;
use stowage_daemon::fs::error::FsError;

use crate::common as harness;

#[tokio::test]
async fn test_longest_prefix_wins() {
    let (state, _dir) = harness::setup_state().await;
    let db = state.database();

    let storage = harness::seed_storage(db, "primary", "").await;
    let outer = harness::seed_mount(db, "/data", &storage.id, false).await;
    let inner = harness::seed_mount(db, "/data/archive", &storage.id, false).await;

    let auth = AuthResult::admin();
    let fs = state.fs();

    let resolved = fs
        .resolver()
        .resolve(&auth, &VirtualPath::parse("/data/archive/2024/file.bin").unwrap())
        .await
        .unwrap();
    assert_eq!(resolved.mount.id, inner.id);
    assert_eq!(resolved.sub_path, "2024/file.bin");
    assert_eq!(resolved.object_key, "2024/file.bin");

    let resolved = fs
        .resolver()
        .resolve(&auth, &VirtualPath::parse("/data/file.bin").unwrap())
        .await
        .unwrap();
    assert_eq!(resolved.mount.id, outer.id);
    assert_eq!(resolved.sub_path, "file.bin");
}

#[tokio::test]
async fn test_equal_length_tie_goes_to_newest() {
    let (state, _dir) = harness::setup_state().await;
    let db = state.database();

    let storage = harness::seed_storage(db, "primary", "").await;
    let _older = harness::seed_mount(db, "/shared", &storage.id, false).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let newer = harness::seed_mount(db, "/shared", &storage.id, true).await;

    let auth = AuthResult::admin();
    let resolved = state
        .fs()
        .resolver()
        .resolve(&auth, &VirtualPath::parse("/shared/report.txt").unwrap())
        .await
        .unwrap();
    assert_eq!(resolved.mount.id, newer.id);
}

#[tokio::test]
async fn test_root_prefix_is_prepended() {
    let (state, _dir) = harness::setup_state().await;
    let db = state.database();

    let storage = harness::seed_storage(db, "tenanted", "tenant-7").await;
    harness::seed_mount(db, "/files", &storage.id, false).await;

    let auth = AuthResult::admin();
    let resolved = state
        .fs()
        .resolver()
        .resolve(&auth, &VirtualPath::parse("/files/docs/a.txt").unwrap())
        .await
        .unwrap();
    assert_eq!(resolved.object_key, "tenant-7/docs/a.txt");
    assert_eq!(resolved.sub_path, "docs/a.txt");

    // The mount root maps onto the bare root prefix.
    let resolved = state
        .fs()
        .resolver()
        .resolve(&auth, &VirtualPath::parse("/files").unwrap())
        .await
        .unwrap();
    assert_eq!(resolved.object_key, "tenant-7");
    assert_eq!(resolved.sub_path, "");
}

#[tokio::test]
async fn test_no_mount_is_not_found() {
    let (state, _dir) = harness::setup_state().await;
    let auth = AuthResult::admin();

    let err = state
        .fs()
        .resolver()
        .resolve(&auth, &VirtualPath::parse("/nowhere/file").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::MountNotFound(_)));
}

#[tokio::test]
async fn test_allowed_prefix_blocks_resolution() {
    let (state, _dir) = harness::setup_state().await;
    let db = state.database();

    let storage = harness::seed_storage(db, "primary", "").await;
    harness::seed_mount(db, "/team-a", &storage.id, false).await;
    harness::seed_mount(db, "/team-b", &storage.id, false).await;

    let mut auth = AuthResult::admin();
    auth.allowed_prefix = VirtualPath::parse("/team-a").unwrap();

    let err = state
        .fs()
        .resolver()
        .resolve(&auth, &VirtualPath::parse("/team-b/file").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::PathForbidden(_)));

    assert!(state
        .fs()
        .resolver()
        .resolve(&auth, &VirtualPath::parse("/team-a/file").unwrap())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_effective_cache_ttl() {
    let (state, _dir) = harness::setup_state().await;
    let db = state.database();

    // Storage says 300; a mount override of 600 wins, 0 defers to storage.
    let storage = harness::seed_storage(db, "primary", "").await;
    harness::seed_mount(db, "/quick", &storage.id, false).await;
    let auth = AuthResult::admin();

    let resolved = state
        .fs()
        .resolver()
        .resolve(&auth, &VirtualPath::parse("/quick/x").unwrap())
        .await
        .unwrap();
    assert_eq!(resolved.cache_ttl_seconds(), 300);

    db.create_mount(
        &VirtualPath::parse("/slow").unwrap(),
        &storage.id,
        false,
        600,
    )
    .await
    .unwrap();
    let resolved = state
        .fs()
        .resolver()
        .resolve(&auth, &VirtualPath::parse("/slow/x").unwrap())
        .await
        .unwrap();
    assert_eq!(resolved.cache_ttl_seconds(), 600);
}

#[tokio::test]
async fn test_virtual_parent_listing_from_mounts() {
    let (state, _dir) = harness::setup_state().await;
    let db = state.database();

    let storage = harness::seed_storage(db, "primary", "").await;
    harness::seed_mount(db, "/teams/alpha", &storage.id, false).await;
    harness::seed_mount(db, "/teams/beta", &storage.id, false).await;

    let auth = AuthResult::admin();
    // "/" and "/teams" resolve to no mount but list their virtual children.
    let listing = state
        .fs()
        .list(&auth, &VirtualPath::root())
        .await
        .unwrap();
    assert_eq!(listing.entries.len(), 1);
    assert_eq!(listing.entries[0].name, "teams");
    assert!(listing.entries[0].is_directory);

    let listing = state
        .fs()
        .list(&auth, &VirtualPath::parse("/teams").unwrap())
        .await
        .unwrap();
    let names: Vec<&str> = listing.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
}
