//! JSON API surface tests for the paths that stop before object storage.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::Value;
use tower::util::ServiceExt;

use crate::common as harness;

async fn router(state: &stowage_daemon::ServiceState) -> axum::Router {
    let config = harness::test_config(std::path::Path::new("/tmp"));
    stowage_daemon::http_server::build_router(&config, state.clone())
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_probes() {
    let (state, _dir) = harness::setup_state().await;
    let app = router(&state).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/_status/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/_status/readyz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_list_requires_credentials() {
    let (state, _dir) = harness::setup_state().await;
    let app = router(&state).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/fs/list?path=/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["success"], Value::Bool(false));
    assert_eq!(body["code"], 401);
}

#[tokio::test]
async fn test_scoped_key_cannot_list_foreign_prefix() {
    let (state, _dir) = harness::setup_state().await;
    let db = state.database();
    let storage = harness::seed_storage(db, "primary", "").await;
    harness::seed_mount(db, "/team-a", &storage.id, false).await;
    harness::seed_mount(db, "/team-b", &storage.id, false).await;
    harness::seed_api_key(db, "sk-team-a", "file", "/team-a", None).await;

    let app = router(&state).await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/fs/list?path=/team-b/")
                .header(header::AUTHORIZATION, "ApiKey sk-team-a")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["success"], Value::Bool(false));
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("pathForbidden"));
}

#[tokio::test]
async fn test_admin_lists_virtual_root() {
    let (state, _dir) = harness::setup_state().await;
    let db = state.database();
    let storage = harness::seed_storage(db, "primary", "").await;
    harness::seed_mount(db, "/media", &storage.id, true).await;

    let app = router(&state).await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/fs/list?path=/")
                .header(
                    header::AUTHORIZATION,
                    format!("Bearer {}", harness::ADMIN_TOKEN),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], Value::Bool(true));
    let entries = body["data"]["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["name"], "media");
    assert_eq!(entries[0]["isDirectory"], Value::Bool(true));
}

#[tokio::test]
async fn test_search_rejects_short_query() {
    let (state, _dir) = harness::setup_state().await;
    let app = router(&state).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/fs/search?q=a")
                .header(
                    header::AUTHORIZATION,
                    format!("Bearer {}", harness::ADMIN_TOKEN),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_path_is_rejected_at_the_edge() {
    let (state, _dir) = harness::setup_state().await;
    let app = router(&state).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/fs/list?path=/a/../b")
                .header(
                    header::AUTHORIZATION,
                    format!("Bearer {}", harness::ADMIN_TOKEN),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["message"].as_str().unwrap().starts_with("invalidPath"));
}

#[tokio::test]
async fn test_unknown_route_envelope() {
    let (state, _dir) = harness::setup_state().await;
    let app = router(&state).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/fs/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["code"], 404);
    assert_eq!(body["success"], Value::Bool(false));
}

#[tokio::test]
async fn test_rename_across_mounts_is_rejected() {
    let (state, _dir) = harness::setup_state().await;
    let db = state.database();
    let storage = harness::seed_storage(db, "primary", "").await;
    harness::seed_mount(db, "/m1", &storage.id, false).await;
    harness::seed_mount(db, "/m2", &storage.id, false).await;

    let app = router(&state).await;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/fs/rename")
                .header(
                    header::AUTHORIZATION,
                    format!("Bearer {}", harness::ADMIN_TOKEN),
                )
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"oldPath":"/m1/a.txt","newPath":"/m2/a.txt"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("crossMountRename"));
}
