//! WebDAV method-layer tests driven through the full router.
//!
//! These exercise the lock workflow end to end: the lock gate sits in
//! front of storage, so LOCK / PUT-without-token / UNLOCK behave fully
//! without a reachable bucket.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::util::ServiceExt;

use crate::common as harness;

const LOCKINFO_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:exclusive/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
  <D:owner><D:href>mailto:tests@example.com</D:href></D:owner>
</D:lockinfo>"#;

async fn router(state: &stowage_daemon::ServiceState) -> axum::Router {
    let config = harness::test_config(std::path::Path::new("/tmp"));
    stowage_daemon::http_server::build_router(&config, state.clone())
}

fn admin_basic() -> String {
    harness::basic_auth_header(harness::ADMIN_USERNAME, harness::ADMIN_TOKEN)
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&bytes).to_string()
}

#[tokio::test]
async fn test_options_advertises_dav_class_2() {
    let (state, _dir) = harness::setup_state().await;
    let app = router(&state).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/dav/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers().get("DAV").unwrap(), "1,2");
    assert_eq!(response.headers().get("MS-Author-Via").unwrap(), "DAV");
    let allow = response.headers().get(header::ALLOW).unwrap().to_str().unwrap();
    assert!(allow.contains("PROPFIND"));
    assert!(allow.contains("LOCK"));
}

#[tokio::test]
async fn test_unauthenticated_gets_basic_challenge() {
    let (state, _dir) = harness::setup_state().await;
    let app = router(&state).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("PROPFIND")
                .uri("/dav/anything")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(challenge.starts_with("Basic"));
}

#[tokio::test]
async fn test_lock_put_unlock_workflow() {
    let (state, _dir) = harness::setup_state().await;
    let app = router(&state).await;

    // LOCK with Depth: 0, Timeout: Second-600 issues an opaque token.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("LOCK")
                .uri("/dav/x.txt")
                .header(header::AUTHORIZATION, admin_basic())
                .header("Depth", "0")
                .header("Timeout", "Second-600")
                .body(Body::from(LOCKINFO_BODY))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let token_header = response
        .headers()
        .get("lock-token")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(token_header.contains("opaquelocktoken:"));
    let body = body_string(response).await;
    assert!(body.contains("opaquelocktoken:"));
    assert!(body.contains("Second-600"));

    // PUT without the token is refused by the lock gate.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/dav/x.txt")
                .header(header::AUTHORIZATION, admin_basic())
                .body(Body::from("hello"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::LOCKED);

    // With If carrying the token the request passes the gate; it then
    // fails on resolution (no mounts seeded), proving the gate opened.
    let token = token_header.trim_matches(['<', '>']).to_string();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/dav/x.txt")
                .header(header::AUTHORIZATION, admin_basic())
                .header("If", format!("(<{token}>)"))
                .body(Body::from("hello"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // UNLOCK releases; a second UNLOCK has nothing to release.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("UNLOCK")
                .uri("/dav/x.txt")
                .header(header::AUTHORIZATION, admin_basic())
                .header("Lock-Token", format!("<{token}>"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(
            Request::builder()
                .method("UNLOCK")
                .uri("/dav/x.txt")
                .header(header::AUTHORIZATION, admin_basic())
                .header("Lock-Token", format!("<{token}>"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_mkcol_with_body_is_unsupported() {
    let (state, _dir) = harness::setup_state().await;
    let app = router(&state).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("MKCOL")
                .uri("/dav/newdir")
                .header(header::AUTHORIZATION, admin_basic())
                .body(Body::from("<unexpected/>"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_lock_refresh_needs_token() {
    let (state, _dir) = harness::setup_state().await;
    let app = router(&state).await;

    // Empty body means refresh; without an If token there is nothing to
    // refresh.
    let response = app
        .oneshot(
            Request::builder()
                .method("LOCK")
                .uri("/dav/y.txt")
                .header(header::AUTHORIZATION, admin_basic())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dot_segments_rejected() {
    let (state, _dir) = harness::setup_state().await;
    let app = router(&state).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("PROPFIND")
                .uri("/dav/a/%2E%2E/b")
                .header(header::AUTHORIZATION, admin_basic())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
