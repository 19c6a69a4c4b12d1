//! Credential resolution against the metadata store.

mod common;

use axum::http::{header, HeaderMap, HeaderValue};
use time::{Duration, OffsetDateTime};

use stowage_daemon::auth::{self, AuthError, AuthType};

use crate::common as harness;

fn headers_with(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    headers
}

#[tokio::test]
async fn test_bearer_admin_token() {
    let (state, _dir) = harness::setup_state().await;

    let auth = auth::resolve(
        &state,
        &headers_with(&format!("Bearer {}", harness::ADMIN_TOKEN)),
    )
    .await
    .unwrap();
    assert_eq!(auth.auth_type, AuthType::Admin);
    assert!(auth.allowed_prefix.is_root());
    assert!(auth.permissions.admin);

    let err = auth::resolve(&state, &headers_with("Bearer wrong-token"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn test_api_key_scheme() {
    let (state, _dir) = harness::setup_state().await;
    harness::seed_api_key(state.database(), "sk-test-1", "file,text", "/team-a", None).await;

    let auth = auth::resolve(&state, &headers_with("ApiKey sk-test-1"))
        .await
        .unwrap();
    assert_eq!(auth.auth_type, AuthType::ApiKey);
    assert_eq!(auth.allowed_prefix.as_str(), "/team-a");
    assert!(auth.permissions.file);
    assert!(!auth.permissions.mount);
    assert!(auth.require_file().is_ok());
    assert!(auth.require_mount().is_err());
}

#[tokio::test]
async fn test_basic_key_as_both_fields() {
    let (state, _dir) = harness::setup_state().await;
    harness::seed_api_key(state.database(), "sk-basic", "file", "/", None).await;

    let auth = auth::resolve(
        &state,
        &headers_with(&harness::basic_auth_header("sk-basic", "sk-basic")),
    )
    .await
    .unwrap();
    assert_eq!(auth.auth_type, AuthType::ApiKey);

    // Mismatched username/password that is not the admin pair is refused.
    let err = auth::resolve(
        &state,
        &headers_with(&harness::basic_auth_header("sk-basic", "other")),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn test_basic_admin_pair() {
    let (state, _dir) = harness::setup_state().await;

    let auth = auth::resolve(
        &state,
        &headers_with(&harness::basic_auth_header(
            harness::ADMIN_USERNAME,
            harness::ADMIN_TOKEN,
        )),
    )
    .await
    .unwrap();
    assert_eq!(auth.auth_type, AuthType::Admin);
}

#[tokio::test]
async fn test_expired_key_is_lazily_deleted() {
    let (state, _dir) = harness::setup_state().await;
    let db = state.database();
    harness::seed_api_key(
        db,
        "sk-expired",
        "file",
        "/",
        Some(OffsetDateTime::now_utc() - Duration::hours(1)),
    )
    .await;

    let err = auth::resolve(&state, &headers_with("ApiKey sk-expired"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));

    // The evaluation deleted the row, not just refused it.
    assert!(db.find_api_key("sk-expired").await.unwrap().is_none());
}

#[tokio::test]
async fn test_missing_credentials() {
    let (state, _dir) = harness::setup_state().await;
    let err = auth::resolve(&state, &HeaderMap::new()).await.unwrap_err();
    assert!(matches!(err, AuthError::MissingCredentials));
}
