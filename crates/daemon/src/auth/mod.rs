//! Request authentication.
//!
//! Three credential forms arrive on the same `Authorization` header:
//! `Bearer <admin-token>`, `ApiKey <key>`, and `Basic <base64>`. For Basic,
//! a username equal to the password means the value is an API key (WebDAV
//! clients can only speak Basic); the admin username with the admin token is
//! the admin. Every request is evaluated fresh; nothing here is persisted.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use uuid::Uuid;

use common::prelude::VirtualPath;

use crate::database::ApiKeyRecord;
use crate::ServiceState;

/// Capability flags an API key may carry. Admins hold all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions {
    pub text: bool,
    pub file: bool,
    pub mount: bool,
    pub admin: bool,
}

impl Permissions {
    pub fn all() -> Self {
        Self {
            text: true,
            file: true,
            mount: true,
            admin: true,
        }
    }

    /// Parse the comma-separated flag list stored in the api_keys table.
    pub fn parse(csv: &str) -> Self {
        let mut perms = Self::default();
        for flag in csv.split(',') {
            match flag.trim() {
                "text" => perms.text = true,
                "file" => perms.file = true,
                "mount" => perms.mount = true,
                "admin" => perms.admin = true,
                _ => {}
            }
        }
        perms
    }

    pub fn to_csv(&self) -> String {
        let mut flags = Vec::new();
        if self.text {
            flags.push("text");
        }
        if self.file {
            flags.push("file");
        }
        if self.mount {
            flags.push("mount");
        }
        if self.admin {
            flags.push("admin");
        }
        flags.join(",")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    Admin,
    ApiKey,
    None,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::Admin => "admin",
            AuthType::ApiKey => "apiKey",
            AuthType::None => "none",
        }
    }
}

/// The authenticated subject of a request.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub authenticated: bool,
    pub auth_type: AuthType,
    pub principal_id: Option<Uuid>,
    pub permissions: Permissions,
    /// Every path touched by this principal must live under this prefix.
    pub allowed_prefix: VirtualPath,
    pub key_info: Option<ApiKeyRecord>,
}

impl AuthResult {
    pub fn admin() -> Self {
        Self {
            authenticated: true,
            auth_type: AuthType::Admin,
            principal_id: None,
            permissions: Permissions::all(),
            allowed_prefix: VirtualPath::root(),
            key_info: None,
        }
    }

    pub fn from_api_key(key: ApiKeyRecord) -> Self {
        Self {
            authenticated: true,
            auth_type: AuthType::ApiKey,
            principal_id: Some(key.id),
            permissions: Permissions::parse(&key.permissions),
            allowed_prefix: key.basic_path.clone(),
            key_info: Some(key),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.auth_type, AuthType::Admin)
    }

    /// Cache partitioning class: partially-visible listings must never be
    /// served across differently-scoped principals.
    pub fn principal_class(&self) -> String {
        match self.auth_type {
            AuthType::Admin => "admin".to_string(),
            AuthType::ApiKey => format!("apikey:{}", self.allowed_prefix),
            AuthType::None => "anonymous".to_string(),
        }
    }

    pub fn require_file(&self) -> Result<(), AuthError> {
        if self.permissions.file || self.permissions.admin {
            Ok(())
        } else {
            Err(AuthError::PermissionDenied("file"))
        }
    }

    pub fn require_mount(&self) -> Result<(), AuthError> {
        if self.permissions.mount || self.permissions.admin {
            Ok(())
        } else {
            Err(AuthError::PermissionDenied("mount"))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authentication required")]
    MissingCredentials,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("missing required permission: {0}")]
    PermissionDenied(&'static str),

    #[error("metadata store error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A parsed `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Bearer(String),
    ApiKey(String),
    Basic { username: String, password: String },
}

/// Parse the `Authorization` header value, if one is present and well formed.
pub fn parse_authorization(headers: &HeaderMap) -> Option<Credential> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, rest) = value.split_once(' ')?;
    let rest = rest.trim();
    if rest.is_empty() {
        return None;
    }

    match scheme.to_ascii_lowercase().as_str() {
        "bearer" => Some(Credential::Bearer(rest.to_string())),
        "apikey" => Some(Credential::ApiKey(rest.to_string())),
        "basic" => {
            let decoded = BASE64.decode(rest).ok()?;
            let decoded = String::from_utf8(decoded).ok()?;
            let (username, password) = decoded.split_once(':')?;
            Some(Credential::Basic {
                username: username.to_string(),
                password: password.to_string(),
            })
        }
        _ => None,
    }
}

/// Resolve request headers into an [`AuthResult`].
pub async fn resolve(state: &ServiceState, headers: &HeaderMap) -> Result<AuthResult, AuthError> {
    let credential = parse_authorization(headers).ok_or(AuthError::MissingCredentials)?;

    match credential {
        Credential::Bearer(token) => {
            if state.admin().matches_token(&token) {
                Ok(AuthResult::admin())
            } else {
                Err(AuthError::InvalidCredentials)
            }
        }
        Credential::ApiKey(key) => resolve_api_key(state, &key).await,
        Credential::Basic { username, password } => {
            if state.admin().matches_basic(&username, &password) {
                return Ok(AuthResult::admin());
            }
            // Identical username and password means "the key is the key".
            if username == password {
                return resolve_api_key(state, &password).await;
            }
            Err(AuthError::InvalidCredentials)
        }
    }
}

async fn resolve_api_key(state: &ServiceState, secret: &str) -> Result<AuthResult, AuthError> {
    let key = state
        .database()
        .find_api_key(secret)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    // last_used bookkeeping stays off the request path.
    let db = state.database().clone();
    let key_id = key.id;
    tokio::spawn(async move {
        if let Err(error) = db.touch_api_key(&key_id).await {
            tracing::debug!(%error, "failed to touch api key last_used");
        }
    });

    Ok(AuthResult::from_api_key(key))
}

/// Extractor wrapper so handlers can take `Auth(auth)` directly.
pub struct Auth(pub AuthResult);

#[async_trait]
impl FromRequestParts<ServiceState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServiceState,
    ) -> Result<Self, Self::Rejection> {
        let auth = resolve(state, &parts.headers).await?;
        Ok(Auth(auth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_parse_bearer() {
        let parsed = parse_authorization(&headers_with("Bearer tok123"));
        assert_eq!(parsed, Some(Credential::Bearer("tok123".to_string())));
    }

    #[test]
    fn test_parse_api_key_scheme() {
        let parsed = parse_authorization(&headers_with("ApiKey sk-abc"));
        assert_eq!(parsed, Some(Credential::ApiKey("sk-abc".to_string())));
    }

    #[test]
    fn test_parse_basic() {
        let encoded = BASE64.encode("alice:secret");
        let parsed = parse_authorization(&headers_with(&format!("Basic {encoded}")));
        assert_eq!(
            parsed,
            Some(Credential::Basic {
                username: "alice".to_string(),
                password: "secret".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_authorization(&HeaderMap::new()), None);
        assert_eq!(parse_authorization(&headers_with("Bearer ")), None);
        assert_eq!(parse_authorization(&headers_with("Basic not-base64!!")), None);
        assert_eq!(parse_authorization(&headers_with("Digest abc")), None);
    }

    #[test]
    fn test_permissions_roundtrip() {
        let perms = Permissions::parse("file, mount");
        assert!(perms.file);
        assert!(perms.mount);
        assert!(!perms.text);
        assert!(!perms.admin);
        assert_eq!(perms.to_csv(), "file,mount");
    }

    #[test]
    fn test_admin_result_is_unscoped() {
        let admin = AuthResult::admin();
        assert!(admin.is_admin());
        assert!(admin.allowed_prefix.is_root());
        assert_eq!(admin.principal_class(), "admin");
        assert!(admin.require_file().is_ok());
    }

    #[test]
    fn test_principal_class_carries_prefix() {
        let key = ApiKeyRecord {
            id: Uuid::new_v4(),
            name: "ci".to_string(),
            secret: "k".to_string(),
            permissions: "file".to_string(),
            basic_path: VirtualPath::parse("/team-a").unwrap(),
            expires_at: None,
            last_used: None,
            created_at: time::OffsetDateTime::now_utc(),
        };
        let auth = AuthResult::from_api_key(key);
        assert_eq!(auth.principal_class(), "apikey:/team-a");
        assert!(auth.require_mount().is_err());
    }
}
