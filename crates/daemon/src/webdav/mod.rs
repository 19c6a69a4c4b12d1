//! WebDAV surface over the filesystem façade.
//!
//! One dispatcher handles every method under `/dav`. Authorization is Basic
//! (the password being the API key itself, or the admin credential); Bearer
//! and ApiKey schemes work too for clients that can send them. Every
//! mutating method consults the lock table before touching storage.

pub mod locks;
pub mod xml;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use bytes::Bytes;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use common::prelude::VirtualPath;

use crate::auth::{self, AuthError, AuthResult};
use crate::fs::error::FsError;
use crate::fs::FileSystem;
use crate::webdav::locks::{LockDepth, LockError, LockManager, LockScope};
use crate::webdav::xml::{
    lock_response, multistatus, parse_depth, parse_lock_tokens, parse_lockinfo, parse_timeout,
    partial_failure, proppatch_refusal, PropfindEntry,
};
use crate::ServiceState;

const DAV_PREFIX: &str = "/dav";
const ALLOWED_METHODS: &str =
    "OPTIONS, GET, HEAD, PUT, DELETE, PROPFIND, PROPPATCH, MKCOL, COPY, MOVE, LOCK, UNLOCK";

/// Characters escaped when building hrefs; `/` stays literal.
const HREF_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/", any(dispatch))
        .route("/*path", any(dispatch))
        .with_state(state)
}

fn status_only(status: StatusCode) -> Response {
    status.into_response()
}

fn xml_body(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
        body,
    )
        .into_response()
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"stowage\"")],
    )
        .into_response()
}

/// Map a façade error onto the RFC status for this surface. Internal detail
/// goes to the log under a short error id, never to the client.
fn dav_error(err: FsError) -> Response {
    if err.is_internal() {
        let error_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        tracing::error!(error_id, error = ?err, "webdav request failed");
        return (err.status(), format!("internal error (id {error_id})")).into_response();
    }
    status_only(err.status())
}

fn href_for(path: &VirtualPath, is_directory: bool) -> String {
    let encoded = utf8_percent_encode(path.as_str(), HREF_ENCODE).to_string();
    if is_directory && !encoded.ends_with('/') {
        format!("{DAV_PREFIX}{encoded}/")
    } else {
        format!("{DAV_PREFIX}{encoded}")
    }
}

fn presented_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get("if")
        .and_then(|v| v.to_str().ok())
        .map(parse_lock_tokens)
        .unwrap_or_default()
}

/// Gate a write on the lock table; `423 Locked` when a live lock is not
/// matched by a token from the `If` header.
fn check_lock(
    state: &ServiceState,
    path: &VirtualPath,
    headers: &HeaderMap,
    affects_descendants: bool,
) -> Result<(), Response> {
    let tokens = presented_tokens(headers);
    state
        .locks()
        .check(path.as_str(), &tokens, affects_descendants)
        .map_err(|e| match e {
            LockError::Conflict { path } => {
                (StatusCode::LOCKED, format!("locked: {path}")).into_response()
            }
            _ => status_only(StatusCode::LOCKED),
        })
}

async fn dispatch(State(state): State<ServiceState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    if parts.method == Method::OPTIONS {
        return options_response();
    }

    let auth = match auth::resolve(&state, &parts.headers).await {
        Ok(auth) => auth,
        Err(AuthError::MissingCredentials) | Err(AuthError::InvalidCredentials) => {
            return unauthorized()
        }
        Err(AuthError::PermissionDenied(_)) => return status_only(StatusCode::FORBIDDEN),
        Err(AuthError::Database(error)) => {
            tracing::error!(%error, "auth lookup failed");
            return status_only(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    if auth.require_file().is_err() {
        return status_only(StatusCode::FORBIDDEN);
    }

    let raw_path = parts.uri.path();
    let decoded = match percent_decode_str(raw_path).decode_utf8() {
        Ok(decoded) => decoded.to_string(),
        Err(_) => return status_only(StatusCode::BAD_REQUEST),
    };
    let path = match VirtualPath::parse(&decoded) {
        Ok(path) => path,
        Err(_) => return status_only(StatusCode::BAD_REQUEST),
    };

    let fs = state.fs();
    let headers = parts.headers;

    match parts.method.as_str() {
        "GET" => get(&fs, &auth, &path, &headers, false).await,
        "HEAD" => get(&fs, &auth, &path, &headers, true).await,
        "PROPFIND" => propfind(&fs, &auth, &path, &headers).await,
        "PROPPATCH" => proppatch(&state, &path, &headers),
        "MKCOL" => mkcol(&state, &fs, &auth, &path, &headers, body).await,
        "PUT" => put(&state, &fs, &auth, &path, &headers, body).await,
        "DELETE" => delete(&state, &fs, &auth, &path, &headers).await,
        "COPY" => copy_or_move(&state, &fs, &auth, &path, &headers, false).await,
        "MOVE" => copy_or_move(&state, &fs, &auth, &path, &headers, true).await,
        "LOCK" => lock(&state, &path, &headers, body).await,
        "UNLOCK" => unlock(&state, &path, &headers),
        "POST" => status_only(StatusCode::METHOD_NOT_ALLOWED),
        _ => status_only(StatusCode::METHOD_NOT_ALLOWED),
    }
}

/// `DAV: 1,2`: class 2 because LOCK/UNLOCK are supported. PROPFIND depth
/// `infinity` is capped to 1, which clients discover from the responses
/// themselves.
fn options_response() -> Response {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("DAV", "1,2")
        .header("MS-Author-Via", "DAV")
        .header(header::ALLOW, ALLOWED_METHODS)
        .body(Body::empty())
        .unwrap_or_else(|_| status_only(StatusCode::NO_CONTENT))
}

async fn get(
    fs: &FileSystem,
    auth: &AuthResult,
    path: &VirtualPath,
    headers: &HeaderMap,
    head_only: bool,
) -> Response {
    let entry = match fs.stat(auth, path).await {
        Ok(entry) => entry,
        Err(e) => return dav_error(e),
    };
    if entry.is_directory {
        return status_only(StatusCode::METHOD_NOT_ALLOWED);
    }

    if head_only {
        let mut builder = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, entry.mimetype.clone())
            .header(header::CONTENT_LENGTH, entry.size);
        if let Some(etag) = &entry.etag {
            builder = builder.header(header::ETAG, etag.clone());
        }
        if let Some(modified) = entry.modified {
            builder = builder.header(header::LAST_MODIFIED, xml::http_date(modified));
        }
        return builder
            .body(Body::empty())
            .unwrap_or_else(|_| status_only(StatusCode::OK));
    }

    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let object = match fs.open_object(auth, path, range).await {
        Ok(object) => object,
        Err(e) => return dav_error(e),
    };

    let status = if object.content_range.is_some() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };
    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, entry.mimetype)
        .header(header::ACCEPT_RANGES, "bytes");
    if let Some(content_range) = &object.content_range {
        builder = builder.header(header::CONTENT_RANGE, content_range.clone());
    }
    if let Some(len) = object.content_length {
        builder = builder.header(header::CONTENT_LENGTH, len);
    }
    if let Some(etag) = &object.etag {
        builder = builder.header(header::ETAG, etag.clone());
    }
    if let Some(modified) = object.last_modified {
        builder = builder.header(header::LAST_MODIFIED, xml::http_date(modified));
    }

    let stream = ReaderStream::new(object.body.into_async_read());
    builder
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| status_only(StatusCode::INTERNAL_SERVER_ERROR))
}

async fn propfind(
    fs: &FileSystem,
    auth: &AuthResult,
    path: &VirtualPath,
    headers: &HeaderMap,
) -> Response {
    // Depth: 0 stays 0; 1 and infinity both serve one level.
    let depth_header = headers.get("depth").and_then(|v| v.to_str().ok());
    let list_children = !matches!(depth_header, Some("0"));

    let own = match fs.stat(auth, path).await {
        Ok(entry) => entry,
        Err(e) => return dav_error(e),
    };

    let mut entries = vec![PropfindEntry {
        href: href_for(path, own.is_directory),
        display_name: if path.is_root() {
            "/".to_string()
        } else {
            own.name.clone()
        },
        is_directory: own.is_directory,
        size: own.size,
        modified: own.modified,
        etag: own.etag.clone(),
        content_type: own.mimetype.clone(),
    }];

    if own.is_directory && list_children {
        let listing = match fs.list(auth, path).await {
            Ok(listing) => listing,
            Err(e) => return dav_error(e),
        };
        for child in &listing.entries {
            entries.push(PropfindEntry {
                href: href_for(&child.path, child.is_directory),
                display_name: child.name.clone(),
                is_directory: child.is_directory,
                size: child.size,
                modified: child.modified,
                etag: child.etag.clone(),
                content_type: child.mimetype.clone(),
            });
        }
    }

    xml_body(StatusCode::MULTI_STATUS, multistatus(&entries))
}

fn proppatch(state: &ServiceState, path: &VirtualPath, headers: &HeaderMap) -> Response {
    if let Err(resp) = check_lock(state, path, headers, false) {
        return resp;
    }
    xml_body(
        StatusCode::MULTI_STATUS,
        proppatch_refusal(&href_for(path, false)),
    )
}

async fn mkcol(
    state: &ServiceState,
    fs: &FileSystem,
    auth: &AuthResult,
    path: &VirtualPath,
    headers: &HeaderMap,
    body: Body,
) -> Response {
    let body = match collect_body(body).await {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    if !body.is_empty() {
        // RFC 4918: a request body this server does not understand.
        return status_only(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
    if let Err(resp) = check_lock(state, path, headers, false) {
        return resp;
    }

    match fs.exists(auth, path).await {
        Ok(true) => return status_only(StatusCode::METHOD_NOT_ALLOWED),
        Ok(false) => {}
        Err(e) => return dav_error(e),
    }

    match fs.mkdir(auth, path).await {
        Ok(()) => status_only(StatusCode::CREATED),
        Err(e) => dav_error(e),
    }
}

async fn put(
    state: &ServiceState,
    fs: &FileSystem,
    auth: &AuthResult,
    path: &VirtualPath,
    headers: &HeaderMap,
    body: Body,
) -> Response {
    if let Err(resp) = check_lock(state, path, headers, false) {
        return resp;
    }

    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    // Content-Length: 0 writes the empty object directly; no multipart
    // session is ever opened for it.
    if content_length == Some(0) {
        return match fs.upload_bytes(auth, path, Bytes::new()).await {
            Ok(_) => status_only(StatusCode::CREATED),
            Err(e) => dav_error(e),
        };
    }

    let direct_eligible = match state.database().webdav_upload_mode().await {
        Ok(crate::database::UploadMode::Direct) => content_length
            .map(|len| len <= state.config().direct_upload_threshold)
            .unwrap_or(false),
        Ok(crate::database::UploadMode::Multipart) => false,
        Err(error) => {
            tracing::warn!(%error, "failed to read upload mode; streaming");
            false
        }
    };

    if direct_eligible {
        let data = match collect_body(body).await {
            Ok(data) => data,
            Err(resp) => return resp,
        };
        if let Some(declared) = content_length {
            if data.len() as u64 != declared {
                return dav_error(FsError::SizeMismatch {
                    declared,
                    actual: data.len() as u64,
                });
            }
        }
        return match fs.upload_bytes(auth, path, data).await {
            Ok(_) => status_only(StatusCode::CREATED),
            Err(e) => dav_error(e),
        };
    }

    // Chunked or large bodies stream through the bounded multipart
    // pipeline regardless of eventual size.
    let stream = body.into_data_stream();
    match fs
        .upload_streaming(auth, path, stream, content_length)
        .await
    {
        Ok(_) => status_only(StatusCode::CREATED),
        Err(e) => dav_error(e),
    }
}

async fn delete(
    state: &ServiceState,
    fs: &FileSystem,
    auth: &AuthResult,
    path: &VirtualPath,
    headers: &HeaderMap,
) -> Response {
    // Collection deletes act on the whole subtree, so descendant locks
    // gate them too.
    if let Err(resp) = check_lock(state, path, headers, true) {
        return resp;
    }
    match fs.remove(auth, path).await {
        Ok(()) => status_only(StatusCode::NO_CONTENT),
        Err(e) => dav_error(e),
    }
}

fn parse_destination(headers: &HeaderMap) -> Option<VirtualPath> {
    let raw = headers.get("destination")?.to_str().ok()?;
    let path_part = if raw.starts_with("http://") || raw.starts_with("https://") {
        let url = url::Url::parse(raw).ok()?;
        url.path().to_string()
    } else {
        raw.to_string()
    };
    let decoded = percent_decode_str(&path_part).decode_utf8().ok()?;
    let stripped = decoded
        .strip_prefix(DAV_PREFIX)
        .unwrap_or(&decoded)
        .to_string();
    VirtualPath::parse(&stripped).ok()
}

async fn copy_or_move(
    state: &ServiceState,
    fs: &FileSystem,
    auth: &AuthResult,
    source: &VirtualPath,
    headers: &HeaderMap,
    is_move: bool,
) -> Response {
    let Some(destination) = parse_destination(headers) else {
        return status_only(StatusCode::BAD_REQUEST);
    };
    let overwrite = headers
        .get("overwrite")
        .and_then(|v| v.to_str().ok())
        .map(|v| !v.eq_ignore_ascii_case("f"))
        .unwrap_or(true);

    if is_move {
        if let Err(resp) = check_lock(state, source, headers, true) {
            return resp;
        }
    }
    if let Err(resp) = check_lock(state, &destination, headers, true) {
        return resp;
    }

    let dest_existed = match fs.exists(auth, &destination).await {
        Ok(existed) => existed,
        Err(e) => return dav_error(e),
    };
    if dest_existed {
        if !overwrite {
            return status_only(StatusCode::PRECONDITION_FAILED);
        }
        if let Err(e) = fs.remove(auth, &destination).await {
            return dav_error(e);
        }
    }

    use crate::fs::batch::{BatchCopyOutcome, CopyItem};
    let items = [CopyItem {
        source_path: source.clone(),
        target_path: destination.clone(),
    }];

    let copy_outcome = match fs.batch_copy(auth, &items, false).await {
        Ok(outcome) => outcome,
        Err(e) => return dav_error(e),
    };
    match copy_outcome {
        BatchCopyOutcome::CrossStorage { .. } => {
            // The backend cannot copy across storage configs and this
            // server does not stream between buckets.
            return status_only(StatusCode::BAD_GATEWAY);
        }
        BatchCopyOutcome::Completed { failed, .. } if !failed.is_empty() => {
            let reason = failed[0].reason.clone();
            return match reason.as_str() {
                "notFound" => status_only(StatusCode::NOT_FOUND),
                "conflict" => status_only(StatusCode::PRECONDITION_FAILED),
                _ => status_only(StatusCode::BAD_GATEWAY),
            };
        }
        BatchCopyOutcome::Completed { .. } => {}
    }

    if is_move {
        // Copy-then-delete: a failed delete leaves the source in place and
        // is reported explicitly rather than silently swallowed.
        if let Err(error) = fs.remove(auth, source).await {
            tracing::warn!(source = %source, %error, "MOVE delete leg failed");
            return xml_body(
                StatusCode::MULTI_STATUS,
                partial_failure(
                    &href_for(source, false),
                    "HTTP/1.1 500 Internal Server Error",
                    "copy succeeded but the source could not be removed",
                ),
            );
        }
    }

    if dest_existed {
        status_only(StatusCode::NO_CONTENT)
    } else {
        status_only(StatusCode::CREATED)
    }
}

/// Rolls a freshly acquired lock back out of the table unless the response
/// carrying its token was actually handed off. If the request is torn down
/// first (client disconnect mid-LOCK), the token would otherwise be held by
/// nobody until it expired.
struct LockDeliveryGuard<'a> {
    locks: &'a LockManager,
    path: String,
    token: String,
    delivered: bool,
}

impl Drop for LockDeliveryGuard<'_> {
    fn drop(&mut self) {
        if self.delivered {
            return;
        }
        if let Err(error) = self.locks.release(&self.path, &self.token) {
            tracing::debug!(path = %self.path, %error, "failed to roll back undelivered lock");
        } else {
            tracing::debug!(path = %self.path, "released undelivered lock token");
        }
    }
}

async fn lock(
    state: &ServiceState,
    path: &VirtualPath,
    headers: &HeaderMap,
    body: Body,
) -> Response {
    let body = match collect_body(body).await {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    let timeout = parse_timeout(headers.get("timeout").and_then(|v| v.to_str().ok()));

    // An empty body refreshes an existing lock via the If header.
    if body.is_empty() {
        let tokens = presented_tokens(headers);
        let Some(token) = tokens.first() else {
            return status_only(StatusCode::BAD_REQUEST);
        };
        return match state.locks().refresh(path.as_str(), token, timeout) {
            Ok(entry) => xml_body(StatusCode::OK, lock_response(&entry)),
            Err(LockError::TokenMismatch(_)) => status_only(StatusCode::FORBIDDEN),
            Err(_) => status_only(StatusCode::CONFLICT),
        };
    }

    let body_text = match std::str::from_utf8(&body) {
        Ok(text) => text,
        Err(_) => return status_only(StatusCode::BAD_REQUEST),
    };
    let info = parse_lockinfo(body_text);
    let depth = parse_depth(headers.get("depth").and_then(|v| v.to_str().ok()))
        .unwrap_or(LockDepth::Infinity);
    let scope = if info.exclusive {
        LockScope::Exclusive
    } else {
        LockScope::Shared
    };

    match state
        .locks()
        .acquire(path.as_str(), info.owner, depth, scope, timeout)
    {
        Ok(entry) => {
            let mut guard = LockDeliveryGuard {
                locks: state.locks(),
                path: path.as_str().to_string(),
                token: entry.token.clone(),
                delivered: false,
            };
            let token_header = format!("<{}>", entry.token);
            let response = (
                StatusCode::OK,
                [
                    (
                        header::CONTENT_TYPE,
                        "application/xml; charset=utf-8".to_string(),
                    ),
                    (header::HeaderName::from_static("lock-token"), token_header),
                ],
                lock_response(&entry),
            )
                .into_response();
            guard.delivered = true;
            response
        }
        Err(LockError::Conflict { .. }) => status_only(StatusCode::LOCKED),
        Err(_) => status_only(StatusCode::BAD_REQUEST),
    }
}

fn unlock(state: &ServiceState, path: &VirtualPath, headers: &HeaderMap) -> Response {
    let Some(token_header) = headers.get("lock-token").and_then(|v| v.to_str().ok()) else {
        return status_only(StatusCode::BAD_REQUEST);
    };
    let tokens = parse_lock_tokens(token_header);
    let Some(token) = tokens.first() else {
        return status_only(StatusCode::BAD_REQUEST);
    };

    match state.locks().release(path.as_str(), token) {
        Ok(()) => status_only(StatusCode::NO_CONTENT),
        Err(LockError::TokenMismatch(_)) => status_only(StatusCode::FORBIDDEN),
        Err(LockError::NoSuchLock(_)) => status_only(StatusCode::CONFLICT),
        Err(LockError::Conflict { .. }) => status_only(StatusCode::CONFLICT),
    }
}

async fn collect_body(body: Body) -> Result<Bytes, Response> {
    match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => Ok(bytes),
        Err(_) => Err(status_only(StatusCode::BAD_REQUEST)),
    }
}
