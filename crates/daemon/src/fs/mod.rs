//! The filesystem façade.
//!
//! Every HTTP and WebDAV entry point funnels through [`FileSystem`]. Each
//! operation takes the caller's [`AuthResult`], resolves the virtual path
//! through the mount table (which enforces the allowed prefix), talks to the
//! storage driver, and maintains the coherence chain: storage mutation
//! commits, then ancestor mtimes are stamped, then cache entries are
//! invalidated.

pub mod batch;
pub mod cache;
pub mod drivers;
pub mod entry;
pub mod error;
pub mod links;
pub mod presign;
pub mod resolve;
pub mod search;
pub mod streaming;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use time::OffsetDateTime;

use common::mime;
use common::prelude::VirtualPath;
use s3_driver::{CompletedPartInfo, ObjectBody, S3Driver};

use crate::auth::AuthResult;
use crate::database::Database;
use crate::fs::cache::{CacheKey, DirectoryCache};
use crate::fs::drivers::DriverCache;
use crate::fs::entry::{DirectoryListing, FsEntry, UploadedFile};
use crate::fs::error::FsError;
use crate::fs::resolve::{PathResolver, ResolvedPath, ROOT_MARKER};
use crate::fs::streaming::{upload_stream, StreamingConfig};

/// Bodies at or under this size skip multipart entirely.
pub const DIRECT_UPLOAD_LIMIT: u64 = 5 * 1024 * 1024;

#[derive(Clone)]
pub struct FileSystem {
    db: Database,
    resolver: PathResolver,
    cache: Arc<DirectoryCache>,
    drivers: Arc<DriverCache>,
    streaming: StreamingConfig,
}

/// How a download request leaves the server.
pub enum DownloadOutcome {
    /// Stream the object through this service.
    Proxy {
        body: ObjectBody,
        filename: String,
        inline: bool,
    },
    /// Redirect the client to a presigned URL.
    Redirect { url: String },
}

/// Result of starting a backend (Mode A) multipart upload.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartInit {
    pub upload_id: String,
    pub key: String,
    pub recommended_part_size: u64,
}

impl FileSystem {
    pub fn new(
        db: Database,
        cache: Arc<DirectoryCache>,
        drivers: Arc<DriverCache>,
        streaming: StreamingConfig,
    ) -> Self {
        Self {
            resolver: PathResolver::new(db.clone()),
            db,
            cache,
            drivers,
            streaming,
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub(crate) fn database(&self) -> &Database {
        &self.db
    }

    pub(crate) fn cache(&self) -> &DirectoryCache {
        &self.cache
    }

    pub(crate) fn driver_for(&self, resolved: &ResolvedPath) -> Result<Arc<S3Driver>, FsError> {
        self.drivers.get_or_build(&resolved.storage)
    }

    // ---- coherence -------------------------------------------------------

    /// Post-mutation bookkeeping, in order: the storage mutation has already
    /// committed, so stamp ancestor mtimes, then drop cache entries. Readers
    /// that observe the new entry therefore also observe the new parent
    /// mtime.
    pub(crate) async fn after_mutation(
        &self,
        resolved: &ResolvedPath,
        recursive: bool,
    ) -> Result<(), FsError> {
        let now = OffsetDateTime::now_utc();
        let dirs = ancestor_dirs(&resolved.sub_path);
        self.db
            .stamp_dir_mtimes(&resolved.mount.id, &dirs, now)
            .await?;

        if recursive {
            self.cache.invalidate_mount(resolved.mount.id);
        } else {
            self.cache
                .invalidate_ancestors(resolved.mount.id, &resolved.sub_path);
        }
        Ok(())
    }

    /// Enforce the storage config's capacity cap before `additional` bytes
    /// land in the bucket.
    pub(crate) async fn check_capacity(
        &self,
        resolved: &ResolvedPath,
        additional: u64,
    ) -> Result<(), FsError> {
        let Some(cap) = resolved.storage.total_capacity_bytes else {
            return Ok(());
        };
        let driver = self.driver_for(resolved)?;
        let usage = driver.bucket_usage().await?;
        if usage.saturating_add(additional) > cap.max(0) as u64 {
            tracing::info!(
                storage_config = %resolved.storage.id,
                usage,
                additional,
                cap,
                "upload rejected: capacity exhausted"
            );
            return Err(FsError::CapacityExhausted);
        }
        Ok(())
    }

    // ---- read operations -------------------------------------------------

    /// List one directory, consulting the cache first.
    pub async fn list(
        &self,
        auth: &AuthResult,
        path: &VirtualPath,
    ) -> Result<DirectoryListing, FsError> {
        let resolved = match self.resolver.resolve(auth, path).await {
            Ok(resolved) => resolved,
            // A path above every mount is still listable as a virtual
            // directory when mounts live underneath it.
            Err(FsError::MountNotFound(_)) => {
                return self.list_virtual_parents(auth, path).await;
            }
            Err(e) => return Err(e),
        };

        let cache_key = CacheKey {
            mount_id: resolved.mount.id,
            sub_path: resolved.sub_path.clone(),
            principal_class: auth.principal_class(),
        };
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok((*cached).clone());
        }

        let listing = self.list_from_storage(auth, path, &resolved).await?;
        let ttl = Duration::from_secs(resolved.cache_ttl_seconds() as u64);
        self.cache.put(cache_key, Arc::new(listing.clone()), ttl);
        Ok(listing)
    }

    async fn list_from_storage(
        &self,
        auth: &AuthResult,
        path: &VirtualPath,
        resolved: &ResolvedPath,
    ) -> Result<DirectoryListing, FsError> {
        let driver = self.driver_for(resolved)?;
        let prefix = resolved.list_prefix();
        let page = driver.list_all(&prefix, Some("/")).await?;

        let mut entries: Vec<FsEntry> = Vec::new();

        // Common prefixes become subdirectories.
        let mut child_dirs: Vec<String> = Vec::new();
        for cp in &page.common_prefixes {
            let name = cp
                .strip_prefix(&prefix)
                .unwrap_or(cp)
                .trim_end_matches('/');
            if name.is_empty() || cp.as_str() == ROOT_MARKER {
                continue;
            }
            child_dirs.push(if resolved.sub_path.is_empty() {
                name.to_string()
            } else {
                format!("{}/{}", resolved.sub_path, name)
            });
        }
        let dir_mtimes = self
            .db
            .get_child_dir_mtimes(&resolved.mount.id, &child_dirs)
            .await?;

        for cp in &page.common_prefixes {
            let name = cp
                .strip_prefix(&prefix)
                .unwrap_or(cp)
                .trim_end_matches('/');
            if name.is_empty() || cp.as_str() == ROOT_MARKER {
                continue;
            }
            let sub = if resolved.sub_path.is_empty() {
                name.to_string()
            } else {
                format!("{}/{}", resolved.sub_path, name)
            };
            // Keys that cannot form a canonical virtual path stay invisible.
            let Ok(child_path) = path.join(name) else {
                continue;
            };
            entries.push(FsEntry::directory(
                name.to_string(),
                child_path,
                dir_mtimes.get(&sub).copied(),
            ));
        }

        // Objects become files; explicit directory markers are skipped in
        // favour of their implicit common-prefix form.
        for obj in &page.objects {
            if obj.key == ROOT_MARKER || obj.key.ends_with('/') {
                continue;
            }
            let name = match obj.key.strip_prefix(&prefix) {
                Some(name) if !name.is_empty() && !name.contains('/') => name,
                _ => continue,
            };
            let Ok(child_path) = path.join(name) else {
                continue;
            };
            entries.push(FsEntry {
                name: name.to_string(),
                path: child_path,
                is_directory: false,
                size: obj.size,
                modified: obj.last_modified,
                mimetype: mime::content_type_for_name(name),
                etag: obj.etag.clone(),
                preview_url: None,
                download_url: None,
            });
        }

        // Mounts nested below this directory appear as virtual
        // subdirectories even though the backend knows nothing about them.
        for mount in self.resolver.mounts_below(auth, path).await? {
            if let Some(rest) = mount.mount_path.strip_prefix(path) {
                if let Some(first) = rest.split('/').next() {
                    if !first.is_empty()
                        && !entries.iter().any(|e| e.name == first && e.is_directory)
                    {
                        entries.push(FsEntry::directory(
                            first.to_string(),
                            path.join(first)?,
                            None,
                        ));
                    }
                }
            }
        }

        entries.sort_by(|a, b| {
            b.is_directory
                .cmp(&a.is_directory)
                .then_with(|| a.name.cmp(&b.name))
        });

        Ok(DirectoryListing {
            path: path.clone(),
            entries,
            refreshed_at: OffsetDateTime::now_utc(),
        })
    }

    /// Listing for a directory that exists only because mounts are nested
    /// beneath it (including the virtual root).
    async fn list_virtual_parents(
        &self,
        auth: &AuthResult,
        path: &VirtualPath,
    ) -> Result<DirectoryListing, FsError> {
        let mounts = self.resolver.mounts_below(auth, path).await?;
        if mounts.is_empty() {
            return Err(FsError::MountNotFound(path.to_string()));
        }

        let mut entries: Vec<FsEntry> = Vec::new();
        for mount in mounts {
            let Some(rest) = mount.mount_path.strip_prefix(path) else {
                continue;
            };
            let Some(first) = rest.split('/').next() else {
                continue;
            };
            if first.is_empty() || entries.iter().any(|e| e.name == first) {
                continue;
            }
            entries.push(FsEntry::directory(
                first.to_string(),
                path.join(first)?,
                mount.last_used_at,
            ));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(DirectoryListing {
            path: path.clone(),
            entries,
            refreshed_at: OffsetDateTime::now_utc(),
        })
    }

    /// Metadata for one path, decorated with preview/download URLs for
    /// files.
    pub async fn stat(&self, auth: &AuthResult, path: &VirtualPath) -> Result<FsEntry, FsError> {
        let resolved = match self.resolver.resolve(auth, path).await {
            Ok(resolved) => resolved,
            Err(FsError::MountNotFound(_)) => {
                // Virtual parents of mounts stat as directories.
                let mounts = self.resolver.mounts_below(auth, path).await?;
                if mounts.is_empty() {
                    return Err(FsError::NotFound(path.to_string()));
                }
                return Ok(FsEntry::directory(
                    path.file_name().unwrap_or("/").to_string(),
                    path.clone(),
                    None,
                ));
            }
            Err(e) => return Err(e),
        };

        // Mount roots are directories by definition.
        if resolved.sub_path.is_empty() {
            let modified = self.db.get_dir_mtime(&resolved.mount.id, "").await?;
            return Ok(FsEntry::directory(
                path.file_name().unwrap_or("/").to_string(),
                path.clone(),
                modified,
            ));
        }

        let driver = self.driver_for(&resolved)?;
        let name = path.file_name().unwrap_or_default().to_string();

        if !path.dir_hint() {
            match driver.head_object(resolved.file_key()).await {
                Ok(head) => {
                    let is_directory = head
                        .content_type
                        .as_deref()
                        .map(|ct| ct.starts_with(mime::DIRECTORY_CONTENT_TYPE))
                        .unwrap_or(false);
                    if is_directory {
                        return Ok(FsEntry::directory(name, path.clone(), head.last_modified));
                    }
                    let links = self
                        .links_for(&resolved, path.as_str(), &name, None)
                        .await?;
                    return Ok(FsEntry {
                        name: name.clone(),
                        path: path.clone(),
                        is_directory: false,
                        size: head.content_length,
                        modified: head.last_modified,
                        mimetype: mime::content_type_for_name(&name),
                        etag: head.etag,
                        preview_url: Some(links.preview_url),
                        download_url: Some(links.download_url),
                    });
                }
                Err(s3_driver::S3DriverError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.stat_directory(&resolved, path, name).await
    }

    /// Directory existence: an explicit marker object, or any key under the
    /// prefix (implicit directory).
    async fn stat_directory(
        &self,
        resolved: &ResolvedPath,
        path: &VirtualPath,
        name: String,
    ) -> Result<FsEntry, FsError> {
        let driver = self.driver_for(resolved)?;

        let modified = match driver.head_object(&resolved.dir_key()).await {
            Ok(head) => head.last_modified,
            Err(s3_driver::S3DriverError::NotFound(_)) => {
                let page = driver
                    .list_page(&resolved.list_prefix(), Some("/"), None, Some(1))
                    .await?;
                if page.objects.is_empty() && page.common_prefixes.is_empty() {
                    return Err(FsError::NotFound(path.to_string()));
                }
                None
            }
            Err(e) => return Err(e.into()),
        };

        let stamped = self
            .db
            .get_dir_mtime(&resolved.mount.id, &resolved.sub_path)
            .await?;

        Ok(FsEntry::directory(name, path.clone(), stamped.or(modified)))
    }

    // ---- mutations -------------------------------------------------------

    /// Create a directory marker. Idempotent: re-creating an existing
    /// directory succeeds silently.
    pub async fn mkdir(&self, auth: &AuthResult, path: &VirtualPath) -> Result<(), FsError> {
        auth.require_file().map_err(FsError::from)?;
        let resolved = self.resolver.resolve(auth, path).await?;
        let driver = self.driver_for(&resolved)?;

        driver
            .put_object(
                &resolved.dir_key(),
                Bytes::new(),
                mime::DIRECTORY_CONTENT_TYPE,
            )
            .await?;

        self.after_mutation(&resolved, false).await?;
        Ok(())
    }

    /// True when a directory marker or any content exists under `path`.
    pub async fn dir_exists(&self, auth: &AuthResult, path: &VirtualPath) -> Result<bool, FsError> {
        let resolved = self.resolver.resolve(auth, path).await?;
        if resolved.sub_path.is_empty() {
            return Ok(true);
        }
        let driver = self.driver_for(&resolved)?;
        match driver.head_object(&resolved.dir_key()).await {
            Ok(_) => Ok(true),
            Err(s3_driver::S3DriverError::NotFound(_)) => {
                let page = driver
                    .list_page(&resolved.list_prefix(), Some("/"), None, Some(1))
                    .await?;
                Ok(!page.objects.is_empty() || !page.common_prefixes.is_empty())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a file, or a directory recursively. Mount roots and the
    /// virtual root are never removable.
    pub async fn remove(&self, auth: &AuthResult, path: &VirtualPath) -> Result<(), FsError> {
        auth.require_file().map_err(FsError::from)?;
        if path.is_root() {
            return Err(FsError::InvalidPath("cannot remove the root".to_string()));
        }
        let resolved = self.resolver.resolve(auth, path).await?;
        if resolved.sub_path.is_empty() {
            return Err(FsError::InvalidPath(
                "cannot remove a mount root".to_string(),
            ));
        }
        let driver = self.driver_for(&resolved)?;

        // A plain object wins if both forms exist; the entry was a file.
        let is_file = !path.dir_hint()
            && match driver.head_object(resolved.file_key()).await {
                Ok(head) => !head
                    .content_type
                    .as_deref()
                    .map(|ct| ct.starts_with(mime::DIRECTORY_CONTENT_TYPE))
                    .unwrap_or(false),
                Err(s3_driver::S3DriverError::NotFound(_)) => false,
                Err(e) => return Err(e.into()),
            };

        if is_file {
            driver.delete_object(resolved.file_key()).await?;
            self.after_mutation(&resolved, false).await?;
            return Ok(());
        }

        // Directory: collect everything under the prefix plus the marker,
        // never the root sentinel.
        let page = driver.list_all(&resolved.list_prefix(), None).await?;
        let mut keys: Vec<String> = page
            .objects
            .into_iter()
            .map(|o| o.key)
            .filter(|k| k != ROOT_MARKER)
            .collect();
        if keys.is_empty() {
            // Nothing under the prefix; only a bare marker could remain.
            match driver.head_object(&resolved.dir_key()).await {
                Ok(_) => {}
                Err(s3_driver::S3DriverError::NotFound(_)) => {
                    return Err(FsError::NotFound(path.to_string()))
                }
                Err(e) => return Err(e.into()),
            }
        }
        let marker = resolved.dir_key();
        if marker != ROOT_MARKER && !keys.contains(&marker) {
            keys.push(marker);
        }

        let failed = driver.delete_objects(&keys).await?;
        if !failed.is_empty() {
            tracing::warn!(path = %path, failed = failed.len(), "partial directory delete");
        }

        self.after_mutation(&resolved, true).await?;
        Ok(())
    }

    /// Same-mount rename via copy-then-delete. The copy happens first, so a
    /// crash between the steps leaves the source intact.
    pub async fn rename(
        &self,
        auth: &AuthResult,
        old_path: &VirtualPath,
        new_path: &VirtualPath,
    ) -> Result<(), FsError> {
        auth.require_file().map_err(FsError::from)?;
        let source = self.resolver.resolve(auth, old_path).await?;
        let target = self.resolver.resolve(auth, new_path).await?;

        if source.mount.id != target.mount.id {
            return Err(FsError::CrossMountRename);
        }
        if source.sub_path.is_empty() || target.sub_path.is_empty() {
            return Err(FsError::InvalidPath(
                "cannot rename a mount root".to_string(),
            ));
        }
        let driver = self.driver_for(&source)?;

        if self.exists(auth, new_path).await? {
            return Err(FsError::Conflict(new_path.to_string()));
        }

        match driver.head_object(source.file_key()).await {
            Ok(head)
                if !head
                    .content_type
                    .as_deref()
                    .map(|ct| ct.starts_with(mime::DIRECTORY_CONTENT_TYPE))
                    .unwrap_or(false) =>
            {
                driver
                    .copy_object(source.file_key(), target.file_key())
                    .await?;
                driver.delete_object(source.file_key()).await?;
            }
            Ok(_) | Err(s3_driver::S3DriverError::NotFound(_)) => {
                // Directory rename: every key under the prefix moves.
                let page = driver.list_all(&source.list_prefix(), None).await?;
                if page.objects.is_empty() {
                    // Maybe just a bare marker.
                    match driver.head_object(&source.dir_key()).await {
                        Ok(_) => {}
                        Err(s3_driver::S3DriverError::NotFound(_)) => {
                            return Err(FsError::NotFound(old_path.to_string()))
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                let src_prefix = source.list_prefix();
                let dst_prefix = target.list_prefix();
                let mut moved: Vec<String> = Vec::new();
                for obj in &page.objects {
                    if obj.key == ROOT_MARKER {
                        continue;
                    }
                    let rest = obj.key.strip_prefix(&src_prefix).unwrap_or(&obj.key);
                    let dst = format!("{dst_prefix}{rest}");
                    driver.copy_object(&obj.key, &dst).await?;
                    moved.push(obj.key.clone());
                }
                // The marker itself.
                if driver.head_object(&source.dir_key()).await.is_ok() {
                    driver
                        .copy_object(&source.dir_key(), &target.dir_key())
                        .await?;
                    moved.push(source.dir_key());
                }
                let failed = driver.delete_objects(&moved).await?;
                if !failed.is_empty() {
                    tracing::warn!(
                        path = %old_path,
                        failed = failed.len(),
                        "rename left source objects behind"
                    );
                }
            }
            Err(e) => return Err(e.into()),
        }

        self.after_mutation(&source, true).await?;
        self.after_mutation(&target, false).await?;
        Ok(())
    }

    /// Whether anything (file or directory) exists at `path`.
    pub async fn exists(&self, auth: &AuthResult, path: &VirtualPath) -> Result<bool, FsError> {
        match self.stat(auth, path).await {
            Ok(_) => Ok(true),
            Err(FsError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Direct PutObject write for small bodies.
    pub async fn upload_bytes(
        &self,
        auth: &AuthResult,
        path: &VirtualPath,
        data: Bytes,
    ) -> Result<UploadedFile, FsError> {
        auth.require_file().map_err(FsError::from)?;
        let resolved = self.resolver.resolve(auth, path).await?;
        if resolved.sub_path.is_empty() {
            return Err(FsError::InvalidPath(
                "cannot write to a mount root".to_string(),
            ));
        }
        self.check_capacity(&resolved, data.len() as u64).await?;

        let driver = self.driver_for(&resolved)?;
        let name = path.file_name().unwrap_or_default();
        let content_type = mime::content_type_for_name(name);
        let size = data.len() as u64;

        let outcome = driver
            .put_object(resolved.file_key(), data, &content_type)
            .await?;

        self.after_mutation(&resolved, false).await?;

        Ok(UploadedFile {
            path: path.clone(),
            object_key: resolved.object_key.clone(),
            etag: outcome.etag,
            size,
            mimetype: content_type,
        })
    }

    /// Mode B: stream a request body into storage through the bounded
    /// multipart pipeline.
    pub async fn upload_streaming<S, E>(
        &self,
        auth: &AuthResult,
        path: &VirtualPath,
        body: S,
        declared_len: Option<u64>,
    ) -> Result<UploadedFile, FsError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        auth.require_file().map_err(FsError::from)?;
        let resolved = self.resolver.resolve(auth, path).await?;
        if resolved.sub_path.is_empty() {
            return Err(FsError::InvalidPath(
                "cannot write to a mount root".to_string(),
            ));
        }
        if let Some(declared) = declared_len {
            self.check_capacity(&resolved, declared).await?;
        }

        let driver = self.driver_for(&resolved)?;
        let name = path.file_name().unwrap_or_default();
        let content_type = mime::content_type_for_name(name);

        let streamed = upload_stream(
            driver,
            resolved.file_key(),
            &content_type,
            body,
            declared_len,
            self.streaming,
        )
        .await?;

        self.after_mutation(&resolved, false).await?;

        Ok(UploadedFile {
            path: path.clone(),
            object_key: resolved.object_key.clone(),
            etag: streamed.etag,
            size: streamed.size,
            mimetype: content_type,
        })
    }

    /// Replace a file's content from an inline string (editor save).
    pub async fn update_inline(
        &self,
        auth: &AuthResult,
        path: &VirtualPath,
        content: String,
    ) -> Result<UploadedFile, FsError> {
        self.upload_bytes(auth, path, Bytes::from(content)).await
    }

    /// Fetch a whole object into memory; only used for small inline reads.
    pub async fn read_bytes(&self, auth: &AuthResult, path: &VirtualPath) -> Result<Bytes, FsError> {
        let resolved = self.resolver.resolve(auth, path).await?;
        let driver = self.driver_for(&resolved)?;
        Ok(driver.get_object_bytes(resolved.file_key()).await?)
    }

    // ---- download --------------------------------------------------------

    /// Stream or redirect per the resolving mount's `web_proxy` flag.
    pub async fn download(
        &self,
        auth: &AuthResult,
        path: &VirtualPath,
        range: Option<&str>,
        inline: bool,
    ) -> Result<DownloadOutcome, FsError> {
        let resolved = self.resolver.resolve(auth, path).await?;
        let driver = self.driver_for(&resolved)?;
        let filename = path.file_name().unwrap_or_default().to_string();

        if resolved.mount.web_proxy {
            let body = driver.get_object(resolved.file_key(), range).await?;
            return Ok(DownloadOutcome::Proxy {
                body,
                filename,
                inline,
            });
        }

        let disposition = if inline {
            s3_driver::inline_disposition(&filename)
        } else {
            s3_driver::attachment_disposition(&filename)
        };
        let content_type = if inline {
            mime::preview_content_type(&filename)
        } else {
            mime::download_content_type(&filename)
        };
        let url = driver
            .presign_get(
                resolved.file_key(),
                None,
                Some(disposition),
                Some(content_type),
            )
            .await?;
        Ok(DownloadOutcome::Redirect { url })
    }

    /// Open an object for streaming through this service regardless of the
    /// mount's proxy flag. WebDAV always serves bytes itself: the resource
    /// must live at the URL the client asked for.
    pub async fn open_object(
        &self,
        auth: &AuthResult,
        path: &VirtualPath,
        range: Option<&str>,
    ) -> Result<ObjectBody, FsError> {
        let resolved = self.resolver.resolve(auth, path).await?;
        let driver = self.driver_for(&resolved)?;
        Ok(driver.get_object(resolved.file_key(), range).await?)
    }

    /// Signed (or proxy) link with explicit expiry and disposition control.
    pub async fn file_link(
        &self,
        auth: &AuthResult,
        path: &VirtualPath,
        expires_in: Option<Duration>,
        force_download: bool,
    ) -> Result<String, FsError> {
        let resolved = self.resolver.resolve(auth, path).await?;
        let filename = path.file_name().unwrap_or_default().to_string();

        if resolved.mount.web_proxy {
            return Ok(links::proxy_url(path.as_str(), !force_download));
        }

        let driver = self.driver_for(&resolved)?;
        let (disposition, content_type) = if force_download {
            (
                s3_driver::attachment_disposition(&filename),
                mime::download_content_type(&filename),
            )
        } else {
            (
                s3_driver::inline_disposition(&filename),
                mime::preview_content_type(&filename),
            )
        };
        Ok(driver
            .presign_get(
                resolved.file_key(),
                expires_in,
                Some(disposition),
                Some(content_type),
            )
            .await?)
    }

    // ---- backend multipart (Mode A) --------------------------------------

    /// Start a client-driven backend multipart upload. The server keeps no
    /// session state; the caller holds the upload id and key.
    pub async fn multipart_init(
        &self,
        auth: &AuthResult,
        path: &VirtualPath,
    ) -> Result<MultipartInit, FsError> {
        auth.require_file().map_err(FsError::from)?;
        let resolved = self.resolver.resolve(auth, path).await?;
        if resolved.sub_path.is_empty() {
            return Err(FsError::InvalidPath(
                "cannot write to a mount root".to_string(),
            ));
        }
        let driver = self.driver_for(&resolved)?;
        let name = path.file_name().unwrap_or_default();
        let content_type = mime::content_type_for_name(name);

        let upload_id = driver
            .create_multipart(resolved.file_key(), &content_type)
            .await?;

        Ok(MultipartInit {
            upload_id,
            key: resolved.object_key.clone(),
            recommended_part_size: driver.provider().recommended_part_size(),
        })
    }

    /// Forward one raw part body to the backend.
    pub async fn multipart_part(
        &self,
        auth: &AuthResult,
        path: &VirtualPath,
        upload_id: &str,
        part_number: i32,
        key: &str,
        data: Bytes,
    ) -> Result<String, FsError> {
        auth.require_file().map_err(FsError::from)?;
        let resolved = self.resolver.resolve(auth, path).await?;
        verify_key(&resolved, key)?;
        if part_number < 1 || part_number > 10_000 {
            return Err(FsError::BadRequest(format!(
                "part number out of range: {part_number}"
            )));
        }
        let driver = self.driver_for(&resolved)?;
        Ok(driver
            .upload_part(resolved.file_key(), upload_id, part_number, data)
            .await?)
    }

    /// Complete a backend multipart upload, then enforce capacity; an
    /// over-cap object is deleted again rather than kept.
    pub async fn multipart_complete(
        &self,
        auth: &AuthResult,
        path: &VirtualPath,
        upload_id: &str,
        parts: Vec<CompletedPartInfo>,
        key: &str,
    ) -> Result<UploadedFile, FsError> {
        auth.require_file().map_err(FsError::from)?;
        let resolved = self.resolver.resolve(auth, path).await?;
        verify_key(&resolved, key)?;
        if parts.is_empty() {
            return Err(FsError::BadRequest("empty part list".to_string()));
        }
        let driver = self.driver_for(&resolved)?;

        let mut parts = parts;
        parts.sort_by_key(|p| p.part_number);
        let outcome = driver
            .complete_multipart(resolved.file_key(), upload_id, &parts)
            .await?;

        let head = driver.head_object(resolved.file_key()).await?;

        if let Some(cap) = resolved.storage.total_capacity_bytes {
            let usage = driver.bucket_usage().await?;
            if usage > cap.max(0) as u64 {
                driver.delete_object(resolved.file_key()).await?;
                return Err(FsError::CapacityExhausted);
            }
        }

        self.after_mutation(&resolved, false).await?;

        let name = path.file_name().unwrap_or_default();
        Ok(UploadedFile {
            path: path.clone(),
            object_key: resolved.object_key.clone(),
            etag: outcome.etag.or(head.etag),
            size: head.content_length,
            mimetype: mime::content_type_for_name(name),
        })
    }

    /// Abort a backend multipart upload. Succeeds regardless of the abort
    /// outcome so clients can always clean up.
    pub async fn multipart_abort(
        &self,
        auth: &AuthResult,
        path: &VirtualPath,
        upload_id: &str,
        key: &str,
    ) -> Result<(), FsError> {
        auth.require_file().map_err(FsError::from)?;
        let resolved = self.resolver.resolve(auth, path).await?;
        verify_key(&resolved, key)?;
        let driver = self.driver_for(&resolved)?;

        if let Err(error) = driver.abort_multipart(resolved.file_key(), upload_id).await {
            tracing::warn!(path = %path, %error, "multipart abort failed");
        }
        Ok(())
    }
}

/// The key a client echoes back must match what the path resolves to;
/// anything else is an attempt to write outside the resolved scope.
fn verify_key(resolved: &ResolvedPath, key: &str) -> Result<(), FsError> {
    if resolved.object_key == key {
        Ok(())
    } else {
        Err(FsError::PathForbidden(format!(
            "key does not match path: {key}"
        )))
    }
}

/// Ancestor directory sub-paths (mount-relative) for mtime stamping: the
/// mount root is `""`, then each directory down to the target's parent.
pub(crate) fn ancestor_dirs(sub_path: &str) -> Vec<String> {
    let mut dirs = vec![String::new()];
    let trimmed = sub_path.trim_matches('/');
    if trimmed.is_empty() {
        return dirs;
    }
    let segments: Vec<&str> = trimmed.split('/').collect();
    let mut acc = String::new();
    for segment in &segments[..segments.len().saturating_sub(1)] {
        if !acc.is_empty() {
            acc.push('/');
        }
        acc.push_str(segment);
        dirs.push(acc.clone());
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ancestor_dirs() {
        assert_eq!(ancestor_dirs(""), vec![String::new()]);
        assert_eq!(ancestor_dirs("a.txt"), vec![String::new()]);
        assert_eq!(
            ancestor_dirs("a/b/c.txt"),
            vec!["".to_string(), "a".to_string(), "a/b".to_string()]
        );
    }

    #[test]
    fn test_verify_key_guards_scope() {
        use crate::database::{MountRecord, StorageConfigRecord};
        use time::OffsetDateTime;
        use uuid::Uuid;

        let resolved = ResolvedPath {
            mount: MountRecord {
                id: Uuid::new_v4(),
                mount_path: VirtualPath::parse("/m").unwrap(),
                storage_config_id: Uuid::new_v4(),
                web_proxy: false,
                cache_ttl_seconds: 0,
                last_used_at: None,
                created_at: OffsetDateTime::now_utc(),
            },
            storage: StorageConfigRecord {
                id: Uuid::new_v4(),
                name: "s".to_string(),
                provider_type: "generic".to_string(),
                endpoint: None,
                region: "us-east-1".to_string(),
                bucket: "b".to_string(),
                access_key_sealed: String::new(),
                secret_key_sealed: String::new(),
                path_style: true,
                root_prefix: String::new(),
                default_signed_ttl: 3600,
                total_capacity_bytes: None,
                cache_ttl_seconds: 0,
                created_at: OffsetDateTime::now_utc(),
            },
            sub_path: "a.txt".to_string(),
            object_key: "a.txt".to_string(),
        };

        assert!(verify_key(&resolved, "a.txt").is_ok());
        assert!(matches!(
            verify_key(&resolved, "other.txt"),
            Err(FsError::PathForbidden(_))
        ));
    }
}
