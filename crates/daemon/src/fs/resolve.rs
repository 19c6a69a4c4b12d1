//! Virtual path → (mount, storage, object key) resolution.
//!
//! Resolution also carries the authorization boundary: no operation reaches
//! a driver without the principal's allowed prefix having been checked
//! against the requested path here.

use common::prelude::VirtualPath;

use crate::auth::AuthResult;
use crate::database::{Database, MountRecord, StorageConfigRecord};
use crate::fs::error::FsError;

/// Marker object used when an operation would otherwise target the storage
/// root with an empty key. Listings filter it out; remove never touches it.
pub const ROOT_MARKER: &str = "_MARK_ROOT_DONT_DELETE_ME/";

/// A fully resolved virtual path.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    pub mount: MountRecord,
    pub storage: StorageConfigRecord,
    /// Path below the mount, no leading slash; empty at the mount root.
    pub sub_path: String,
    /// `root_prefix + sub_path`, no leading slash.
    pub object_key: String,
}

impl ResolvedPath {
    /// Key for file operations.
    pub fn file_key(&self) -> &str {
        &self.object_key
    }

    /// Key for directory operations: `/`-suffixed, with the root sentinel
    /// standing in for the otherwise-empty mount root key.
    pub fn dir_key(&self) -> String {
        if self.object_key.is_empty() {
            ROOT_MARKER.to_string()
        } else {
            format!("{}/", self.object_key)
        }
    }

    /// ListObjectsV2 prefix for this path as a directory.
    pub fn list_prefix(&self) -> String {
        if self.object_key.is_empty() {
            String::new()
        } else {
            format!("{}/", self.object_key)
        }
    }

    /// Effective listing-cache TTL in seconds; 0 disables caching.
    pub fn cache_ttl_seconds(&self) -> i64 {
        self.mount
            .cache_ttl_seconds
            .max(self.storage.cache_ttl_seconds)
            .max(0)
    }
}

/// Reject paths outside the principal's allowed prefix.
pub fn ensure_allowed(auth: &AuthResult, path: &VirtualPath) -> Result<(), FsError> {
    if !auth.authenticated {
        return Err(FsError::Unauthorized);
    }
    if path.starts_with(&auth.allowed_prefix) {
        Ok(())
    } else {
        Err(FsError::PathForbidden(path.to_string()))
    }
}

/// Compute the object key for a sub path under a storage root prefix.
pub fn object_key(root_prefix: &str, sub_path: &str) -> String {
    let prefix = root_prefix.trim_matches('/');
    let sub = sub_path.trim_start_matches('/');
    match (prefix.is_empty(), sub.is_empty()) {
        (true, _) => sub.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}/{sub}"),
    }
}

/// Maps virtual paths onto mounts.
#[derive(Debug, Clone)]
pub struct PathResolver {
    db: Database,
}

impl PathResolver {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Resolve `path` for `auth`.
    ///
    /// The mount query returns rows ordered longest-path-first, newest-first
    /// within equal length, so the first prefix match is the winner.
    pub async fn resolve(
        &self,
        auth: &AuthResult,
        path: &VirtualPath,
    ) -> Result<ResolvedPath, FsError> {
        ensure_allowed(auth, path)?;

        let mount = self
            .db
            .list_mounts()
            .await?
            .into_iter()
            .find(|m| path.starts_with(&m.mount_path))
            .ok_or_else(|| FsError::MountNotFound(path.to_string()))?;

        let storage = self
            .db
            .get_storage_config(&mount.storage_config_id)
            .await?
            .ok_or_else(|| FsError::MountNotFound(path.to_string()))?;

        let sub_path = path
            .strip_prefix(&mount.mount_path)
            .expect("prefix match already established");
        let object_key = object_key(&storage.root_prefix, &sub_path);

        // Usage bookkeeping, off the request path.
        let db = self.db.clone();
        let mount_id = mount.id;
        tokio::spawn(async move {
            if let Err(error) = db.touch_mount(&mount_id).await {
                tracing::debug!(%error, "failed to touch mount last_used_at");
            }
        });

        Ok(ResolvedPath {
            mount,
            storage,
            sub_path,
            object_key,
        })
    }

    /// Mounts whose mount path sits strictly below `path`, visible to the
    /// principal. Used to synthesise listings for virtual directories that
    /// exist only because mounts live underneath them.
    pub async fn mounts_below(
        &self,
        auth: &AuthResult,
        path: &VirtualPath,
    ) -> Result<Vec<MountRecord>, FsError> {
        ensure_allowed(auth, path)?;

        let mounts = self
            .db
            .list_mounts()
            .await?
            .into_iter()
            .filter(|m| m.mount_path.starts_with(path) && m.mount_path.as_str() != path.as_str())
            .filter(|m| {
                // Only mounts the principal could actually enter.
                m.mount_path.starts_with(&auth.allowed_prefix)
                    || auth.allowed_prefix.starts_with(&m.mount_path)
            })
            .collect();

        Ok(mounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_composition() {
        assert_eq!(object_key("", "a/b.txt"), "a/b.txt");
        assert_eq!(object_key("tenant1", "a/b.txt"), "tenant1/a/b.txt");
        assert_eq!(object_key("tenant1/", "a/b.txt"), "tenant1/a/b.txt");
        assert_eq!(object_key("/tenant1/", ""), "tenant1");
        assert_eq!(object_key("", ""), "");
    }

    #[test]
    fn test_allowed_prefix_enforcement() {
        let mut auth = AuthResult::admin();
        auth.allowed_prefix = VirtualPath::parse("/team-a").unwrap();

        let inside = VirtualPath::parse("/team-a/file.txt").unwrap();
        let outside = VirtualPath::parse("/team-b/file.txt").unwrap();
        let lookalike = VirtualPath::parse("/team-ab").unwrap();

        assert!(ensure_allowed(&auth, &inside).is_ok());
        assert!(matches!(
            ensure_allowed(&auth, &outside),
            Err(FsError::PathForbidden(_))
        ));
        assert!(matches!(
            ensure_allowed(&auth, &lookalike),
            Err(FsError::PathForbidden(_))
        ));
    }

    #[test]
    fn test_unauthenticated_is_rejected() {
        let auth = AuthResult {
            authenticated: false,
            auth_type: crate::auth::AuthType::None,
            principal_id: None,
            permissions: crate::auth::Permissions::default(),
            allowed_prefix: VirtualPath::root(),
            key_info: None,
        };
        let path = VirtualPath::root();
        assert!(matches!(
            ensure_allowed(&auth, &path),
            Err(FsError::Unauthorized)
        ));
    }
}
