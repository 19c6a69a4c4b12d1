//! Filename search across mounts.
//!
//! Cached listings are scanned first; mounts without useful cache coverage
//! get a bounded keyspace walk. Results never escape the principal's
//! allowed prefix.

use serde::Serialize;
use uuid::Uuid;

use common::mime;
use common::prelude::VirtualPath;

use crate::auth::AuthResult;
use crate::fs::entry::FsEntry;
use crate::fs::error::FsError;
use crate::fs::resolve::ROOT_MARKER;
use crate::fs::FileSystem;

/// Pages of backend listing a single search is allowed to consume per
/// mount.
const WALK_PAGE_LIMIT: usize = 5;
const WALK_PAGE_SIZE: i32 = 1000;

const MIN_QUERY_LEN: usize = 2;
const MAX_LIMIT: usize = 200;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub results: Vec<FsEntry>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SearchScope {
    /// Restrict to one mount.
    pub mount_id: Option<Uuid>,
    /// Restrict to a virtual path prefix.
    pub path_prefix: Option<VirtualPath>,
}

impl FileSystem {
    pub async fn search(
        &self,
        auth: &AuthResult,
        query: &str,
        scope: SearchScope,
        limit: usize,
        offset: usize,
    ) -> Result<SearchResults, FsError> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return Err(FsError::BadRequest(format!(
                "query must be at least {MIN_QUERY_LEN} characters"
            )));
        }
        let needle = query.to_lowercase();
        let limit = limit.clamp(1, MAX_LIMIT);

        let mounts = self
            .database()
            .list_mounts()
            .await?
            .into_iter()
            .filter(|m| scope.mount_id.map(|id| id == m.id).unwrap_or(true))
            .filter(|m| {
                m.mount_path.starts_with(&auth.allowed_prefix)
                    || auth.allowed_prefix.starts_with(&m.mount_path)
            })
            .collect::<Vec<_>>();

        let mut matches: Vec<FsEntry> = Vec::new();

        for mount in mounts {
            let mut seen_sub_paths: Vec<String> = Vec::new();

            // Cached listings first.
            for listing in self
                .cache()
                .listings_for_mount(mount.id, &auth.principal_class())
            {
                for entry in &listing.entries {
                    if entry.name.to_lowercase().contains(&needle) {
                        if let Some(sub) = entry.path.strip_prefix(&mount.mount_path) {
                            if !seen_sub_paths.contains(&sub) {
                                seen_sub_paths.push(sub);
                                matches.push(entry.clone());
                            }
                        }
                    }
                }
            }

            // Bounded backend walk for what the cache does not cover.
            let resolved = match self.resolver().resolve(auth, &mount.mount_path).await {
                Ok(resolved) => resolved,
                // The mount root may sit outside a narrower allowed prefix
                // even when paths deeper inside it are visible.
                Err(FsError::PathForbidden(_)) => continue,
                Err(e) => return Err(e),
            };
            let driver = self.driver_for(&resolved)?;
            let root_prefix = resolved.list_prefix();

            let mut token = None;
            for _ in 0..WALK_PAGE_LIMIT {
                let page = driver
                    .list_page(&root_prefix, None, token.take(), Some(WALK_PAGE_SIZE))
                    .await?;
                for obj in &page.objects {
                    if obj.key == ROOT_MARKER || obj.key.ends_with('/') {
                        continue;
                    }
                    let sub = obj.key.strip_prefix(&root_prefix).unwrap_or(&obj.key);
                    let name = sub.rsplit('/').next().unwrap_or(sub);
                    if !name.to_lowercase().contains(&needle) {
                        continue;
                    }
                    if seen_sub_paths.iter().any(|s| s == sub) {
                        continue;
                    }

                    let mut virtual_path = mount.mount_path.clone();
                    let mut valid = true;
                    for segment in sub.split('/').filter(|s| !s.is_empty()) {
                        match virtual_path.join(segment) {
                            Ok(next) => virtual_path = next,
                            Err(_) => {
                                valid = false;
                                break;
                            }
                        }
                    }
                    if !valid || !virtual_path.starts_with(&auth.allowed_prefix) {
                        continue;
                    }

                    seen_sub_paths.push(sub.to_string());
                    matches.push(FsEntry {
                        name: name.to_string(),
                        path: virtual_path,
                        is_directory: false,
                        size: obj.size,
                        modified: obj.last_modified,
                        mimetype: mime::content_type_for_name(name),
                        etag: obj.etag.clone(),
                        preview_url: None,
                        download_url: None,
                    });
                }
                match page.next_token {
                    Some(next) => token = Some(next),
                    None => break,
                }
            }
        }

        // Scope and principal filtering, then stable ordering for paging.
        matches.retain(|e| e.path.starts_with(&auth.allowed_prefix));
        if let Some(prefix) = &scope.path_prefix {
            matches.retain(|e| e.path.starts_with(prefix));
        }
        matches.sort_by(|a, b| a.path.as_str().cmp(b.path.as_str()));

        let total = matches.len();
        let results = matches.into_iter().skip(offset).take(limit).collect();

        Ok(SearchResults {
            results,
            total,
            limit,
            offset,
        })
    }
}
