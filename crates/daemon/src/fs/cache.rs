//! Bounded TTL cache for directory listings.
//!
//! Keys carry the principal class so a partially-visible listing produced
//! for one API key is never served to another principal. TTLs vary per
//! mount, so freshness is checked per entry on read; the cache-wide TTL is
//! only a backstop. Invalidation happens after every mutation, before any
//! fresh listing is published.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::sync::Cache;
use uuid::Uuid;

use crate::fs::entry::DirectoryListing;

/// Soft cap on cached listings; moka evicts LRU-ish beyond this.
const DEFAULT_MAX_ENTRIES: u64 = 4096;
/// Backstop TTL; per-entry TTLs are always shorter or equal in practice.
const BACKSTOP_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CacheKey {
    pub mount_id: Uuid,
    pub sub_path: String,
    pub principal_class: String,
}

#[derive(Clone)]
struct CachedListing {
    listing: Arc<DirectoryListing>,
    stored_at: Instant,
    ttl: Duration,
}

pub struct DirectoryCache {
    cache: Cache<CacheKey, CachedListing>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(BACKSTOP_TTL)
                .support_invalidation_closures()
                .build(),
        }
    }

    /// Fresh listing for `key`, or `None` on miss or expiry.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<DirectoryListing>> {
        let entry = self.cache.get(key)?;
        if entry.stored_at.elapsed() >= entry.ttl {
            self.cache.invalidate(key);
            return None;
        }
        Some(entry.listing)
    }

    /// Store a listing. A zero TTL means caching is disabled for the mount
    /// and the call is a no-op.
    pub fn put(&self, key: CacheKey, listing: Arc<DirectoryListing>, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.cache.insert(
            key,
            CachedListing {
                listing,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Drop one directory and its whole ancestor chain (used after create,
    /// delete and rename, which change parent listings and mtimes).
    pub fn invalidate_ancestors(&self, mount_id: Uuid, sub_path: &str) {
        let mut targets: Vec<String> = vec![sub_path.trim_matches('/').to_string()];
        let mut current = sub_path.trim_matches('/');
        while let Some(idx) = current.rfind('/') {
            current = &current[..idx];
            targets.push(current.to_string());
        }
        if !targets.contains(&String::new()) {
            targets.push(String::new());
        }
        let _ = self
            .cache
            .invalidate_entries_if(move |key, _| {
                key.mount_id == mount_id && targets.contains(&key.sub_path)
            });
    }

    /// Drop everything cached for a mount (mount removal, recursive ops).
    pub fn invalidate_mount(&self, mount_id: Uuid) {
        let _ = self
            .cache
            .invalidate_entries_if(move |key, _| key.mount_id == mount_id);
    }

    /// Drop everything cached for a set of mounts. The storage-config
    /// change hook resolves the config to its bound mounts and passes them
    /// here, since every one of their listings went stale at once.
    pub fn invalidate_mounts(&self, mount_ids: Vec<Uuid>) {
        let _ = self
            .cache
            .invalidate_entries_if(move |key, _| mount_ids.contains(&key.mount_id));
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Snapshot of cached listings for one mount, newest first. The search
    /// path scans these before falling back to a bounded keyspace walk.
    pub fn listings_for_mount(
        &self,
        mount_id: Uuid,
        principal_class: &str,
    ) -> Vec<Arc<DirectoryListing>> {
        let mut out = Vec::new();
        for (key, entry) in self.cache.iter() {
            if key.mount_id == mount_id
                && key.principal_class == principal_class
                && entry.stored_at.elapsed() < entry.ttl
            {
                out.push(entry.listing.clone());
            }
        }
        out
    }
}

impl Default for DirectoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::prelude::VirtualPath;
    use time::OffsetDateTime;

    fn listing(path: &str) -> Arc<DirectoryListing> {
        Arc::new(DirectoryListing {
            path: VirtualPath::parse(path).unwrap(),
            entries: Vec::new(),
            refreshed_at: OffsetDateTime::now_utc(),
        })
    }

    fn key(mount_id: Uuid, sub_path: &str, class: &str) -> CacheKey {
        CacheKey {
            mount_id,
            sub_path: sub_path.to_string(),
            principal_class: class.to_string(),
        }
    }

    #[test]
    fn test_put_get_roundtrip() {
        let cache = DirectoryCache::new();
        let mount = Uuid::new_v4();
        let k = key(mount, "docs", "admin");

        assert!(cache.get(&k).is_none());
        cache.put(k.clone(), listing("/m/docs"), Duration::from_secs(60));
        assert!(cache.get(&k).is_some());
    }

    #[test]
    fn test_zero_ttl_disables_caching() {
        let cache = DirectoryCache::new();
        let k = key(Uuid::new_v4(), "docs", "admin");
        cache.put(k.clone(), listing("/m/docs"), Duration::ZERO);
        assert!(cache.get(&k).is_none());
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = DirectoryCache::new();
        let k = key(Uuid::new_v4(), "docs", "admin");
        cache.put(k.clone(), listing("/m/docs"), Duration::from_nanos(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&k).is_none());
    }

    #[test]
    fn test_principal_classes_are_partitioned() {
        let cache = DirectoryCache::new();
        let mount = Uuid::new_v4();
        let admin_key = key(mount, "docs", "admin");
        let scoped_key = key(mount, "docs", "apikey:/team-a");

        cache.put(admin_key.clone(), listing("/m/docs"), Duration::from_secs(60));
        assert!(cache.get(&admin_key).is_some());
        assert!(cache.get(&scoped_key).is_none());
    }

    #[test]
    fn test_invalidate_ancestors() {
        let cache = DirectoryCache::new();
        let mount = Uuid::new_v4();
        let ttl = Duration::from_secs(60);

        cache.put(key(mount, "", "admin"), listing("/m"), ttl);
        cache.put(key(mount, "a", "admin"), listing("/m/a"), ttl);
        cache.put(key(mount, "a/b", "admin"), listing("/m/a/b"), ttl);
        cache.put(key(mount, "other", "admin"), listing("/m/other"), ttl);

        cache.invalidate_ancestors(mount, "a/b");
        // Predicate invalidation is applied lazily; give the housekeeping a
        // moment before reading back.
        std::thread::sleep(Duration::from_millis(20));

        assert!(cache.get(&key(mount, "a/b", "admin")).is_none());
        assert!(cache.get(&key(mount, "a", "admin")).is_none());
        assert!(cache.get(&key(mount, "", "admin")).is_none());
        assert!(cache.get(&key(mount, "other", "admin")).is_some());
    }

    #[test]
    fn test_invalidate_mounts_drops_every_listed_mount() {
        let cache = DirectoryCache::new();
        let m1 = Uuid::new_v4();
        let m2 = Uuid::new_v4();
        let m3 = Uuid::new_v4();
        let ttl = Duration::from_secs(60);

        cache.put(key(m1, "a", "admin"), listing("/m1/a"), ttl);
        cache.put(key(m1, "b", "admin"), listing("/m1/b"), ttl);
        cache.put(key(m2, "a", "admin"), listing("/m2/a"), ttl);
        cache.put(key(m3, "a", "admin"), listing("/m3/a"), ttl);

        cache.invalidate_mounts(vec![m1, m2]);
        std::thread::sleep(Duration::from_millis(20));

        assert!(cache.get(&key(m1, "a", "admin")).is_none());
        assert!(cache.get(&key(m1, "b", "admin")).is_none());
        assert!(cache.get(&key(m2, "a", "admin")).is_none());
        assert!(cache.get(&key(m3, "a", "admin")).is_some());
    }

    #[test]
    fn test_invalidate_mount_scopes_by_mount() {
        let cache = DirectoryCache::new();
        let m1 = Uuid::new_v4();
        let m2 = Uuid::new_v4();
        let ttl = Duration::from_secs(60);

        cache.put(key(m1, "x", "admin"), listing("/m1/x"), ttl);
        cache.put(key(m2, "x", "admin"), listing("/m2/x"), ttl);

        cache.invalidate_mount(m1);
        std::thread::sleep(Duration::from_millis(20));

        assert!(cache.get(&key(m1, "x", "admin")).is_none());
        assert!(cache.get(&key(m2, "x", "admin")).is_some());
    }
}
