//! Advisory WebDAV lock table.
//!
//! Process-local and in-memory only: scaling past one node means pinning
//! clients to nodes or externalising this table. A background sweep removes
//! expired entries every minute; expiry is also checked inline so a stale
//! entry can never block a request between sweeps.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Clamp bounds and default for client-requested lock timeouts.
pub const MIN_TIMEOUT: Duration = Duration::from_secs(60);
pub const MAX_TIMEOUT: Duration = Duration::from_secs(3600);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    Exclusive,
    Shared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDepth {
    Zero,
    Infinity,
}

#[derive(Debug, Clone)]
pub struct LockEntry {
    pub token: String,
    pub path: String,
    pub depth: LockDepth,
    pub scope: LockScope,
    pub owner: Option<String>,
    pub timeout: Duration,
    pub expires_at: Instant,
}

impl LockEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }

    /// Whether this lock protects `path`: its own path, or any descendant
    /// when the lock has infinite depth.
    pub fn covers(&self, path: &str) -> bool {
        self.path == path
            || (self.depth == LockDepth::Infinity && is_strict_ancestor(&self.path, path))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("path is already locked: {path}")]
    Conflict { path: String },

    #[error("no lock held on {0}")]
    NoSuchLock(String),

    #[error("lock token mismatch on {0}")]
    TokenMismatch(String),
}

/// Segment-boundary ancestor test on canonical virtual paths.
fn is_strict_ancestor(ancestor: &str, descendant: &str) -> bool {
    if ancestor == descendant {
        return false;
    }
    if ancestor == "/" {
        return true;
    }
    descendant.starts_with(ancestor)
        && descendant.as_bytes().get(ancestor.len()) == Some(&b'/')
}

fn clamp_timeout(requested: Option<Duration>) -> Duration {
    requested
        .unwrap_or(DEFAULT_TIMEOUT)
        .clamp(MIN_TIMEOUT, MAX_TIMEOUT)
}

#[derive(Default)]
pub struct LockManager {
    locks: Mutex<HashMap<String, Vec<LockEntry>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a lock. Fails when an existing live lock overlaps: same
    /// path, an infinite-depth ancestor, or (when the new lock itself is
    /// infinite) any live descendant. Shared locks coexist with each
    /// other only.
    pub fn acquire(
        &self,
        path: &str,
        owner: Option<String>,
        depth: LockDepth,
        scope: LockScope,
        timeout: Option<Duration>,
    ) -> Result<LockEntry, LockError> {
        let now = Instant::now();
        let mut locks = self.locks.lock().expect("lock table poisoned");

        for (held_path, entries) in locks.iter() {
            for held in entries {
                if held.is_expired(now) {
                    continue;
                }
                let overlaps = held.covers(path)
                    || (depth == LockDepth::Infinity && is_strict_ancestor(path, held_path));
                if !overlaps {
                    continue;
                }
                if held.scope == LockScope::Exclusive || scope == LockScope::Exclusive {
                    return Err(LockError::Conflict {
                        path: held_path.clone(),
                    });
                }
            }
        }

        let timeout = clamp_timeout(timeout);
        let entry = LockEntry {
            token: format!("opaquelocktoken:{}", Uuid::new_v4()),
            path: path.to_string(),
            depth,
            scope,
            owner,
            timeout,
            expires_at: now + timeout,
        };
        locks
            .entry(path.to_string())
            .or_default()
            .push(entry.clone());
        Ok(entry)
    }

    /// Reset the expiry of an existing lock.
    pub fn refresh(
        &self,
        path: &str,
        token: &str,
        timeout: Option<Duration>,
    ) -> Result<LockEntry, LockError> {
        let now = Instant::now();
        let mut locks = self.locks.lock().expect("lock table poisoned");

        let entries = locks
            .get_mut(path)
            .ok_or_else(|| LockError::NoSuchLock(path.to_string()))?;
        let entry = entries
            .iter_mut()
            .filter(|e| !e.is_expired(now))
            .find(|e| e.token == token)
            .ok_or_else(|| LockError::TokenMismatch(path.to_string()))?;

        entry.timeout = clamp_timeout(timeout);
        entry.expires_at = now + entry.timeout;
        Ok(entry.clone())
    }

    /// Release a lock by token.
    pub fn release(&self, path: &str, token: &str) -> Result<(), LockError> {
        let mut locks = self.locks.lock().expect("lock table poisoned");

        let entries = locks
            .get_mut(path)
            .ok_or_else(|| LockError::NoSuchLock(path.to_string()))?;
        let before = entries.len();
        entries.retain(|e| e.token != token);
        if entries.len() == before {
            return Err(LockError::TokenMismatch(path.to_string()));
        }
        if entries.is_empty() {
            locks.remove(path);
        }
        Ok(())
    }

    /// Gate a mutating request on the lock table.
    ///
    /// `affects_descendants` is set for operations that touch a whole
    /// subtree (DELETE, MOVE of a collection), which must also respect
    /// locks held further down.
    pub fn check(
        &self,
        path: &str,
        presented_tokens: &[String],
        affects_descendants: bool,
    ) -> Result<(), LockError> {
        let now = Instant::now();
        let locks = self.locks.lock().expect("lock table poisoned");

        for (held_path, entries) in locks.iter() {
            for held in entries {
                if held.is_expired(now) {
                    continue;
                }
                let relevant = held.covers(path)
                    || (affects_descendants && is_strict_ancestor(path, held_path));
                if !relevant {
                    continue;
                }
                if !presented_tokens.iter().any(|t| t == &held.token) {
                    return Err(LockError::Conflict {
                        path: held_path.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Live locks protecting `path`, for `lockdiscovery`.
    pub fn find_covering(&self, path: &str) -> Vec<LockEntry> {
        let now = Instant::now();
        let locks = self.locks.lock().expect("lock table poisoned");
        locks
            .values()
            .flatten()
            .filter(|e| !e.is_expired(now) && e.covers(path))
            .cloned()
            .collect()
    }

    /// Drop expired entries; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut locks = self.locks.lock().expect("lock table poisoned");
        let mut removed = 0;
        locks.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|e| !e.is_expired(now));
            removed += before - entries.len();
            !entries.is_empty()
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .expect("lock table poisoned")
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let locks = LockManager::new();
        let entry = locks
            .acquire("/x.txt", None, LockDepth::Zero, LockScope::Exclusive, None)
            .unwrap();
        assert!(entry.token.starts_with("opaquelocktoken:"));
        assert_eq!(locks.len(), 1);

        locks.release("/x.txt", &entry.token).unwrap();
        assert!(locks.is_empty());
    }

    #[test]
    fn test_exclusive_lock_conflicts_on_same_path() {
        let locks = LockManager::new();
        locks
            .acquire("/x.txt", None, LockDepth::Zero, LockScope::Exclusive, None)
            .unwrap();
        let err = locks
            .acquire("/x.txt", None, LockDepth::Zero, LockScope::Exclusive, None)
            .unwrap_err();
        assert!(matches!(err, LockError::Conflict { .. }));
    }

    #[test]
    fn test_shared_locks_coexist() {
        let locks = LockManager::new();
        locks
            .acquire("/x.txt", None, LockDepth::Zero, LockScope::Shared, None)
            .unwrap();
        assert!(locks
            .acquire("/x.txt", None, LockDepth::Zero, LockScope::Shared, None)
            .is_ok());
        assert!(locks
            .acquire("/x.txt", None, LockDepth::Zero, LockScope::Exclusive, None)
            .is_err());
    }

    #[test]
    fn test_infinity_lock_covers_descendants() {
        let locks = LockManager::new();
        locks
            .acquire("/dir", None, LockDepth::Infinity, LockScope::Exclusive, None)
            .unwrap();

        // A descendant cannot be locked and writes on it are gated.
        assert!(locks
            .acquire(
                "/dir/file.txt",
                None,
                LockDepth::Zero,
                LockScope::Exclusive,
                None
            )
            .is_err());
        assert!(locks.check("/dir/file.txt", &[], false).is_err());

        // A sibling subtree stays free.
        assert!(locks.check("/other", &[], false).is_ok());
        // Depth-zero would not have covered the descendant.
        assert!(!is_strict_ancestor("/dirx", "/dir/file.txt"));
    }

    #[test]
    fn test_depth_zero_does_not_cover_children() {
        let locks = LockManager::new();
        locks
            .acquire("/dir", None, LockDepth::Zero, LockScope::Exclusive, None)
            .unwrap();
        assert!(locks.check("/dir/file.txt", &[], false).is_ok());
    }

    #[test]
    fn test_check_with_matching_token_passes() {
        let locks = LockManager::new();
        let entry = locks
            .acquire("/x.txt", None, LockDepth::Zero, LockScope::Exclusive, None)
            .unwrap();

        assert!(locks.check("/x.txt", &[], false).is_err());
        assert!(locks.check("/x.txt", &[entry.token.clone()], false).is_ok());
    }

    #[test]
    fn test_delete_respects_descendant_locks() {
        let locks = LockManager::new();
        let entry = locks
            .acquire(
                "/dir/file.txt",
                None,
                LockDepth::Zero,
                LockScope::Exclusive,
                None,
            )
            .unwrap();

        // Deleting the parent collection touches the locked child.
        assert!(locks.check("/dir", &[], true).is_err());
        assert!(locks.check("/dir", &[entry.token.clone()], true).is_ok());
        // A plain write on the parent itself is unaffected.
        assert!(locks.check("/dir", &[], false).is_ok());
    }

    #[test]
    fn test_acquiring_infinity_above_existing_lock_conflicts() {
        let locks = LockManager::new();
        locks
            .acquire(
                "/dir/file.txt",
                None,
                LockDepth::Zero,
                LockScope::Exclusive,
                None,
            )
            .unwrap();
        assert!(locks
            .acquire("/dir", None, LockDepth::Infinity, LockScope::Exclusive, None)
            .is_err());
        assert!(locks
            .acquire("/dir", None, LockDepth::Zero, LockScope::Exclusive, None)
            .is_ok());
    }

    #[test]
    fn test_release_requires_matching_token() {
        let locks = LockManager::new();
        locks
            .acquire("/x.txt", None, LockDepth::Zero, LockScope::Exclusive, None)
            .unwrap();
        assert!(matches!(
            locks.release("/x.txt", "opaquelocktoken:wrong"),
            Err(LockError::TokenMismatch(_))
        ));
        assert!(matches!(
            locks.release("/y.txt", "opaquelocktoken:any"),
            Err(LockError::NoSuchLock(_))
        ));
    }

    #[test]
    fn test_timeout_clamping() {
        let locks = LockManager::new();
        let short = locks
            .acquire(
                "/a",
                None,
                LockDepth::Zero,
                LockScope::Exclusive,
                Some(Duration::from_secs(1)),
            )
            .unwrap();
        assert_eq!(short.timeout, MIN_TIMEOUT);

        let long = locks
            .acquire(
                "/b",
                None,
                LockDepth::Zero,
                LockScope::Exclusive,
                Some(Duration::from_secs(86_400)),
            )
            .unwrap();
        assert_eq!(long.timeout, MAX_TIMEOUT);

        let default = locks
            .acquire("/c", None, LockDepth::Zero, LockScope::Exclusive, None)
            .unwrap();
        assert_eq!(default.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_refresh_extends_expiry() {
        let locks = LockManager::new();
        let entry = locks
            .acquire("/x.txt", None, LockDepth::Zero, LockScope::Exclusive, None)
            .unwrap();

        let refreshed = locks
            .refresh("/x.txt", &entry.token, Some(Duration::from_secs(1200)))
            .unwrap();
        assert_eq!(refreshed.timeout, Duration::from_secs(1200));
        assert!(refreshed.expires_at > entry.expires_at);

        assert!(matches!(
            locks.refresh("/x.txt", "opaquelocktoken:wrong", None),
            Err(LockError::TokenMismatch(_))
        ));
    }

    #[test]
    fn test_sweep_removes_expired() {
        let locks = LockManager::new();
        locks
            .acquire("/x.txt", None, LockDepth::Zero, LockScope::Exclusive, None)
            .unwrap();

        // Force expiry by hand.
        {
            let mut table = locks.locks.lock().unwrap();
            for entries in table.values_mut() {
                for entry in entries.iter_mut() {
                    entry.expires_at = Instant::now() - Duration::from_secs(1);
                }
            }
        }

        // Expired locks no longer gate requests even before the sweep runs.
        assert!(locks.check("/x.txt", &[], false).is_ok());
        assert_eq!(locks.sweep(), 1);
        assert!(locks.is_empty());
    }
}
