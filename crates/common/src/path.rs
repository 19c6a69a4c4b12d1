//! Virtual path handling for the mounted filesystem.
//!
//! Paths are POSIX-like, forward-slash only. The canonical form carries a
//! single leading slash, no duplicate slashes and no `.`/`..` segments; a
//! trailing slash on the input is remembered as a directory hint. The empty
//! path is the root `/`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors produced while parsing or combining virtual paths.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("invalid path: {0}")]
    Invalid(String),
}

/// A canonicalised virtual path.
///
/// The stored form never has a trailing slash (except the root, which is
/// exactly `/`). Whether the caller wrote a trailing slash is kept as a
/// directory hint, since WebDAV and the object store both care about it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VirtualPath {
    path: String,
    dir_hint: bool,
}

impl VirtualPath {
    /// Parse and canonicalise a raw path string.
    ///
    /// Duplicate slashes are collapsed. `.` and `..` segments are rejected
    /// outright rather than resolved, so a path can never escape upward.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.contains('\0') {
            return Err(PathError::Invalid("embedded NUL".to_string()));
        }
        if raw.contains('\\') {
            return Err(PathError::Invalid(format!(
                "backslash in path: {raw:?}"
            )));
        }

        let dir_hint = raw.ends_with('/') || raw.is_empty() || raw == "/";

        let mut segments = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" => continue,
                "." | ".." => {
                    return Err(PathError::Invalid(format!(
                        "dot segment in path: {raw:?}"
                    )))
                }
                s => segments.push(s),
            }
        }

        if segments.is_empty() {
            return Ok(Self::root());
        }

        let mut path = String::with_capacity(raw.len());
        for segment in &segments {
            path.push('/');
            path.push_str(segment);
        }

        Ok(Self { path, dir_hint })
    }

    /// The root path `/`.
    pub fn root() -> Self {
        Self {
            path: "/".to_string(),
            dir_hint: true,
        }
    }

    /// Canonical string form, without a trailing slash (except root).
    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path == "/"
    }

    /// Whether the original input carried a trailing slash.
    pub fn dir_hint(&self) -> bool {
        self.dir_hint
    }

    /// Return the same path with the directory hint set.
    pub fn as_dir(&self) -> Self {
        Self {
            path: self.path.clone(),
            dir_hint: true,
        }
    }

    /// Final path segment, `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.path.rsplit('/').next()
    }

    /// Parent directory, `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.path.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self {
                path: self.path[..idx].to_string(),
                dir_hint: true,
            }),
            None => None,
        }
    }

    /// All strict ancestors from the root down to the immediate parent.
    ///
    /// `/a/b/c` yields `/`, `/a`, `/a/b`.
    pub fn ancestors(&self) -> Vec<Self> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(p) = current {
            current = p.parent();
            out.push(p);
        }
        out.reverse();
        out
    }

    /// Non-empty path segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }

    /// Append a single segment. The segment itself must not contain slashes
    /// or dot segments.
    pub fn join(&self, segment: &str) -> Result<Self, PathError> {
        if segment.is_empty() || segment.contains('/') || segment == "." || segment == ".." {
            return Err(PathError::Invalid(format!(
                "invalid path segment: {segment:?}"
            )));
        }
        let path = if self.is_root() {
            format!("/{segment}")
        } else {
            format!("{}/{segment}", self.path)
        };
        Ok(Self {
            path,
            dir_hint: false,
        })
    }

    /// Segment-boundary-aware prefix test.
    ///
    /// `/team-a` is a prefix of `/team-a/x` and of itself, but not of
    /// `/team-ab`. The root is a prefix of everything.
    pub fn starts_with(&self, prefix: &VirtualPath) -> bool {
        if prefix.is_root() {
            return true;
        }
        if self.path == prefix.path {
            return true;
        }
        self.path.starts_with(&prefix.path)
            && self.path.as_bytes().get(prefix.path.len()) == Some(&b'/')
    }

    /// Strip a mount-path prefix, returning the remainder without a leading
    /// slash. Returns `None` when `prefix` does not cover `self`.
    ///
    /// `/m1/a/b`.strip_prefix(`/m1`) == `a/b`; stripping an equal path
    /// yields the empty string.
    pub fn strip_prefix(&self, prefix: &VirtualPath) -> Option<String> {
        if !self.starts_with(prefix) {
            return None;
        }
        if prefix.is_root() {
            return Some(self.path.trim_start_matches('/').to_string());
        }
        Some(
            self.path[prefix.path.len()..]
                .trim_start_matches('/')
                .to_string(),
        )
    }

    /// Number of segments; the root has depth 0.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl TryFrom<String> for VirtualPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VirtualPath> for String {
    fn from(value: VirtualPath) -> Self {
        value.path
    }
}

impl std::str::FromStr for VirtualPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
