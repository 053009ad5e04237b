//! Object keys and the local-path-to-key mapping
//!
//! A key is always `prefix + "/" + relative path`, with forward slashes
//! regardless of the local separator. The prefix is normalized once when
//! it is constructed, never per call.

use std::fmt::{self, Display, Formatter};
use std::path::{Component, Path, PathBuf};

use super::errors::DomainError;

// ============================================================================
// RemotePrefix
// ============================================================================

/// Normalized remote directory prefix
///
/// Leading and trailing `/` are stripped, so `"/db/"`, `"db"` and `"//db"`
/// all become `"db"`. An empty prefix maps files to the bucket root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemotePrefix(String);

impl RemotePrefix {
    /// Normalize a configured remote directory
    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self(raw.trim_start_matches('/').trim_end_matches('/').to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for RemotePrefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RemotePrefix {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

// ============================================================================
// ObjectKey
// ============================================================================

/// Identifier of an object within a bucket
///
/// A pure projection of a file path and a prefix; never stored on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Wrap an already-derived key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// PathMapper
// ============================================================================

/// Maps files under a local root to object keys under a remote prefix
#[derive(Debug, Clone)]
pub struct PathMapper {
    root: PathBuf,
    prefix: RemotePrefix,
}

impl PathMapper {
    pub fn new(root: impl Into<PathBuf>, prefix: RemotePrefix) -> Self {
        Self {
            root: root.into(),
            prefix,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn prefix(&self) -> &RemotePrefix {
        &self.prefix
    }

    /// Derive the object key for `path`
    ///
    /// # Errors
    /// Returns `DomainError::PathNotUnderRoot` if `path` is not strictly
    /// below the root (including paths that escape it through `..`), and
    /// `DomainError::NonUtf8Path` if a component is not valid UTF-8.
    pub fn to_key(&self, path: &Path) -> Result<ObjectKey, DomainError> {
        let not_under_root = || DomainError::PathNotUnderRoot {
            path: path.display().to_string(),
            root: self.root.display().to_string(),
        };

        let relative = path.strip_prefix(&self.root).map_err(|_| not_under_root())?;

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => {
                    let segment = segment
                        .to_str()
                        .ok_or_else(|| DomainError::NonUtf8Path(path.display().to_string()))?;
                    segments.push(segment);
                }
                Component::CurDir => {}
                _ => return Err(not_under_root()),
            }
        }

        if segments.is_empty() {
            return Err(not_under_root());
        }

        let relative_key = segments.join("/");
        let key = if self.prefix.is_empty() {
            relative_key
        } else {
            format!("{}/{}", self.prefix, relative_key)
        };

        Ok(ObjectKey(key))
    }
}
