//! Scanned file descriptors and the unit of upload work

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::object_key::ObjectKey;

/// A regular file discovered by a directory scan
///
/// Produced once per scan and never mutated afterwards. Size is not
/// captured here: the transfer engine stats the file itself so that a
/// file truncated between scan and upload is observed as it really is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    name: String,
    path: PathBuf,
    modified_at: DateTime<Utc>,
}

impl FileDescriptor {
    /// Creates a descriptor for the file at `path`
    pub fn new(name: impl Into<String>, path: PathBuf, modified_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            path,
            modified_at,
        }
    }

    /// File name (last path component)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path on the local filesystem
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last modification time as reported by the filesystem
    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }
}

/// One file to upload together with its derived object key
#[derive(Debug, Clone)]
pub struct TransferTask {
    /// The local file
    pub file: FileDescriptor,
    /// Destination key in the bucket
    pub key: ObjectKey,
}

impl TransferTask {
    pub fn new(file: FileDescriptor, key: ObjectKey) -> Self {
        Self { file, key }
    }
}
