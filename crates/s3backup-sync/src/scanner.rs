//! Directory scanner
//!
//! Recursively lists the regular files under a root. Symbolic links and
//! directories themselves are never yielded; symlinked directories are not
//! followed. Any unreadable directory or entry aborts the whole scan and
//! the partial listing is dropped. Order is filesystem traversal order.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use s3backup_core::domain::FileDescriptor;
use tracing::debug;

use crate::{SyncError, SyncResult};

/// Lists every regular file under `root`
///
/// # Errors
/// Returns `SyncError::Scan` if `root` or any directory below it cannot be
/// read, or if an entry cannot be stat'd.
#[tracing::instrument]
pub async fn scan(root: &Path) -> SyncResult<Vec<FileDescriptor>> {
    let mut files = Vec::new();
    walk_directory(root, &mut files).await?;
    debug!(count = files.len(), "scan complete");
    Ok(files)
}

fn scan_error(path: &Path) -> impl FnOnce(std::io::Error) -> SyncError + '_ {
    move |source| SyncError::Scan {
        path: path.to_path_buf(),
        source,
    }
}

fn walk_directory<'a>(
    dir: &'a Path,
    files: &'a mut Vec<FileDescriptor>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = SyncResult<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(dir).await.map_err(scan_error(dir))?;

        while let Some(entry) = entries.next_entry().await.map_err(scan_error(dir))? {
            let path = entry.path();
            // file_type() does not follow symlinks
            let file_type = entry.file_type().await.map_err(scan_error(&path))?;

            if file_type.is_dir() {
                walk_directory(&path, files).await?;
            } else if file_type.is_file() {
                let metadata = entry.metadata().await.map_err(scan_error(&path))?;
                let modified: DateTime<Utc> = metadata.modified().map_err(scan_error(&path))?.into();
                let name = entry.file_name().to_string_lossy().into_owned();
                files.push(FileDescriptor::new(name, PathBuf::from(&path), modified));
            } else {
                debug!(path = %path.display(), "skipping non-regular entry");
            }
        }

        Ok(())
    })
}
