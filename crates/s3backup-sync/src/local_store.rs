//! Directory-backed object store adapter (secondary/driven adapter)
//!
//! Implements [`IObjectStore`] over a plain directory, e.g. a mounted
//! network share. Objects live at `<root>/<bucket>/<key>`.
//!
//! ## Design Decisions
//!
//! - **Atomic writes**: objects are written to a temporary sibling and
//!   renamed into place, so a reader never sees a half-written object.
//! - **Multipart staging**: each session stages its parts under
//!   `<root>/.multipart/<upload-id>/`; completion concatenates them in part
//!   order into the final object and removes the staging directory.
//! - **ETags**: hex SHA-256 of the part body. Completion rejects part lists
//!   that are not strictly ascending or whose ETags do not match what was
//!   uploaded, as real object stores do.
//! - **Deletes are idempotent**: removing a missing object succeeds.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use dashmap::DashMap;
use s3backup_core::ports::{CompletedPart, IObjectStore, MultipartHandle};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

/// Name of the staging directory for multipart sessions, directly under the
/// store root. Bucket names may not start with `.` so it cannot collide.
const STAGING_DIR: &str = ".multipart";

/// Parts recorded for one in-progress multipart session
#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    etags: BTreeMap<u32, String>,
}

/// [`IObjectStore`] implementation backed by a local directory
#[derive(Debug)]
pub struct LocalObjectStore {
    root: PathBuf,
    uploads: DashMap<String, PendingUpload>,
}

impl LocalObjectStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            uploads: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of multipart sessions neither completed nor aborted
    pub fn pending_uploads(&self) -> usize {
        self.uploads.len()
    }

    /// Filesystem location of `bucket/key`
    ///
    /// # Errors
    /// Rejects empty or dot-prefixed bucket names and keys that are empty,
    /// absolute, or contain `..` components.
    pub fn object_path(&self, bucket: &str, key: &str) -> anyhow::Result<PathBuf> {
        if bucket.is_empty() || bucket.starts_with('.') || bucket.contains('/') {
            bail!("invalid bucket name {bucket:?}");
        }
        let key_path = Path::new(key);
        if key.is_empty()
            || !key_path
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
        {
            bail!("invalid object key {key:?}");
        }
        Ok(self.root.join(bucket).join(key_path))
    }

    fn staging_dir(&self, upload_id: &str) -> PathBuf {
        self.root.join(STAGING_DIR).join(upload_id)
    }

    fn part_path(&self, upload_id: &str, part_number: u32) -> PathBuf {
        self.staging_dir(upload_id)
            .join(format!("part-{part_number:05}"))
    }

    fn check_handle(&self, handle: &MultipartHandle) -> anyhow::Result<()> {
        let upload = self
            .uploads
            .get(&handle.upload_id)
            .ok_or_else(|| anyhow!("no such upload: {}", handle.upload_id))?;
        if upload.bucket != handle.bucket || upload.key != handle.key {
            bail!("upload {} belongs to {}/{}", handle.upload_id, upload.bucket, upload.key);
        }
        Ok(())
    }
}

/// Temporary sibling of `target`, unique per write
fn temp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
}

async fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

fn etag_of(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

#[async_trait::async_trait]
impl IObjectStore for LocalObjectStore {
    async fn exists(&self, bucket: &str, key: &str) -> anyhow::Result<bool> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("stat {}", path.display())),
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, bucket: &str, key: &str) -> anyhow::Result<()> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("object deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("object already absent");
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }

    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> anyhow::Result<()> {
        let target = self.object_path(bucket, key)?;
        ensure_parent(&target).await?;

        let tmp = temp_path(&target);
        tokio::fs::write(&tmp, data)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("renaming into {}", target.display()));
        }

        debug!("object written");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
    ) -> anyhow::Result<MultipartHandle> {
        self.object_path(bucket, key)?;

        let upload_id = uuid::Uuid::new_v4().simple().to_string();
        let staging = self.staging_dir(&upload_id);
        tokio::fs::create_dir_all(&staging)
            .await
            .with_context(|| format!("creating {}", staging.display()))?;

        self.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                etags: BTreeMap::new(),
            },
        );

        debug!(%upload_id, "multipart upload initiated");
        Ok(MultipartHandle {
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id,
        })
    }

    #[instrument(skip(self, handle, data), fields(upload_id = %handle.upload_id, bytes = data.len()))]
    async fn upload_part(
        &self,
        handle: &MultipartHandle,
        part_number: u32,
        data: &[u8],
    ) -> anyhow::Result<String> {
        if part_number == 0 {
            bail!("part numbers start at 1");
        }
        self.check_handle(handle)?;

        let path = self.part_path(&handle.upload_id, part_number);
        tokio::fs::write(&path, data)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        let etag = etag_of(data);
        match self.uploads.get_mut(&handle.upload_id) {
            Some(mut upload) => {
                upload.etags.insert(part_number, etag.clone());
            }
            None => bail!("upload {} was aborted while part {part_number} was written", handle.upload_id),
        }

        Ok(etag)
    }

    #[instrument(skip(self, handle, parts), fields(upload_id = %handle.upload_id, parts = parts.len()))]
    async fn complete_multipart(
        &self,
        handle: &MultipartHandle,
        parts: &[CompletedPart],
    ) -> anyhow::Result<()> {
        if parts.is_empty() {
            bail!("a multipart upload needs at least one part");
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            bail!("parts must be listed in strictly ascending order");
        }
        self.check_handle(handle)?;
        {
            let upload = self
                .uploads
                .get(&handle.upload_id)
                .ok_or_else(|| anyhow!("no such upload: {}", handle.upload_id))?;
            for part in parts {
                match upload.etags.get(&part.part_number) {
                    Some(etag) if *etag == part.etag => {}
                    Some(_) => bail!("ETag mismatch for part {}", part.part_number),
                    None => bail!("part {} was never uploaded", part.part_number),
                }
            }
        }

        let target = self.object_path(&handle.bucket, &handle.key)?;
        ensure_parent(&target).await?;
        let tmp = temp_path(&target);

        let assembled = async {
            let mut out = tokio::fs::File::create(&tmp).await?;
            for part in parts {
                let body = tokio::fs::read(self.part_path(&handle.upload_id, part.part_number)).await?;
                out.write_all(&body).await?;
            }
            out.flush().await?;
            out.sync_all().await?;
            tokio::fs::rename(&tmp, &target).await
        }
        .await;
        if let Err(e) = assembled {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("assembling {}", target.display()));
        }

        self.uploads.remove(&handle.upload_id);
        let _ = tokio::fs::remove_dir_all(self.staging_dir(&handle.upload_id)).await;
        debug!("multipart upload completed");
        Ok(())
    }

    #[instrument(skip(self, handle), fields(upload_id = %handle.upload_id))]
    async fn abort_multipart(&self, handle: &MultipartHandle) -> anyhow::Result<()> {
        self.check_handle(handle)?;
        self.uploads.remove(&handle.upload_id);

        let staging = self.staging_dir(&handle.upload_id);
        match tokio::fs::remove_dir_all(&staging).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("removing {}", staging.display())),
        }

        debug!("multipart upload aborted");
        Ok(())
    }
}
