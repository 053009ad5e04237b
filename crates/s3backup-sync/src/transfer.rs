//! Per-file transfer engine
//!
//! [`TransferEngine::transfer`] uploads one file to its object key:
//!
//! 1. Stat the file; a zero-length file is skipped without contacting the
//!    store.
//! 2. Ask the store whether the key already exists; existing objects are
//!    skipped, which makes repeated runs idempotent.
//! 3. Files up to `part_size` bytes go up in a single PUT. Larger files are
//!    split into parts uploaded concurrently through a [`WorkerPool`], then
//!    completed in ascending part order.
//!
//! A multipart session is always finished: completion on success, abort on
//! every failure path. Abort runs under its own timeout so it still happens
//! after cancellation, and its failure is only logged. If the transfer future
//! itself is dropped mid-session, the session's `Drop` spawns the abort.
//!
//! Failures are never retried here.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use s3backup_core::domain::{plan_parts, PartPlan, TransferTask, DEFAULT_PART_SIZE};
use s3backup_core::ports::{CompletedPart, IObjectStore, MultipartHandle};
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pool::WorkerPool;
use crate::{SyncError, SyncResult};

/// Upper bound on a best-effort multipart abort
pub const ABORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Tuning for a [`TransferEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    /// Files larger than this are uploaded in parts of this size
    pub part_size: u64,
    /// Parts of one file in flight at once
    pub part_concurrency: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            part_concurrency: 5,
        }
    }
}

/// Why a file was not uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// An object already exists under the key
    AlreadyExists,
    /// The file is empty
    EmptyFile,
}

/// Successful result of one transfer; failures are `Err`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The object was written; `parts` is 1 for a single PUT
    Uploaded { parts: usize },
    Skipped(SkipReason),
}

/// Uploads files to one bucket of an [`IObjectStore`]
#[derive(Clone)]
pub struct TransferEngine {
    store: Arc<dyn IObjectStore>,
    bucket: String,
    options: TransferOptions,
}

impl std::fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferEngine")
            .field("bucket", &self.bucket)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn ensure_active(cancel: &CancellationToken) -> SyncResult<()> {
    if cancel.is_cancelled() {
        Err(SyncError::Cancelled)
    } else {
        Ok(())
    }
}

impl TransferEngine {
    pub fn new(store: Arc<dyn IObjectStore>, bucket: impl Into<String>, options: TransferOptions) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            options,
        }
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// Uploads `task.file` to `task.key` unless it is empty or already stored
    #[tracing::instrument(skip(self, task, cancel), fields(key = %task.key))]
    pub async fn transfer(
        &self,
        task: &TransferTask,
        cancel: &CancellationToken,
    ) -> SyncResult<TransferOutcome> {
        let path = task.file.path();
        let key = task.key.as_str();

        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| SyncError::local_io(path, e))?
            .len();
        if size == 0 {
            debug!("empty file, skipping");
            return Ok(TransferOutcome::Skipped(SkipReason::EmptyFile));
        }

        ensure_active(cancel)?;
        let exists = self
            .store
            .exists(&self.bucket, key)
            .await
            .map_err(|e| SyncError::transfer("exists", key, e))?;
        if exists {
            debug!("object already exists, skipping");
            return Ok(TransferOutcome::Skipped(SkipReason::AlreadyExists));
        }

        let parts = if size <= self.options.part_size {
            self.put_single(path, key, cancel).await?;
            1
        } else {
            self.put_multipart(path, key, size, cancel).await?
        };

        info!(size, parts, "uploaded");
        Ok(TransferOutcome::Uploaded { parts })
    }

    async fn put_single(&self, path: &Path, key: &str, cancel: &CancellationToken) -> SyncResult<()> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| SyncError::local_io(path, e))?;

        ensure_active(cancel)?;
        self.store
            .put_object(&self.bucket, key, &data)
            .await
            .map_err(|e| SyncError::transfer("put_object", key, e))
    }

    async fn put_multipart(
        &self,
        path: &Path,
        key: &str,
        size: u64,
        cancel: &CancellationToken,
    ) -> SyncResult<usize> {
        let plans = plan_parts(size, self.options.part_size)?;
        let planned = plans.len();

        // Surface an unreadable file before any session exists
        tokio::fs::File::open(path)
            .await
            .map_err(|e| SyncError::local_io(path, e))?;

        ensure_active(cancel)?;
        let handle = self
            .store
            .initiate_multipart(&self.bucket, key)
            .await
            .map_err(|e| SyncError::transfer("initiate_multipart", key, e))?;
        debug!(upload_id = %handle.upload_id, planned, "multipart session started");

        let session = Arc::new(MultipartSession::new(Arc::clone(&self.store), handle));

        let uploaded = self
            .upload_parts(Arc::clone(&session), path.to_path_buf(), plans, cancel)
            .await;
        let finished = match uploaded {
            Ok(()) => session.complete(planned).await,
            Err(err) => Err(err),
        };

        match finished {
            Ok(()) => Ok(planned),
            Err(err) => {
                session.abort().await;
                Err(err)
            }
        }
    }

    async fn upload_parts(
        &self,
        session: Arc<MultipartSession>,
        path: PathBuf,
        plans: Vec<PartPlan>,
        cancel: &CancellationToken,
    ) -> SyncResult<()> {
        let pool = WorkerPool::new(self.options.part_concurrency);
        let report = pool
            .run(plans, cancel, move |plan, part_cancel| {
                let session = Arc::clone(&session);
                let path = path.clone();
                async move { session.upload_part(&path, plan, &part_cancel).await }
            })
            .await;

        report.into_result().map(|_| ())
    }
}

/// Reads exactly `plan.length` bytes at `plan.offset`
async fn read_range(path: &Path, plan: PartPlan) -> SyncResult<Vec<u8>> {
    let io_err = |e| SyncError::local_io(path, e);

    let mut file = tokio::fs::File::open(path).await.map_err(io_err)?;
    file.seek(SeekFrom::Start(plan.offset)).await.map_err(io_err)?;

    let length = usize::try_from(plan.length).map_err(|_| {
        SyncError::local_io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "part too large for memory"),
        )
    })?;
    let mut buf = vec![0u8; length];
    file.read_exact(&mut buf).await.map_err(io_err)?;
    Ok(buf)
}

// ============================================================================
// MultipartSession
// ============================================================================

/// One store-side multipart upload and the parts recorded so far
///
/// Parts are recorded keyed by part number, so arrival order does not
/// matter. The session must end in exactly one of [`complete`](Self::complete)
/// or [`abort`](Self::abort); if it is dropped before either, an abort is
/// spawned on the current runtime.
struct MultipartSession {
    store: Arc<dyn IObjectStore>,
    handle: MultipartHandle,
    parts: DashMap<u32, String>,
    finished: AtomicBool,
}

impl MultipartSession {
    fn new(store: Arc<dyn IObjectStore>, handle: MultipartHandle) -> Self {
        Self {
            store,
            handle,
            parts: DashMap::new(),
            finished: AtomicBool::new(false),
        }
    }

    async fn upload_part(
        &self,
        path: &Path,
        plan: PartPlan,
        cancel: &CancellationToken,
    ) -> SyncResult<()> {
        let data = read_range(path, plan).await?;

        ensure_active(cancel)?;
        let etag = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            result = self.store.upload_part(&self.handle, plan.part_number, &data) => {
                result.map_err(|e| SyncError::transfer("upload_part", self.handle.key.clone(), e))?
            }
        };

        debug!(part = plan.part_number, "part uploaded");
        self.parts.insert(plan.part_number, etag);
        Ok(())
    }

    /// Recorded parts ordered by part number
    fn completed_parts(&self) -> Vec<CompletedPart> {
        let mut parts: Vec<CompletedPart> = self
            .parts
            .iter()
            .map(|entry| CompletedPart {
                part_number: *entry.key(),
                etag: entry.value().clone(),
            })
            .collect();
        parts.sort();
        parts
    }

    async fn complete(&self, planned: usize) -> SyncResult<()> {
        let parts = self.completed_parts();
        if parts.len() != planned {
            return Err(SyncError::MissingParts {
                key: self.handle.key.clone(),
                recorded: parts.len(),
                planned,
            });
        }

        self.store
            .complete_multipart(&self.handle, &parts)
            .await
            .map_err(|e| SyncError::transfer("complete_multipart", self.handle.key.clone(), e))?;
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Best-effort abort; failures are logged and never returned
    async fn abort(&self) {
        self.finished.store(true, Ordering::SeqCst);
        abort_with_timeout(self.store.as_ref(), &self.handle).await;
    }
}

impl Drop for MultipartSession {
    fn drop(&mut self) {
        if self.finished.load(Ordering::SeqCst) {
            return;
        }
        let store = Arc::clone(&self.store);
        let handle = self.handle.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(upload = %handle, "session dropped unfinished, aborting");
                runtime.spawn(async move {
                    abort_with_timeout(store.as_ref(), &handle).await;
                });
            }
            Err(_) => warn!(upload = %handle, "no runtime to abort dropped multipart session"),
        }
    }
}

async fn abort_with_timeout(store: &dyn IObjectStore, handle: &MultipartHandle) {
    match tokio::time::timeout(ABORT_TIMEOUT, store.abort_multipart(handle)).await {
        Ok(Ok(())) => debug!(upload = %handle, "multipart upload aborted"),
        Ok(Err(e)) => warn!(upload = %handle, error = %format!("{e:#}"), "failed to abort multipart upload"),
        Err(_) => warn!(upload = %handle, "timed out aborting multipart upload"),
    }
}
