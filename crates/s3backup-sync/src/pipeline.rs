//! Pipeline entry points
//!
//! [`run_upload`] composes scanner, path mapper and transfer engine under a
//! [`WorkerPool`]; [`run_retention`] composes scanner, candidate filter and
//! retention engine. Each receives exactly the settings it needs.

use std::path::PathBuf;
use std::sync::Arc;

use s3backup_core::domain::{
    CountersSnapshot, Grouping, PathMapper, RemotePrefix, RetentionPolicy, RunCounters, TransferTask,
};
use s3backup_core::ports::IObjectStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::pool::WorkerPool;
use crate::retention::{RetentionEngine, RetentionReport};
use crate::scanner::scan;
use crate::transfer::{TransferEngine, TransferOptions, TransferOutcome};
use crate::{SyncError, SyncResult};

/// Everything [`run_upload`] needs to know
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub root: PathBuf,
    pub prefix: RemotePrefix,
    pub bucket: String,
    /// Files uploaded concurrently
    pub file_concurrency: usize,
    pub transfer: TransferOptions,
}

/// Counters of an upload run plus the first fatal error, if any
///
/// Counters are populated even when the run failed.
#[derive(Debug)]
pub struct UploadReport {
    pub counters: CountersSnapshot,
    pub error: Option<SyncError>,
}

impl UploadReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> SyncResult<CountersSnapshot> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.counters),
        }
    }
}

/// Uploads every file under `settings.root` that is not yet in the bucket
///
/// The first failing file cancels the rest of the run; its error is
/// reported alongside the counters accumulated up to that point.
pub async fn run_upload(
    store: Arc<dyn IObjectStore>,
    settings: &UploadSettings,
    cancel: &CancellationToken,
) -> UploadReport {
    run_upload_with(store, settings, Arc::new(RunCounters::new()), cancel).await
}

/// [`run_upload`] accumulating into caller-owned counters
///
/// Lets a rotation and an upload of the same run share one counter set.
#[tracing::instrument(skip_all, fields(root = %settings.root.display(), prefix = %settings.prefix))]
pub async fn run_upload_with(
    store: Arc<dyn IObjectStore>,
    settings: &UploadSettings,
    counters: Arc<RunCounters>,
    cancel: &CancellationToken,
) -> UploadReport {
    let files = match scan(&settings.root).await {
        Ok(files) => files,
        Err(err) => {
            return UploadReport {
                counters: counters.snapshot(),
                error: Some(err),
            }
        }
    };
    info!(files = files.len(), "starting upload");

    let mapper = Arc::new(PathMapper::new(&settings.root, settings.prefix.clone()));
    let engine = Arc::new(TransferEngine::new(store, &settings.bucket, settings.transfer));

    let pool = WorkerPool::new(settings.file_concurrency);
    let report = pool
        .run(files, cancel, {
            let counters = Arc::clone(&counters);
            move |file, file_cancel| {
                let mapper = Arc::clone(&mapper);
                let engine = Arc::clone(&engine);
                let counters = Arc::clone(&counters);
                async move {
                    let key = mapper.to_key(file.path())?;
                    let task = TransferTask::new(file, key);
                    match engine.transfer(&task, &file_cancel).await? {
                        TransferOutcome::Uploaded { .. } => counters.record_uploaded(),
                        TransferOutcome::Skipped(_) => counters.record_skipped(),
                    }
                    Ok(())
                }
            }
        })
        .await;

    let counters = counters.snapshot();
    let abandoned = report.abandoned();
    let error = report.first_error;
    match &error {
        None => info!(
            uploaded = counters.uploaded,
            skipped = counters.skipped,
            "upload finished"
        ),
        Some(err) => warn!(
            uploaded = counters.uploaded,
            skipped = counters.skipped,
            failed = report.failed,
            abandoned,
            error = %err,
            "upload failed"
        ),
    }

    UploadReport { counters, error }
}

/// Everything [`run_retention`] needs to know
#[derive(Debug, Clone)]
pub struct RetentionSettings {
    pub root: PathBuf,
    pub prefix: RemotePrefix,
    pub bucket: String,
    pub policy: RetentionPolicy,
    pub grouping: Grouping,
    /// Glob a file name must match to be considered, e.g. `*.sql.gz`
    pub pattern: String,
}

/// Rotates the backups under `settings.root` and their remote copies
///
/// # Errors
/// Fails only if the directory cannot be scanned or the pattern is not a
/// valid glob; per-file problems are collected in the report.
pub async fn run_retention(
    store: Arc<dyn IObjectStore>,
    settings: &RetentionSettings,
) -> SyncResult<RetentionReport> {
    run_retention_with(store, settings, Arc::new(RunCounters::new())).await
}

/// [`run_retention`] counting local deletions into caller-owned counters
#[tracing::instrument(skip_all, fields(root = %settings.root.display(), pattern = %settings.pattern))]
pub async fn run_retention_with(
    store: Arc<dyn IObjectStore>,
    settings: &RetentionSettings,
    counters: Arc<RunCounters>,
) -> SyncResult<RetentionReport> {
    let pattern = glob::Pattern::new(&settings.pattern).map_err(|e| {
        SyncError::Path(s3backup_core::domain::DomainError::ValidationFailed(format!(
            "invalid retention pattern {:?}: {e}",
            settings.pattern
        )))
    })?;

    let candidates: Vec<_> = scan(&settings.root)
        .await?
        .into_iter()
        .filter(|file| pattern.matches(file.name()))
        .collect();
    info!(candidates = candidates.len(), "starting rotation");

    let engine = RetentionEngine::new(
        store,
        &settings.bucket,
        PathMapper::new(&settings.root, settings.prefix.clone()),
    )
    .with_counters(counters);
    Ok(engine
        .rotate(candidates, settings.policy, settings.grouping)
        .await)
}
