//! s3backup Sync - Upload pipeline and retention engine
//!
//! Provides:
//! - Directory scanning into file descriptors
//! - A bounded worker pool with fail-fast cancellation
//! - Single-shot and multipart transfers with guaranteed session cleanup
//! - Count- and age-based rotation of local and remote backups
//!
//! ## Modules
//!
//! - [`scanner`] - Recursive listing of regular files under a root
//! - [`pool`] - Bounded fan-out over independent units of work
//! - [`transfer`] - Per-file upload strategy and multipart sessions
//! - [`retention`] - Deletion planning and local-then-remote removal
//! - [`pipeline`] - `run_upload` / `run_retention` entry points
//! - [`local_store`] - Directory-backed [`IObjectStore`](s3backup_core::ports::IObjectStore) adapter
//! - [`s3_store`] - AWS SDK backed adapter for S3-compatible endpoints

pub mod local_store;
pub mod pipeline;
pub mod pool;
pub mod retention;
pub mod s3_store;
pub mod scanner;
pub mod transfer;

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while uploading or rotating backups
#[derive(Debug, Error)]
pub enum SyncError {
    /// The scan root or one of its entries could not be read
    #[error("Scan failed at {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be mapped to an object key
    #[error("Path error: {0}")]
    Path(#[from] s3backup_core::domain::DomainError),

    /// The object store rejected or failed an operation
    #[error("{operation} failed for {key}: {source:#}")]
    Transfer {
        operation: &'static str,
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Opening, reading or inspecting a local file failed
    #[error("Local I/O error on {path}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A retention candidate could not be deleted locally
    #[error("Failed to delete {path}: {source}")]
    RetentionDelete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A multipart upload finished with fewer recorded parts than planned
    #[error("Multipart upload of {key} recorded {recorded} of {planned} parts")]
    MissingParts {
        key: String,
        recorded: usize,
        planned: usize,
    },

    /// The run was cancelled (sibling failure, deadline or interrupt)
    #[error("Cancelled")]
    Cancelled,

    /// A worker task panicked or was aborted
    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl SyncError {
    pub(crate) fn transfer(
        operation: &'static str,
        key: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        Self::Transfer {
            operation,
            key: key.into(),
            source,
        }
    }

    pub(crate) fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// Whether this error only reports that the work was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

pub use pipeline::{
    run_retention, run_retention_with, run_upload, run_upload_with, RetentionSettings, UploadReport,
    UploadSettings,
};
pub use local_store::LocalObjectStore;
pub use pool::{PoolReport, WorkerPool};
pub use retention::{GroupSummary, RetentionEngine, RetentionReport};
pub use s3_store::S3ObjectStore;
pub use transfer::{SkipReason, TransferEngine, TransferOptions, TransferOutcome};
