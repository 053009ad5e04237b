//! CLI command implementations and the wiring they share

pub mod init;
pub mod rotate;
pub mod upload;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use s3backup_core::config::{Config, StorageBackend};
use s3backup_core::ports::IObjectStore;
use s3backup_sync::{
    LocalObjectStore, RetentionSettings, S3ObjectStore, TransferOptions, UploadSettings,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Loads, validates and prepares the configuration at `path`
pub fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    let errors = config.validate();
    if !errors.is_empty() {
        let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
        bail!("Invalid configuration in {}:\n  {}", path.display(), details.join("\n  "));
    }

    config.ensure_local_dir()?;
    Ok(config)
}

/// The object store the configuration points at
pub async fn open_store(config: &Config) -> Arc<dyn IObjectStore> {
    match config.storage.backend {
        StorageBackend::S3 => Arc::new(S3ObjectStore::connect(&config.aws).await),
        StorageBackend::Local => Arc::new(LocalObjectStore::new(&config.storage.root)),
    }
}

pub fn upload_settings(config: &Config) -> UploadSettings {
    UploadSettings {
        root: config.local_dir.clone(),
        prefix: config.remote_prefix(),
        bucket: config.storage.bucket.clone(),
        file_concurrency: config.upload.file_concurrency,
        transfer: TransferOptions {
            part_size: config.part_size_bytes(),
            part_concurrency: config.upload.part_concurrency,
        },
    }
}

/// Retention settings at `now`, or `None` when rotation is disabled
pub fn retention_settings(config: &Config, now: DateTime<Utc>) -> Option<RetentionSettings> {
    let policy = config.retention_policy(now)?;
    Some(RetentionSettings {
        root: config.local_dir.clone(),
        prefix: config.remote_prefix(),
        bucket: config.storage.bucket.clone(),
        policy,
        grouping: config.retention_grouping(),
        pattern: config.retention.pattern.clone(),
    })
}

/// Root token for one run
///
/// Cancelled on SIGINT/SIGTERM or once `timeout` elapses. Callers cancel it
/// themselves when the run is over, which also stops both watchers.
pub fn run_token(timeout: Duration) -> CancellationToken {
    let token = CancellationToken::new();

    tokio::spawn(shutdown_signal(token.clone()));

    let deadline = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = deadline.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                warn!(timeout_secs = timeout.as_secs(), "Run timeout reached, cancelling");
                deadline.cancel();
            }
        }
    });

    token
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = token.cancelled() => return,
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), cancelling run");
        }
        _ = terminate => {
            info!("Received SIGTERM, cancelling run");
        }
    }

    token.cancel();
}
