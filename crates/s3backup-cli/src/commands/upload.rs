//! Upload command - Rotate (when enabled) and upload the backup directory
//!
//! Retention runs first so rotated-out dumps are never uploaded. Both steps
//! share one counter set and run under one run token (interrupt or
//! `upload.timeout_minutes`). Local deletion failures during rotation fail
//! the command, as they do for `rotate`.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use s3backup_core::config::Config;
use s3backup_core::domain::RunCounters;
use s3backup_sync::{run_retention_with, run_upload_with, SyncError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{open_store, retention_settings, run_token, upload_settings};
use crate::output::{get_formatter, render_upload, OutputFormat};

#[derive(Debug, Args)]
pub struct UploadCommand {
    /// Skip rotation even if retention is enabled
    #[arg(long)]
    pub no_rotate: bool,
}

impl UploadCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let cancel = run_token(config.run_timeout());
        let result = self.run(config, format, &cancel).await;
        cancel.cancel();
        result
    }

    /// Rotation and upload under `cancel`
    async fn run(
        &self,
        config: &Config,
        format: OutputFormat,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let formatter = get_formatter(format);
        let store = open_store(config).await;
        let counters = Arc::new(RunCounters::new());

        let retention = match retention_settings(config, Utc::now()) {
            Some(settings) if !self.no_rotate => {
                let rotation = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(SyncError::Cancelled),
                    report = run_retention_with(
                        Arc::clone(&store),
                        &settings,
                        Arc::clone(&counters),
                    ) => report,
                };
                Some(rotation.context("Rotation failed")?)
            }
            _ => None,
        };

        let settings = upload_settings(config);
        info!(
            local_dir = %settings.root.display(),
            bucket = %settings.bucket,
            prefix = %settings.prefix,
            "Starting upload"
        );

        let report = run_upload_with(store, &settings, counters, cancel).await;

        render_upload(formatter.as_ref(), format, &report, retention.as_ref());

        report.into_result().context("Upload failed")?;

        let rotation_errors = retention.as_ref().map_or(0, |r| r.errors.len());
        if rotation_errors > 0 {
            warn!(count = rotation_errors, "Rotation left backups undeleted");
            bail!("{rotation_errors} backups could not be deleted during rotation");
        }
        Ok(())
    }
}
