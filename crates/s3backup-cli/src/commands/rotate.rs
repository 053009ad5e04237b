//! Rotate command - Apply the retention policy to local and remote backups

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use s3backup_core::config::{Config, MAX_KEEP_DAYS};
use s3backup_core::domain::{Grouping, RetentionPolicy};
use s3backup_sync::run_retention;

use super::{open_store, retention_settings};
use crate::output::{get_formatter, render_retention, OutputFormat};

#[derive(Debug, Args)]
pub struct RotateCommand {
    /// Keep the N newest backups per group, overriding the config
    #[arg(long, value_name = "N", conflicts_with = "keep_days")]
    pub keep_last: Option<usize>,

    /// Delete backups older than DAYS, overriding the config
    #[arg(long, value_name = "DAYS")]
    pub keep_days: Option<u32>,
}

impl RotateCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let now = Utc::now();

        let mut config = config.clone();
        if self.keep_last.is_some() || self.keep_days.is_some() {
            config.retention.enabled = true;
        }
        let Some(mut settings) = retention_settings(&config, now) else {
            formatter.warn("Retention is disabled; nothing to rotate");
            return Ok(());
        };

        match (self.keep_last, self.keep_days) {
            (Some(0), _) | (_, Some(0)) => bail!("Retention overrides must be greater than 0"),
            (_, Some(days)) if days > MAX_KEEP_DAYS => {
                bail!("--keep-days must be at most {MAX_KEEP_DAYS}")
            }
            (Some(n), _) => {
                settings.policy = RetentionPolicy::KeepLast(n);
                settings.grouping = config.retention.grouping;
            }
            (_, Some(days)) => {
                settings.policy = RetentionPolicy::keep_days(days, now);
                settings.grouping = Grouping::None;
            }
            (None, None) => {}
        }

        let report = run_retention(open_store(&config).await, &settings)
            .await
            .context("Rotation failed")?;
        render_retention(formatter.as_ref(), format, &report);

        if report.is_success() {
            Ok(())
        } else {
            bail!("{} backups could not be deleted", report.errors.len())
        }
    }
}
