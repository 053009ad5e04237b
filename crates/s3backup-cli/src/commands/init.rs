//! Init command - Write a starter configuration file

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use s3backup_core::config::ConfigBuilder;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct InitCommand {
    /// Overwrite an existing configuration file
    #[arg(long)]
    pub force: bool,
}

impl InitCommand {
    pub async fn execute(&self, path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        if path.exists() && !self.force {
            bail!(
                "{} already exists; use --force to overwrite it",
                path.display()
            );
        }

        let config = ConfigBuilder::new().bucket("backups").build();
        let yaml = config.to_yaml()?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!(path = %path.display(), "Wrote default configuration");
        formatter.success(&format!("Configuration written to {}", path.display()));
        formatter.print_json(&serde_json::json!({
            "success": true,
            "path": path.display().to_string(),
        }));
        Ok(())
    }
}
