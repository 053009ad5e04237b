//! s3backup CLI - Upload backup dumps to object storage and rotate them
//!
//! Provides commands for:
//! - Uploading a local backup directory (rotating first when enabled)
//! - Rotating local and remote backups on their own
//! - Writing a starter configuration file

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use s3backup_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{init::InitCommand, rotate::RotateCommand, upload::UploadCommand};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "s3backup", version, about = "Upload and rotate database backups in object storage")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Rotate (when enabled) and upload the backup directory
    Upload(UploadCommand),
    /// Apply the retention policy without uploading
    Rotate(RotateCommand),
    /// Write a default configuration file
    Init(InitCommand),
}

/// Installs the global subscriber
///
/// `RUST_LOG` wins, then `-v`, then the configured level. Logs go to stderr
/// so `--json` output on stdout stays machine-readable.
fn init_tracing(verbose: u8, configured: Option<&str>, json: bool) {
    let fallback = match verbose {
        0 => configured.unwrap_or("info"),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    match cli.command {
        Commands::Init(cmd) => {
            init_tracing(cli.verbose, None, cli.json);
            cmd.execute(&config_path, format).await
        }
        Commands::Upload(cmd) => {
            let config = commands::load_config(&config_path)?;
            init_tracing(cli.verbose, Some(&config.logging.level), cli.json);
            cmd.execute(&config, format).await
        }
        Commands::Rotate(cmd) => {
            let config = commands::load_config(&config_path)?;
            init_tracing(cli.verbose, Some(&config.logging.level), cli.json);
            cmd.execute(&config, format).await
        }
    }
}
