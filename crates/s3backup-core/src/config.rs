//! Configuration module for s3backup.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, normalization, validation, defaults, and a builder for
//! programmatic use. Components never read this struct directly; the binary
//! hands each one the values it needs.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::object_key::RemotePrefix;
use crate::domain::parts::MIN_PART_SIZE;
use crate::domain::retention::{Grouping, RetentionPolicy};

const MIB: u64 = 1024 * 1024;

/// Largest part object stores accept (5 GiB); single-shot uploads buffer
/// up to one part in memory.
pub const MAX_PART_SIZE_MB: u64 = 5 * 1024;
/// Upper bound for `upload.timeout_minutes` (one week).
pub const MAX_TIMEOUT_MINUTES: u64 = 7 * 24 * 60;
/// Upper bound for `retention.keep_days` (about a century).
pub const MAX_KEEP_DAYS: u32 = 36_500;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for s3backup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    /// S3 connection settings, used when `storage.backend` is `s3`.
    #[serde(default)]
    pub aws: AwsConfig,
    /// Local directory whose files are uploaded and rotated.
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,
    /// Remote directory (key prefix) inside the bucket.
    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which object store adapter the binary talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// An S3-compatible endpoint, configured under `aws`.
    #[default]
    S3,
    /// A directory on local or mounted storage.
    Local,
}

/// Object store selection and destination bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Destination bucket.
    pub bucket: String,
    /// Directory backing the `local` backend.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

/// S3 endpoint and credentials.
///
/// Credentials are optional as a pair; when both are absent the standard
/// AWS provider chain (environment, profile, instance metadata) is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    /// Custom endpoint for S3-compatible services, e.g. `https://minio:9000`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`.
    #[serde(default = "default_force_path_style")]
    pub force_path_style: bool,
}

/// Upload pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Files uploaded concurrently.
    pub file_concurrency: usize,
    /// Files larger than this (in MiB) are uploaded in parts of this size.
    pub part_size_mb: u64,
    /// Parts of one file uploaded concurrently.
    pub part_concurrency: usize,
    /// Wall-clock ceiling for a whole run, in minutes.
    pub timeout_minutes: u64,
}

/// Which retention policy to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicyKind {
    KeepLast,
    KeepDays,
}

/// Retention / rotation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    pub enabled: bool,
    pub policy: RetentionPolicyKind,
    /// Files kept per group when `policy` is `keep_last`.
    pub keep_last: u32,
    /// Age in days beyond which files are deleted when `policy` is `keep_days`.
    pub keep_days: u32,
    pub grouping: Grouping,
    /// Glob selecting the files that take part in rotation.
    pub pattern: String,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    ///
    /// `remote_dir` is normalized here, once, so that every key derived from
    /// it is free of leading separators.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.normalize();
        Ok(config)
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/s3backup/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("s3backup")
            .join("config.yaml")
    }

    /// Serialize to YAML, e.g. for `s3backup init`.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn normalize(&mut self) {
        self.remote_dir = RemotePrefix::new(&self.remote_dir).as_str().to_string();
        if let Some(endpoint) = &mut self.aws.endpoint {
            let trimmed = endpoint.trim_end_matches('/').len();
            endpoint.truncate(trimmed);
        }
    }

    /// Create `local_dir` if it does not exist yet.
    pub fn ensure_local_dir(&self) -> anyhow::Result<()> {
        if !self.local_dir.exists() {
            std::fs::create_dir_all(&self.local_dir)?;
        }
        if !self.local_dir.is_dir() {
            anyhow::bail!("local_dir {} is not a directory", self.local_dir.display());
        }
        Ok(())
    }

    // --- values handed to the engine ---

    pub fn remote_prefix(&self) -> RemotePrefix {
        RemotePrefix::new(&self.remote_dir)
    }

    pub fn part_size_bytes(&self) -> u64 {
        self.upload.part_size_mb.saturating_mul(MIB)
    }

    pub fn run_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.upload.timeout_minutes.saturating_mul(60))
    }

    /// The retention policy to apply at `now`, or `None` when rotation is off.
    pub fn retention_policy(&self, now: DateTime<Utc>) -> Option<RetentionPolicy> {
        if !self.retention.enabled {
            return None;
        }
        match self.retention.policy {
            RetentionPolicyKind::KeepLast if self.retention.keep_last > 0 => {
                Some(RetentionPolicy::KeepLast(self.retention.keep_last as usize))
            }
            RetentionPolicyKind::KeepDays if self.retention.keep_days > 0 => {
                Some(RetentionPolicy::keep_days(self.retention.keep_days, now))
            }
            _ => None,
        }
    }

    /// Grouping only applies to count-based rotation.
    pub fn retention_grouping(&self) -> Grouping {
        match self.retention.policy {
            RetentionPolicyKind::KeepLast => self.retention.grouping,
            RetentionPolicyKind::KeepDays => Grouping::None,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_local_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("~"))
        .join("backups")
}

fn default_remote_dir() -> String {
    "backups".to_string()
}

fn default_storage_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("s3backup")
        .join("objects")
}

fn default_force_path_style() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            bucket: String::new(),
            root: default_storage_root(),
        }
    }
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            force_path_style: default_force_path_style(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            file_concurrency: 5,
            part_size_mb: 5,
            part_concurrency: 5,
            timeout_minutes: 60,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            policy: RetentionPolicyKind::KeepLast,
            keep_last: 7,
            keep_days: 30,
            grouping: Grouping::ByName,
            pattern: "*.sql.gz".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"upload.part_size_mb"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut require = |ok: bool, field: &str, message: &str| {
            if !ok {
                errors.push(ValidationError {
                    field: field.into(),
                    message: message.into(),
                });
            }
        };

        // --- storage ---
        require(
            !self.storage.bucket.trim().is_empty(),
            "storage.bucket",
            "is required",
        );
        match self.storage.backend {
            StorageBackend::Local => require(
                !self.storage.root.as_os_str().is_empty(),
                "storage.root",
                "is required for the local backend",
            ),
            StorageBackend::S3 => {
                require(
                    !self.aws.region.trim().is_empty(),
                    "aws.region",
                    "is required for the s3 backend",
                );
                require(
                    self.aws
                        .endpoint
                        .as_deref()
                        .map_or(true, |e| e.starts_with("http://") || e.starts_with("https://")),
                    "aws.endpoint",
                    "must start with http:// or https://",
                );
                let has_key = self.aws.access_key_id.as_deref().is_some_and(|k| !k.is_empty());
                let has_secret = self
                    .aws
                    .secret_access_key
                    .as_deref()
                    .is_some_and(|k| !k.is_empty());
                require(
                    has_key == has_secret,
                    "aws.access_key_id",
                    "must be set together with aws.secret_access_key",
                );
            }
        }

        // --- directories ---
        require(
            !self.local_dir.as_os_str().is_empty(),
            "local_dir",
            "is required",
        );
        require(
            !self.remote_prefix().is_empty(),
            "remote_dir",
            "is required",
        );

        // --- upload ---
        require(
            self.upload.file_concurrency > 0,
            "upload.file_concurrency",
            "must be greater than 0",
        );
        require(
            self.upload.part_concurrency > 0,
            "upload.part_concurrency",
            "must be greater than 0",
        );
        require(
            (MIN_PART_SIZE / MIB..=MAX_PART_SIZE_MB).contains(&self.upload.part_size_mb),
            "upload.part_size_mb",
            "must be between 5 and 5120",
        );
        require(
            (1..=MAX_TIMEOUT_MINUTES).contains(&self.upload.timeout_minutes),
            "upload.timeout_minutes",
            "must be between 1 and 10080",
        );

        // --- retention ---
        if self.retention.enabled {
            match self.retention.policy {
                RetentionPolicyKind::KeepLast => require(
                    self.retention.keep_last > 0,
                    "retention.keep_last",
                    "must be greater than 0",
                ),
                RetentionPolicyKind::KeepDays => require(
                    (1..=MAX_KEEP_DAYS).contains(&self.retention.keep_days),
                    "retention.keep_days",
                    "must be between 1 and 36500",
                ),
            }
            require(
                !self.retention.pattern.trim().is_empty(),
                "retention.pattern",
                "must not be empty",
            );
        }

        // --- logging ---
        require(
            VALID_LOG_LEVELS.contains(&self.logging.level.as_str()),
            "logging.level",
            "must be one of trace, debug, info, warn, error",
        );

        errors
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Fluent builder for [`Config`].
///
/// ```
/// use s3backup_core::config::ConfigBuilder;
///
/// let cfg = ConfigBuilder::new()
///     .bucket("backups")
///     .remote_dir("/db")
///     .file_concurrency(2)
///     .build();
/// assert_eq!(cfg.remote_dir, "db");
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config {
                local_dir: default_local_dir(),
                remote_dir: default_remote_dir(),
                ..Config::default()
            },
        }
    }

    // --- storage ---

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.storage.bucket = bucket.into();
        self
    }

    /// Select the local backend rooted at `root`.
    pub fn storage_root(mut self, root: PathBuf) -> Self {
        self.config.storage.backend = StorageBackend::Local;
        self.config.storage.root = root;
        self
    }

    pub fn aws_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.storage.backend = StorageBackend::S3;
        self.config.aws.endpoint = Some(endpoint.into());
        self
    }

    pub fn aws_region(mut self, region: impl Into<String>) -> Self {
        self.config.aws.region = region.into();
        self
    }

    pub fn aws_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.config.aws.access_key_id = Some(access_key_id.into());
        self.config.aws.secret_access_key = Some(secret_access_key.into());
        self
    }

    // --- directories ---

    pub fn local_dir(mut self, dir: PathBuf) -> Self {
        self.config.local_dir = dir;
        self
    }

    pub fn remote_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.remote_dir = dir.into();
        self
    }

    // --- upload ---

    pub fn file_concurrency(mut self, n: usize) -> Self {
        self.config.upload.file_concurrency = n;
        self
    }

    pub fn part_size_mb(mut self, mb: u64) -> Self {
        self.config.upload.part_size_mb = mb;
        self
    }

    pub fn part_concurrency(mut self, n: usize) -> Self {
        self.config.upload.part_concurrency = n;
        self
    }

    pub fn timeout_minutes(mut self, minutes: u64) -> Self {
        self.config.upload.timeout_minutes = minutes;
        self
    }

    // --- retention ---

    pub fn keep_last(mut self, n: u32) -> Self {
        self.config.retention.enabled = true;
        self.config.retention.policy = RetentionPolicyKind::KeepLast;
        self.config.retention.keep_last = n;
        self
    }

    pub fn keep_days(mut self, days: u32) -> Self {
        self.config.retention.enabled = true;
        self.config.retention.policy = RetentionPolicyKind::KeepDays;
        self.config.retention.keep_days = days;
        self
    }

    pub fn retention_grouping(mut self, grouping: Grouping) -> Self {
        self.config.retention.grouping = grouping;
        self
    }

    pub fn retention_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.retention.pattern = pattern.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished, normalized [`Config`].
    pub fn build(self) -> Config {
        let mut config = self.config;
        config.normalize();
        config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
