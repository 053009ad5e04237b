//! Retention engine
//!
//! Decides from file metadata alone which backups to delete, then removes
//! each one locally and, only once the local delete succeeded, remotely.
//!
//! - A local delete failure is fatal for that candidate: the remote copy is
//!   left alone and the error is recorded.
//! - A remote delete failure is a warning; rotation continues with the
//!   remaining candidates.

use std::collections::BTreeMap;
use std::sync::Arc;

use s3backup_core::domain::{
    derive_backup_name, FileDescriptor, Grouping, PathMapper, RetentionPolicy, RunCounters,
};
use s3backup_core::ports::IObjectStore;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::SyncError;

/// Group key used when candidates are not grouped
pub const ALL_FILES_GROUP: &str = "*";

/// Scanned and deleted counts for one retention group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub scanned: usize,
    pub deleted: usize,
}

/// Files selected for deletion, per group
#[derive(Debug, Default)]
pub struct DeletionPlan {
    pub groups: BTreeMap<String, GroupPlan>,
}

#[derive(Debug, Default)]
pub struct GroupPlan {
    pub scanned: usize,
    pub delete: Vec<FileDescriptor>,
}

impl DeletionPlan {
    pub fn len(&self) -> usize {
        self.groups.values().map(|g| g.delete.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Computes which candidates a policy deletes
///
/// Count policies partition candidates by `grouping` and, within each group,
/// keep the `n` most recently modified files. Ties on modification time
/// keep their input order. `KeepLast(0)` deletes nothing.
///
/// Age policies ignore `grouping` and delete every file modified strictly
/// before the cutoff.
pub fn plan_deletions(
    candidates: Vec<FileDescriptor>,
    policy: RetentionPolicy,
    grouping: Grouping,
) -> DeletionPlan {
    let mut plan = DeletionPlan::default();

    match policy {
        RetentionPolicy::KeepLast(keep) => {
            let mut groups: BTreeMap<String, Vec<FileDescriptor>> = BTreeMap::new();
            for file in candidates {
                let group = match grouping {
                    Grouping::None => ALL_FILES_GROUP.to_string(),
                    Grouping::ByName => derive_backup_name(file.name()).to_string(),
                };
                groups.entry(group).or_default().push(file);
            }

            for (name, mut files) in groups {
                let scanned = files.len();
                // Newest first; sort_by is stable
                files.sort_by(|a, b| b.modified_at().cmp(&a.modified_at()));
                let delete = if keep == 0 || files.len() <= keep {
                    Vec::new()
                } else {
                    files.split_off(keep)
                };
                plan.groups.insert(name, GroupPlan { scanned, delete });
            }
        }
        RetentionPolicy::KeepNewerThan(cutoff) => {
            let scanned = candidates.len();
            let delete = candidates
                .into_iter()
                .filter(|file| file.modified_at() < cutoff)
                .collect();
            plan.groups
                .insert(ALL_FILES_GROUP.to_string(), GroupPlan { scanned, delete });
        }
    }

    plan
}

/// Outcome of one rotation
#[derive(Debug, Default)]
pub struct RetentionReport {
    /// Per-group counts; ungrouped runs use [`ALL_FILES_GROUP`]
    pub groups: BTreeMap<String, GroupSummary>,
    pub deleted_local: usize,
    pub deleted_remote: usize,
    /// Candidates whose local delete failed
    pub errors: Vec<SyncError>,
    /// Remote deletes that failed after the local delete succeeded
    pub warnings: Vec<String>,
}

impl RetentionReport {
    pub fn scanned(&self) -> usize {
        self.groups.values().map(|g| g.scanned).sum()
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Deletes rotated-out backups from local storage and the bucket
#[derive(Clone)]
pub struct RetentionEngine {
    store: Arc<dyn IObjectStore>,
    bucket: String,
    mapper: PathMapper,
    counters: Option<Arc<RunCounters>>,
}

impl RetentionEngine {
    pub fn new(store: Arc<dyn IObjectStore>, bucket: impl Into<String>, mapper: PathMapper) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            mapper,
            counters: None,
        }
    }

    /// Also count local deletions into `counters`
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<RunCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Applies `policy` to `candidates` and deletes what it selects
    ///
    /// Deletions run one at a time. Per-candidate failures end up in the
    /// report; this never fails as a whole.
    #[tracing::instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    pub async fn rotate(
        &self,
        candidates: Vec<FileDescriptor>,
        policy: RetentionPolicy,
        grouping: Grouping,
    ) -> RetentionReport {
        let plan = plan_deletions(candidates, policy, grouping);
        let mut report = RetentionReport::default();

        for (name, group) in &plan.groups {
            let mut summary = GroupSummary {
                scanned: group.scanned,
                deleted: 0,
            };
            for file in &group.delete {
                if self.delete_candidate(file, &mut report).await {
                    summary.deleted += 1;
                }
            }
            debug!(group = %name, scanned = summary.scanned, deleted = summary.deleted, "group rotated");
            report.groups.insert(name.clone(), summary);
        }

        info!(
            scanned = report.scanned(),
            deleted_local = report.deleted_local,
            deleted_remote = report.deleted_remote,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "rotation finished"
        );
        report
    }

    /// Returns whether the local copy was removed
    async fn delete_candidate(&self, file: &FileDescriptor, report: &mut RetentionReport) -> bool {
        let path = file.path();

        if let Err(source) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %source, "local delete failed, keeping remote copy");
            report.errors.push(SyncError::RetentionDelete {
                path: path.to_path_buf(),
                source,
            });
            return false;
        }
        report.deleted_local += 1;
        if let Some(counters) = &self.counters {
            counters.record_deleted();
        }
        debug!(path = %path.display(), "deleted local backup");

        let key = match self.mapper.to_key(path) {
            Ok(key) => key,
            Err(e) => {
                let message = format!("{}: remote copy not deleted: {e}", path.display());
                warn!(path = %path.display(), error = %e, "cannot derive object key");
                report.warnings.push(message);
                return true;
            }
        };

        match self.store.delete(&self.bucket, key.as_str()).await {
            Ok(()) => {
                report.deleted_remote += 1;
                debug!(%key, "deleted remote backup");
            }
            Err(e) => {
                warn!(%key, error = %format!("{e:#}"), "remote delete failed");
                report.warnings.push(format!("delete failed for {key}: {e:#}"));
            }
        }
        true
    }
}
