//! Retention against real files and the recording store:
//! - count policy per group, age policy ungrouped
//! - local delete failure never reaches the store
//! - remote delete failure is a warning and rotation continues

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use s3backup_core::domain::{FileDescriptor, Grouping, PathMapper, RemotePrefix, RetentionPolicy, RunCounters};
use s3backup_sync::retention::ALL_FILES_GROUP;
use s3backup_sync::{run_retention, run_retention_with, RetentionEngine, RetentionSettings, SyncError};
use tempfile::TempDir;

use crate::common::{self, days, Call, RecordingStore};

fn settings(root: &Path, policy: RetentionPolicy, grouping: Grouping) -> RetentionSettings {
    RetentionSettings {
        root: root.to_path_buf(),
        prefix: RemotePrefix::new("db"),
        bucket: "bucket".into(),
        policy,
        grouping,
        pattern: "*.sql.gz".into(),
    }
}

/// f1 is the newest, f5 the oldest; each is mirrored in the store
fn five_dumps(root: &Path, store: &RecordingStore) {
    for i in 1..=5u64 {
        let name = format!("f{i}.sql.gz");
        common::write_aged_file(root, &name, Duration::from_secs(i * 3600));
        store.insert_object(&format!("db/{name}"), b"dump");
    }
}

fn remaining(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_keep_three_deletes_two_oldest() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(RecordingStore::new());
    five_dumps(tmp.path(), &store);

    let report = run_retention(
        store.clone(),
        &settings(tmp.path(), RetentionPolicy::KeepLast(3), Grouping::None),
    )
    .await
    .unwrap();

    assert_eq!(report.deleted_local, 2);
    assert_eq!(report.deleted_remote, 2);
    assert_eq!(report.groups[ALL_FILES_GROUP].scanned, 5);
    assert_eq!(remaining(tmp.path()), vec!["f1.sql.gz", "f2.sql.gz", "f3.sql.gz"]);
    assert!(store.object("db/f4.sql.gz").is_none());
    assert!(store.object("db/f5.sql.gz").is_none());
    assert!(store.object("db/f3.sql.gz").is_some());
}

#[tokio::test]
async fn test_keep_ten_deletes_nothing() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(RecordingStore::new());
    five_dumps(tmp.path(), &store);

    let report = run_retention(
        store.clone(),
        &settings(tmp.path(), RetentionPolicy::KeepLast(10), Grouping::None),
    )
    .await
    .unwrap();

    assert_eq!(report.deleted_local, 0);
    assert_eq!(remaining(tmp.path()).len(), 5);
    assert_eq!(store.count(|c| matches!(c, Call::Delete(_))), 0);
}

#[tokio::test]
async fn test_age_cutoff_deletes_only_older_files() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(RecordingStore::new());
    common::write_aged_file(tmp.path(), "old.sql.gz", days(10));
    common::write_aged_file(tmp.path(), "mid.sql.gz", days(5));
    common::write_aged_file(tmp.path(), "new.sql.gz", days(1));

    let policy = RetentionPolicy::keep_days(7, Utc::now());
    let report = run_retention(store.clone(), &settings(tmp.path(), policy, Grouping::ByName))
        .await
        .unwrap();

    assert_eq!(report.deleted_local, 1);
    assert_eq!(remaining(tmp.path()), vec!["mid.sql.gz", "new.sql.gz"]);
    assert_eq!(store.calls(), vec![Call::Delete("db/old.sql.gz".into())]);
}

#[tokio::test]
async fn test_grouped_rotation_keeps_each_database() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(RecordingStore::new());
    for (i, stamp) in ["2024-03-03", "2024-03-02", "2024-03-01"].iter().enumerate() {
        let age = days(i as u64 + 1);
        common::write_aged_file(tmp.path(), &format!("shop_{stamp}_02-00-00.sql.gz"), age);
        common::write_aged_file(tmp.path(), &format!("crm_eu_{stamp}_02-00-00.sql.gz"), age);
    }
    common::write_aged_file(tmp.path(), "notes.txt", days(30));

    let counters = Arc::new(RunCounters::new());
    let report = run_retention_with(
        store.clone(),
        &settings(tmp.path(), RetentionPolicy::KeepLast(2), Grouping::ByName),
        counters.clone(),
    )
    .await
    .unwrap();

    assert_eq!(report.groups["shop"].deleted, 1);
    assert_eq!(report.groups["crm_eu"].deleted, 1);
    assert_eq!(counters.snapshot().deleted, 2);
    assert!(!tmp.path().join("shop_2024-03-01_02-00-00.sql.gz").exists());
    assert!(!tmp.path().join("crm_eu_2024-03-01_02-00-00.sql.gz").exists());
    assert!(tmp.path().join("notes.txt").exists());
}

#[tokio::test]
async fn test_local_delete_failure_skips_remote_delete() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(RecordingStore::new());
    // A directory cannot be removed with remove_file
    let stuck = tmp.path().join("stuck.sql.gz");
    std::fs::create_dir(&stuck).unwrap();
    store.insert_object("db/stuck.sql.gz", b"dump");

    let engine = RetentionEngine::new(
        store.clone(),
        "bucket",
        PathMapper::new(tmp.path(), RemotePrefix::new("db")),
    );
    let candidate = FileDescriptor::new("stuck.sql.gz", stuck, Utc::now() - chrono::Duration::days(30));
    let report = engine
        .rotate(
            vec![candidate],
            RetentionPolicy::keep_days(7, Utc::now()),
            Grouping::None,
        )
        .await;

    assert_eq!(report.errors.len(), 1);
    assert!(matches!(report.errors[0], SyncError::RetentionDelete { .. }));
    assert_eq!(store.count(|c| matches!(c, Call::Delete(_))), 0);
    assert!(store.object("db/stuck.sql.gz").is_some());
}

#[tokio::test]
async fn test_remote_delete_failure_is_a_warning() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(RecordingStore::new().failing_delete());
    five_dumps(tmp.path(), &store);

    let report = run_retention(
        store.clone(),
        &settings(tmp.path(), RetentionPolicy::KeepLast(2), Grouping::None),
    )
    .await
    .unwrap();

    assert!(report.is_success());
    assert_eq!(report.deleted_local, 3);
    assert_eq!(report.deleted_remote, 0);
    assert_eq!(report.warnings.len(), 3);
    assert_eq!(store.count(|c| matches!(c, Call::Delete(_))), 3);
    assert_eq!(remaining(tmp.path()).len(), 2);
}
