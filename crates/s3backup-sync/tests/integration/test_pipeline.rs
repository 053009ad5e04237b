//! Upload pipeline end to end:
//! - a second run over an unchanged directory uploads nothing
//! - the first failing file stops the run and is reported with counters
//! - keys are prefix + relative path with forward slashes

use std::sync::Arc;
use std::time::Duration;

use s3backup_core::domain::RemotePrefix;
use s3backup_sync::{run_upload, LocalObjectStore, SyncError, TransferOptions, UploadSettings};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::common::{self, Call, RecordingStore};

fn settings(root: &std::path::Path, file_concurrency: usize) -> UploadSettings {
    UploadSettings {
        root: root.to_path_buf(),
        prefix: RemotePrefix::new("/backups/db"),
        bucket: "bucket".into(),
        file_concurrency,
        transfer: TransferOptions {
            part_size: 32,
            part_concurrency: 2,
        },
    }
}

fn populate(dir: &std::path::Path, files: usize) {
    for i in 0..files {
        common::write_file(dir, &format!("db{i}_2024-03-01_02-00-00.sql.gz"), &common::body(10 + i));
    }
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("local");
    populate(&root, 8);
    common::write_file(&root, "nested/deeper/big.sql.gz", &common::body(200));
    let store = Arc::new(LocalObjectStore::new(tmp.path().join("objects")));

    let first = run_upload(store.clone(), &settings(&root, 3), &CancellationToken::new())
        .await
        .into_result()
        .unwrap();
    assert_eq!(first.uploaded, 9);
    assert_eq!(first.skipped, 0);

    let second = run_upload(store.clone(), &settings(&root, 3), &CancellationToken::new())
        .await
        .into_result()
        .unwrap();
    assert_eq!(second.uploaded, 0);
    assert_eq!(second.skipped, 9);
}

#[tokio::test]
async fn test_second_run_makes_only_existence_checks() {
    let tmp = TempDir::new().unwrap();
    populate(tmp.path(), 5);
    let store = Arc::new(RecordingStore::new());

    run_upload(store.clone(), &settings(tmp.path(), 2), &CancellationToken::new())
        .await
        .into_result()
        .unwrap();
    let calls_after_first = store.calls().len();

    let second = run_upload(store.clone(), &settings(tmp.path(), 2), &CancellationToken::new())
        .await
        .into_result()
        .unwrap();

    let new_calls = &store.calls()[calls_after_first..];
    assert_eq!(second.skipped, 5);
    assert_eq!(new_calls.len(), 5);
    assert!(new_calls.iter().all(|c| matches!(c, Call::Exists(_))));
}

#[tokio::test]
async fn test_keys_use_prefix_and_relative_path() {
    let tmp = TempDir::new().unwrap();
    common::write_file(tmp.path(), "2024/03/shop.sql.gz", b"x");
    let store = Arc::new(RecordingStore::new());

    run_upload(store.clone(), &settings(tmp.path(), 1), &CancellationToken::new())
        .await
        .into_result()
        .unwrap();

    assert_eq!(store.object("backups/db/2024/03/shop.sql.gz").unwrap(), b"x");
}

#[tokio::test]
async fn test_sequential_failure_stops_remaining_files() {
    let tmp = TempDir::new().unwrap();
    populate(tmp.path(), 6);
    let store = Arc::new(RecordingStore::new().failing_put(3));

    let report = run_upload(store.clone(), &settings(tmp.path(), 1), &CancellationToken::new()).await;

    assert!(matches!(
        report.error,
        Some(SyncError::Transfer { operation: "put_object", .. })
    ));
    // The failing put is the last store call: nothing started afterwards
    assert!(matches!(store.calls().last(), Some(Call::Put(_))));
    assert_eq!(store.count(|c| matches!(c, Call::Put(_))), 3);
    assert_eq!(report.counters.uploaded, 2);
}

#[tokio::test]
async fn test_concurrent_failure_cancels_the_run() {
    let tmp = TempDir::new().unwrap();
    populate(tmp.path(), 20);
    let store = Arc::new(
        RecordingStore::new()
            .failing_put(1)
            .with_put_delay(Duration::from_millis(20)),
    );

    let report = run_upload(store.clone(), &settings(tmp.path(), 4), &CancellationToken::new()).await;

    assert!(!report.is_success());
    assert!(matches!(
        report.error,
        Some(SyncError::Transfer { operation: "put_object", .. })
    ));
    // Only files already in flight alongside the failure may finish
    assert!(report.counters.uploaded <= 3, "uploaded {}", report.counters.uploaded);
    assert!(store.count(|c| matches!(c, Call::Put(_))) <= 4);
}

#[tokio::test]
async fn test_cancelled_run_reports_cancellation() {
    let tmp = TempDir::new().unwrap();
    populate(tmp.path(), 4);
    let store = Arc::new(RecordingStore::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = run_upload(store.clone(), &settings(tmp.path(), 2), &cancel).await;

    assert!(matches!(report.error, Some(SyncError::Cancelled)));
    assert_eq!(report.counters.uploaded, 0);
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_empty_files_are_counted_as_skipped() {
    let tmp = TempDir::new().unwrap();
    common::write_file(tmp.path(), "a.sql.gz", b"");
    common::write_file(tmp.path(), "b.sql.gz", b"data");
    let store = Arc::new(RecordingStore::new());

    let counters = run_upload(store.clone(), &settings(tmp.path(), 2), &CancellationToken::new())
        .await
        .into_result()
        .unwrap();

    assert_eq!(counters.uploaded, 1);
    assert_eq!(counters.skipped, 1);
    assert_eq!(store.count(|c| matches!(c, Call::Exists(k) if k.ends_with("a.sql.gz"))), 0);
}
