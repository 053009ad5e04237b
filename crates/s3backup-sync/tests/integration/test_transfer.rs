//! Transfer engine behavior against the recording store:
//! - empty files never reach the store
//! - multipart completion lists parts in ascending order
//! - failed or cancelled multipart sessions are aborted exactly once
//! - an abort failure never replaces the original error

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use s3backup_core::domain::{FileDescriptor, ObjectKey, TransferTask};
use s3backup_sync::{SkipReason, SyncError, TransferEngine, TransferOptions, TransferOutcome};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::common::{self, Call, RecordingStore};

const PART: u64 = 16;

fn task(path: std::path::PathBuf, key: &str) -> TransferTask {
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    TransferTask::new(FileDescriptor::new(name, path, Utc::now()), ObjectKey::new(key))
}

fn engine(store: Arc<RecordingStore>) -> TransferEngine {
    TransferEngine::new(
        store,
        "bucket",
        TransferOptions {
            part_size: PART,
            part_concurrency: 4,
        },
    )
}

#[tokio::test]
async fn test_empty_file_makes_no_store_calls() {
    let dir = TempDir::new().unwrap();
    let path = common::write_file(dir.path(), "empty.sql.gz", b"");
    let store = Arc::new(RecordingStore::new());

    let outcome = engine(store.clone())
        .transfer(&task(path, "db/empty.sql.gz"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, TransferOutcome::Skipped(SkipReason::EmptyFile));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_file_of_exactly_part_size_is_single_put() {
    let dir = TempDir::new().unwrap();
    let path = common::write_file(dir.path(), "a", &common::body(PART as usize));
    let store = Arc::new(RecordingStore::new());

    let outcome = engine(store.clone())
        .transfer(&task(path, "db/a"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, TransferOutcome::Uploaded { parts: 1 });
    assert_eq!(
        store.calls(),
        vec![Call::Exists("db/a".into()), Call::Put("db/a".into())]
    );
}

#[tokio::test]
async fn test_completion_parts_are_ascending_despite_arrival_order() {
    let dir = TempDir::new().unwrap();
    let data = common::body(PART as usize * 9 + 5);
    let path = common::write_file(dir.path(), "big", &data);
    let store = Arc::new(RecordingStore::new().with_scrambled_parts());

    let outcome = engine(store.clone())
        .transfer(&task(path, "db/big"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, TransferOutcome::Uploaded { parts: 10 });
    let completes: Vec<_> = store
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Complete(parts) => Some(parts),
            _ => None,
        })
        .collect();
    assert_eq!(completes, vec![(1..=10).collect::<Vec<u32>>()]);
    assert_eq!(store.object("db/big").unwrap(), data);
    assert_eq!(store.count(|c| matches!(c, Call::Abort(_))), 0);
}

#[tokio::test]
async fn test_failed_part_aborts_and_skips_completion() {
    let dir = TempDir::new().unwrap();
    let path = common::write_file(dir.path(), "big", &common::body(PART as usize * 6));
    let store = Arc::new(RecordingStore::new().failing_part(3));

    let err = engine(store.clone())
        .transfer(&task(path, "db/big"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::Transfer { operation: "upload_part", .. }
    ));
    assert_eq!(store.count(|c| matches!(c, Call::Complete(_))), 0);
    assert_eq!(store.count(|c| matches!(c, Call::Abort(_))), 1);
    assert_eq!(store.open_uploads(), 0);
    assert!(store.object("db/big").is_none());
}

#[tokio::test]
async fn test_abort_failure_does_not_mask_original_error() {
    let dir = TempDir::new().unwrap();
    let path = common::write_file(dir.path(), "big", &common::body(PART as usize * 3));
    let store = Arc::new(RecordingStore::new().failing_part(2).failing_abort());

    let err = engine(store.clone())
        .transfer(&task(path, "db/big"), &CancellationToken::new())
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("upload_part"), "unexpected error: {message}");
    assert!(message.contains("injected failure on part 2"));
    assert_eq!(store.count(|c| matches!(c, Call::Abort(_))), 1);
}

#[tokio::test]
async fn test_outer_cancellation_aborts_open_session() {
    let dir = TempDir::new().unwrap();
    let path = common::write_file(dir.path(), "big", &common::body(PART as usize * 8));
    let store = Arc::new(RecordingStore::new().with_part_delay(Duration::from_secs(30)));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = engine(store.clone())
        .transfer(&task(path, "db/big"), &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(store.count(|c| matches!(c, Call::Complete(_))), 0);
    assert_eq!(store.count(|c| matches!(c, Call::Abort(_))), 1);
    assert_eq!(store.open_uploads(), 0);
}

#[tokio::test]
async fn test_dropped_transfer_still_aborts_session() {
    let dir = TempDir::new().unwrap();
    let path = common::write_file(dir.path(), "big", &common::body(PART as usize * 4));
    let store = Arc::new(RecordingStore::new().with_part_delay(Duration::from_secs(30)));
    let engine = engine(store.clone());
    let task = task(path, "db/big");

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        engine.transfer(&task, &CancellationToken::new()),
    )
    .await;
    assert!(outcome.is_err(), "transfer should still be in flight");

    for _ in 0..50 {
        if store.count(|c| matches!(c, Call::Abort(_))) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.count(|c| matches!(c, Call::Abort(_))), 1);
}

#[tokio::test]
async fn test_unreadable_file_never_contacts_store() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(RecordingStore::new());

    let err = engine(store.clone())
        .transfer(&task(dir.path().join("missing"), "db/missing"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::LocalIo { .. }));
    assert!(store.calls().is_empty());
}
