//! Integration tests for s3backup-sync
//!
//! Drives the upload pipeline and the retention engine against a recording,
//! fault-injecting object store double and against the directory-backed
//! store, over real temporary directories.

mod common;

mod test_pipeline;
mod test_retention;
mod test_transfer;
