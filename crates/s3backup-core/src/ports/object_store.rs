//! Object store port (driven/secondary port)
//!
//! This module defines the capability the engine consumes from an object
//! store. The wire protocol (HTTP, request signing, transport retries) is
//! entirely the adapter's concern.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are
//!   adapter-specific; the engine wraps them with the failing operation.
//! - Uses `#[async_trait]` so the port can be used as `Arc<dyn IObjectStore>`.
//! - A multipart upload is addressed by a [`MultipartHandle`]; the engine
//!   guarantees each handle is finished by exactly one `complete_multipart`
//!   or `abort_multipart` call.

use std::fmt;

// ============================================================================
// MultipartHandle
// ============================================================================

/// Store-side handle for an in-progress multipart upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartHandle {
    /// Bucket the object is being written to
    pub bucket: String,
    /// Key of the object being assembled
    pub key: String,
    /// Opaque session token issued by the store
    pub upload_id: String,
}

impl fmt::Display for MultipartHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.bucket, self.key, self.upload_id)
    }
}

// ============================================================================
// CompletedPart
// ============================================================================

/// A part the store has acknowledged
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CompletedPart {
    /// 1-based part number
    pub part_number: u32,
    /// ETag returned by the store for this part
    pub etag: String,
}

// ============================================================================
// IObjectStore
// ============================================================================

/// Port trait for bucket operations
///
/// ## Implementation Notes
///
/// - `exists` returns `Ok(false)` for a missing object; errors are reserved
///   for failures to answer the question.
/// - `delete` of a missing object should succeed, matching object-store
///   semantics.
/// - `complete_multipart` receives parts strictly ascending by part number.
#[async_trait::async_trait]
pub trait IObjectStore: Send + Sync {
    /// Checks whether an object exists
    async fn exists(&self, bucket: &str, key: &str) -> anyhow::Result<bool>;

    /// Deletes an object
    async fn delete(&self, bucket: &str, key: &str) -> anyhow::Result<()>;

    /// Uploads a whole object in a single request
    async fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> anyhow::Result<()>;

    /// Starts a multipart upload
    async fn initiate_multipart(&self, bucket: &str, key: &str)
        -> anyhow::Result<MultipartHandle>;

    /// Uploads one part and returns its ETag
    async fn upload_part(
        &self,
        handle: &MultipartHandle,
        part_number: u32,
        data: &[u8],
    ) -> anyhow::Result<String>;

    /// Assembles the object from the uploaded parts
    async fn complete_multipart(
        &self,
        handle: &MultipartHandle,
        parts: &[CompletedPart],
    ) -> anyhow::Result<()>;

    /// Discards an unfinished multipart upload and its parts
    async fn abort_multipart(&self, handle: &MultipartHandle) -> anyhow::Result<()>;
}
