//! Domain entities and pure business rules
//!
//! - File descriptors produced by a directory scan
//! - Object keys and the path-to-key mapping
//! - Multipart part planning
//! - Run counters shared across concurrent workers
//! - Retention policies and backup-name grouping
//! - Domain-specific error types

pub mod counters;
pub mod errors;
pub mod file;
pub mod object_key;
pub mod parts;
pub mod retention;

// Re-export commonly used types
pub use counters::{CountersSnapshot, RunCounters};
pub use errors::DomainError;
pub use file::{FileDescriptor, TransferTask};
pub use object_key::{ObjectKey, PathMapper, RemotePrefix};
pub use parts::{plan_parts, PartPlan, DEFAULT_PART_SIZE, MIN_PART_SIZE};
pub use retention::{derive_backup_name, Grouping, RetentionPolicy};
