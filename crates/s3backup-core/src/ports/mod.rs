//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the engine depends on; their implementations
//! live in adapter modules or crates.
//!
//! ## Ports Overview
//!
//! - [`IObjectStore`] - Bucket operations: existence, delete, single-shot put
//!   and the multipart upload protocol

pub mod object_store;

pub use object_store::{CompletedPart, IObjectStore, MultipartHandle};
