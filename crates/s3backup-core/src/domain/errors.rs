//! Domain error types
//!
//! Validation failures for configuration-derived values and violations of
//! the path-to-key invariant.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Path is not located under the configured backup root
    #[error("Path {path} is not under root {root}")]
    PathNotUnderRoot {
        /// The offending path
        path: String,
        /// The configured root
        root: String,
    },

    /// A relative path component could not be represented as UTF-8
    #[error("Path is not valid UTF-8: {0}")]
    NonUtf8Path(String),

    /// Part planning was asked for a zero part size
    #[error("Part size must be greater than zero")]
    ZeroPartSize,

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
