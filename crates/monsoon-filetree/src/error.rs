//! Error types for the priority tree and its engine synchronisation.
//!
//! # Design
//!
//! - Keep error messages constant; store operational context in fields.
//! - Structural failures (`InvalidPath`, `TreeCorrupted`) are raised before any
//!   mutation so callers never observe a half-applied tree.
//! - Engine failures preserve the engine's own error as the source.

use std::error::Error;

use thiserror::Error;

/// Primary error type for priority tree operations.
#[derive(Debug, Error)]
pub enum TreeError {
    /// A file list entry or lookup path was malformed.
    #[error("invalid tree path")]
    InvalidPath {
        /// Offending path as supplied by the caller.
        path: String,
        /// Machine-readable reason for the rejection.
        reason: &'static str,
    },
    /// No node exists at the requested path.
    #[error("tree node not found")]
    NotFound {
        /// Path that failed to resolve.
        path: String,
    },
    /// An internal invariant of the tree did not hold.
    #[error("priority tree corrupted")]
    TreeCorrupted {
        /// Path of the node where the violation was detected.
        path: String,
        /// Machine-readable description of the violated invariant.
        reason: &'static str,
    },
    /// The download engine rejected an operation.
    #[error("download engine operation failed")]
    EngineFailure {
        /// Operation identifier.
        operation: &'static str,
        /// Engine file index when the failure concerns a single file.
        file_index: Option<u32>,
        /// Underlying engine failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A priority name did not match any known priority.
    #[error("unknown priority")]
    UnknownPriority {
        /// Value supplied by the caller.
        value: String,
    },
}

impl TreeError {
    pub(crate) fn engine(
        operation: &'static str,
        file_index: Option<u32>,
        source: anyhow::Error,
    ) -> Self {
        Self::EngineFailure {
            operation,
            file_index,
            source: source.into(),
        }
    }
}

/// Convenience alias for priority tree results.
pub type TreeResult<T> = Result<T, TreeError>;
