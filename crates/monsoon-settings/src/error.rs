//! Error types for settings operations.

use std::error::Error;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure raised by a settings backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Reading or writing the settings file failed.
    #[error("settings file io failure")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// File involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The settings file could not be encoded or decoded.
    #[error("settings file json failure")]
    Json {
        /// Operation identifier.
        operation: &'static str,
        /// File involved in the failure.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// A thread panicked while holding the backend's state.
    #[error("settings backend state poisoned")]
    Poisoned,
    /// Failure reported by a backend implemented outside this crate.
    #[error("settings transport failure")]
    Transport {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying transport error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

/// Primary error type for settings operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// No value is stored under the key.
    #[error("setting not found")]
    SettingNotFound {
        /// Absolute key that was requested.
        key: String,
    },
    /// The stored value has a different type than requested.
    #[error("setting type mismatch")]
    TypeMismatch {
        /// Absolute key that was requested.
        key: String,
        /// Kind the caller asked for.
        expected: &'static str,
        /// Kind actually stored.
        found: &'static str,
    },
    /// The key cannot be placed in a namespace.
    #[error("invalid setting key")]
    InvalidKey {
        /// Key as supplied by the caller.
        key: String,
        /// Machine-readable reason for the rejection.
        reason: &'static str,
    },
    /// The underlying store failed.
    #[error("settings backend operation failed")]
    Backend {
        /// Operation identifier.
        operation: &'static str,
        /// Absolute key involved in the failure.
        key: String,
        /// Backend failure, unchanged.
        source: BackendError,
    },
}

/// Convenience alias for settings results.
pub type SettingsResult<T> = Result<T, SettingsError>;
