//! Storage transports behind the settings store.
//!
//! Backends are synchronous: once `set` returns, the value is durable as far
//! as the backend is concerned.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use tracing::debug;

use crate::error::BackendError;
use crate::model::SettingValue;

/// Key-value transport keyed by absolute setting keys.
pub trait SettingsBackend: Send + Sync {
    /// Read the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns the transport's failure when the value cannot be read.
    fn get(&self, key: &str) -> Result<Option<SettingValue>, BackendError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns the transport's failure when the value cannot be written.
    fn set(&self, key: &str, value: SettingValue) -> Result<(), BackendError>;
}

/// Process-local backend, mostly useful for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: RwLock<HashMap<String, SettingValue>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<SettingValue>, BackendError> {
        let values = self.values.read().map_err(|_| BackendError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: SettingValue) -> Result<(), BackendError> {
        let mut values = self.values.write().map_err(|_| BackendError::Poisoned)?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Backend persisting every value to a single JSON document.
///
/// Each `set` rewrites the document through a temporary file that is then
/// renamed over the original.
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    values: Mutex<BTreeMap<String, SettingValue>>,
}

impl JsonFileBackend {
    /// Open the document at `path`; a missing file starts out empty.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Io`] if the file exists but cannot be read and
    /// [`BackendError::Json`] if its contents are not a settings document.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let path = path.into();
        let values = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| BackendError::Json {
                operation: "settings_file.open",
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(BackendError::Io {
                    operation: "settings_file.open",
                    path,
                    source,
                });
            }
        };
        debug!(path = %path.display(), entries = values.len(), "opened settings file");
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Location of the backing document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, SettingValue>) -> Result<(), BackendError> {
        let io_error = |operation, path: &Path| {
            let path = path.to_path_buf();
            move |source| BackendError::Io {
                operation,
                path,
                source,
            }
        };

        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error("settings_file.create_dir", parent))?;
        }
        let encoded = serde_json::to_vec_pretty(values).map_err(|source| BackendError::Json {
            operation: "settings_file.encode",
            path: self.path.clone(),
            source,
        })?;

        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, encoded).map_err(io_error("settings_file.write", &staging))?;
        fs::rename(&staging, &self.path).map_err(io_error("settings_file.rename", &self.path))?;
        Ok(())
    }
}

impl SettingsBackend for JsonFileBackend {
    fn get(&self, key: &str) -> Result<Option<SettingValue>, BackendError> {
        let values = self.values.lock().map_err(|_| BackendError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: SettingValue) -> Result<(), BackendError> {
        let mut values = self.values.lock().map_err(|_| BackendError::Poisoned)?;
        let mut updated = values.clone();
        updated.insert(key.to_string(), value);
        self.persist(&updated)?;
        *values = updated;
        Ok(())
    }
}
