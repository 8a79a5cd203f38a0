//! Namespaced settings store with change listeners.
//!
//! Keys are relative to a fixed application prefix. The first segment of a
//! relative key is its namespace; every namespace owns one lock that
//! serialises access to the backend for all keys beneath it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, info};

use crate::backend::SettingsBackend;
use crate::error::{SettingsError, SettingsResult};
use crate::model::{ListenerId, SettingChange, SettingType, SettingValue};

/// Prefix applied to every key unless the store is built with another one.
pub const DEFAULT_PREFIX: &str = "/apps/monsoon/";

const KEY_SEPARATOR: char = '/';

type Callback = Arc<dyn Fn(&SettingChange) + Send + Sync>;

struct Listener {
    id: ListenerId,
    path: String,
    callback: Callback,
}

impl Listener {
    fn covers(&self, key: &str) -> bool {
        self.path.is_empty()
            || key
                .strip_prefix(self.path.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with(KEY_SEPARATOR))
    }
}

/// Mutual exclusion for every key within one top-level namespace.
#[derive(Debug)]
pub struct NamespaceLock {
    name: String,
    guard: Mutex<()>,
}

impl NamespaceLock {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            guard: Mutex::new(()),
        }
    }

    /// Namespace this lock guards.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&self) -> MutexGuard<'_, ()> {
        self.guard.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Settings store shared by the components that need configuration values.
pub struct SettingsStore {
    prefix: String,
    backend: Arc<dyn SettingsBackend>,
    namespaces: Mutex<HashMap<String, Arc<NamespaceLock>>>,
    listeners: Mutex<Vec<Listener>>,
    next_listener: AtomicU64,
}

impl SettingsStore {
    /// Create a store rooted at [`DEFAULT_PREFIX`].
    #[must_use]
    pub fn new(backend: Arc<dyn SettingsBackend>) -> Self {
        Self::with_prefix(DEFAULT_PREFIX, backend)
    }

    /// Create a store rooted at `prefix`; a trailing `/` is added if missing.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>, backend: Arc<dyn SettingsBackend>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.ends_with(KEY_SEPARATOR) {
            prefix.push(KEY_SEPARATOR);
        }
        Self {
            prefix,
            backend,
            namespaces: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Prefix prepended to every relative key.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Lock guarding the namespace `name`, created on first use.
    #[must_use]
    pub fn namespace_lock(&self, name: &str) -> Arc<NamespaceLock> {
        let mut namespaces = self
            .namespaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            namespaces
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(NamespaceLock::new(name))),
        )
    }

    /// Store `value` under `key` and notify listeners covering the key.
    ///
    /// Listeners run after the namespace lock has been released, so they may
    /// read or write settings in the same namespace.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidKey`] for a key without a namespace
    /// and [`SettingsError::Backend`] if the backend rejects the write.
    pub fn store(&self, key: &str, value: impl Into<SettingValue>) -> SettingsResult<()> {
        let namespace = namespace_of(key)?;
        let absolute_key = format!("{}{key}", self.prefix);
        let value = value.into();

        {
            let lock = self.namespace_lock(namespace);
            let _held = lock.acquire();
            self.backend
                .set(&absolute_key, value.clone())
                .map_err(|source| SettingsError::Backend {
                    operation: "store",
                    key: absolute_key.clone(),
                    source,
                })?;
        }
        debug!(key = %absolute_key, kind = value.kind(), "stored setting");

        self.notify(&SettingChange {
            key: key.to_string(),
            absolute_key,
            value,
            changed_at: Utc::now(),
        });
        Ok(())
    }

    /// Value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::SettingNotFound`] if nothing is stored,
    /// [`SettingsError::InvalidKey`] for a key without a namespace and
    /// [`SettingsError::Backend`] if the backend read fails.
    pub fn retrieve(&self, key: &str) -> SettingsResult<SettingValue> {
        namespace_of(key)?;
        self.retrieve_absolute(&format!("{}{key}", self.prefix))
    }

    /// Value stored under a key that already includes its prefix.
    ///
    /// Keys under this store's prefix share its namespace locks; other keys
    /// are locked by their own first segment.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`SettingsStore::retrieve`].
    pub fn retrieve_absolute(&self, absolute_key: &str) -> SettingsResult<SettingValue> {
        let relative = absolute_key
            .strip_prefix(self.prefix.as_str())
            .unwrap_or_else(|| absolute_key.trim_start_matches(KEY_SEPARATOR));
        let namespace = namespace_of(relative).map_err(|_| SettingsError::InvalidKey {
            key: absolute_key.to_string(),
            reason: "key has no namespace",
        })?;

        let stored = {
            let lock = self.namespace_lock(namespace);
            let _held = lock.acquire();
            self.backend
                .get(absolute_key)
                .map_err(|source| SettingsError::Backend {
                    operation: "retrieve",
                    key: absolute_key.to_string(),
                    source,
                })?
        };

        stored.ok_or_else(|| {
            info!(key = absolute_key, "setting not found");
            SettingsError::SettingNotFound {
                key: absolute_key.to_string(),
            }
        })
    }

    /// Value stored under `key`, read back as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::TypeMismatch`] if the stored value is not a
    /// `T`, plus every error of [`SettingsStore::retrieve`].
    pub fn retrieve_as<T: SettingType>(&self, key: &str) -> SettingsResult<T> {
        let value = self.retrieve(key)?;
        T::from_setting(value).map_err(|other| SettingsError::TypeMismatch {
            key: format!("{}{key}", self.prefix),
            expected: T::KIND,
            found: other.kind(),
        })
    }

    /// Invoke `callback` after every store to `path` or to a key below it.
    ///
    /// `path` may be relative or include this store's prefix. An empty path,
    /// or the prefix itself, observes every key.
    pub fn add_listener(
        &self,
        path: &str,
        callback: impl Fn(&SettingChange) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        let path = self.relative_listener_path(path).to_string();
        debug!(listener = id.0, path = %path, "registered settings listener");
        self.listeners_guard().push(Listener {
            id,
            path,
            callback: Arc::new(callback),
        });
        id
    }

    /// Unregister a listener; returns `false` if it was already gone.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners_guard();
        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        listeners.len() != before
    }

    /// No-op: backends persist synchronously on every store.
    ///
    /// # Errors
    ///
    /// Never fails; the signature leaves room for buffered backends.
    pub const fn flush(&self) -> SettingsResult<()> {
        Ok(())
    }

    fn relative_listener_path<'a>(&self, path: &'a str) -> &'a str {
        let path = path.trim_end_matches(KEY_SEPARATOR);
        if path == self.prefix.trim_end_matches(KEY_SEPARATOR) {
            return "";
        }
        path.strip_prefix(self.prefix.as_str()).unwrap_or(path)
    }

    fn notify(&self, change: &SettingChange) {
        let callbacks: Vec<Callback> = self
            .listeners_guard()
            .iter()
            .filter(|listener| listener.covers(&change.key))
            .map(|listener| Arc::clone(&listener.callback))
            .collect();
        for callback in callbacks {
            callback(change);
        }
    }

    fn listeners_guard(&self) -> MutexGuard<'_, Vec<Listener>> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn namespace_of(key: &str) -> SettingsResult<&str> {
    let invalid = |reason| SettingsError::InvalidKey {
        key: key.to_string(),
        reason,
    };
    if key.is_empty() {
        return Err(invalid("empty key"));
    }
    if key.starts_with(KEY_SEPARATOR) {
        return Err(invalid("relative key starts with a separator"));
    }
    key.split(KEY_SEPARATOR)
        .next()
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| invalid("key has no namespace"))
}
