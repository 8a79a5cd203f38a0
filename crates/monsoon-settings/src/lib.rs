#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Namespaced application settings with change listeners.
//!
//! Layout: `model.rs` (values and change notifications), `backend.rs`
//! (storage transports), `service.rs` (`SettingsStore`).

pub mod backend;
pub mod error;
pub mod model;
pub mod service;

pub use backend::{JsonFileBackend, MemoryBackend, SettingsBackend};
pub use error::{BackendError, SettingsError, SettingsResult};
pub use model::{ListenerId, SettingChange, SettingType, SettingValue};
pub use service::{DEFAULT_PREFIX, NamespaceLock, SettingsStore};
