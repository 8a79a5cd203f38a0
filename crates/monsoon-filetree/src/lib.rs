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

//! Per-file priority and progress tracking for multi-file downloads.
//!
//! Layout: `model` (priorities and DTOs), `tree.rs` (the directory/file
//! hierarchy), `icons.rs` (priority indicators), `service` (engine trait and
//! `TreeSyncController`).

pub mod error;
pub mod icons;
pub mod model;
pub mod service;
pub mod tree;

pub use error::{TreeError, TreeResult};
pub use icons::{icon_for, icon_for_state, icon_path};
pub use model::{AffectedLeaf, FileEntry, PATH_SEPARATOR, Priority, PriorityState};
pub use service::{DownloadEngine, LeafFailure, PriorityChangeReport, TreeSyncController};
pub use tree::{DirectoryNode, FileNode, Leaves, Node, PriorityTree};
