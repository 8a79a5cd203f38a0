//! Priority values and the DTOs exchanged with callers of the tree.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TreeError;

/// Path segment separator used by file list entries and lookups.
pub const PATH_SEPARATOR: char = '/';

/// Download priority of a single file.
///
/// Variants are declared lowest first so the derived ordering matches
/// `Immediate > Highest > High > Normal > Low > Lowest > DoNotDownload`.
/// The ordering is only meant for grouping in listings.
#[derive(
    Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Do not download the file.
    DoNotDownload,
    /// Lowest download priority.
    Lowest,
    /// Throttled download priority.
    Low,
    /// Default priority assigned by the engine.
    #[default]
    Normal,
    /// Raised download priority.
    High,
    /// Highest regular download priority.
    Highest,
    /// Download before anything else.
    Immediate,
}

impl Priority {
    /// Every priority in menu order, most urgent first.
    pub const ALL: [Self; 7] = [
        Self::Immediate,
        Self::Highest,
        Self::High,
        Self::Normal,
        Self::Low,
        Self::Lowest,
        Self::DoNotDownload,
    ];

    /// Stable machine-readable name, matching the serde representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Highest => "highest",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
            Self::Lowest => "lowest",
            Self::DoNotDownload => "do_not_download",
        }
    }

    /// Human-readable label shown next to the priority.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Immediate => "Immediate",
            Self::Highest => "Highest",
            Self::High => "High",
            Self::Normal => "Normal",
            Self::Low => "Low",
            Self::Lowest => "Lowest",
            Self::DoNotDownload => "Do Not Download",
        }
    }
}

impl Display for Priority {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.label())
    }
}

impl FromStr for Priority {
    type Err = TreeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|priority| priority.as_str() == value)
            .ok_or_else(|| TreeError::UnknownPriority {
                value: value.to_string(),
            })
    }
}

/// Priority reported for a node, derived from its leaves on every read.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", content = "priority", rename_all = "snake_case")]
pub enum PriorityState {
    /// Every leaf below the node shares this priority.
    Uniform(Priority),
    /// Leaves below the node disagree.
    Mixed,
}

impl PriorityState {
    /// The shared priority, or `None` when leaves disagree.
    #[must_use]
    pub const fn uniform(self) -> Option<Priority> {
        match self {
            Self::Uniform(priority) => Some(priority),
            Self::Mixed => None,
        }
    }
}

/// One file from the engine's flat file listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    /// `/`-separated path relative to the download root.
    pub path: String,
    /// Total size of the file in bytes.
    pub size_bytes: u64,
}

impl FileEntry {
    /// Convenience constructor.
    #[must_use]
    pub fn new(path: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            size_bytes,
        }
    }
}

/// A leaf touched by a priority change, in the order it was visited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffectedLeaf {
    /// Full `/`-separated path of the file.
    pub path: String,
    /// Engine file index.
    pub index: u32,
    /// Priority the file held before the change.
    pub previous: Priority,
}

pub(crate) fn join_segments(segments: &[String]) -> String {
    segments.join(&PATH_SEPARATOR.to_string())
}
