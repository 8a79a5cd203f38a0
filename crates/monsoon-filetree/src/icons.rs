//! Priority indicator icons.

use std::path::{Path, PathBuf};

use crate::model::{Priority, PriorityState};

/// Icon token shown next to a file with the given priority.
///
/// `Normal` files are rendered without an indicator.
#[must_use]
pub const fn icon_for(priority: Priority) -> Option<&'static str> {
    match priority {
        Priority::Immediate => Some("immediate.png"),
        Priority::Highest => Some("highest.png"),
        Priority::High => Some("high.png"),
        Priority::Normal => None,
        Priority::Low => Some("low.png"),
        Priority::Lowest => Some("lowest.png"),
        Priority::DoNotDownload => Some("donotdownload.png"),
    }
}

/// Icon token for a derived priority; directories with mixed leaves get none.
#[must_use]
pub const fn icon_for_state(state: PriorityState) -> Option<&'static str> {
    match state {
        PriorityState::Uniform(priority) => icon_for(priority),
        PriorityState::Mixed => None,
    }
}

/// Location of the icon for `priority` inside `icon_dir`.
#[must_use]
pub fn icon_path(icon_dir: &Path, priority: Priority) -> Option<PathBuf> {
    icon_for(priority).map(|token| icon_dir.join(token))
}
