use std::fmt;

use tracing::warn;

use crate::message::{Priority, TabId};

/// The parent broke the tab protocol (double destroy, a message for a tab
/// that is gone). Fatal in debug builds, ignored otherwise.
pub(crate) fn protocol_violation(tab: TabId, what: &str) {
    warn!(target: "tab::lifecycle", %tab, what, "protocol violation");
    if cfg!(debug_assertions) {
        panic!("protocol violation on tab {tab}: {what}");
    }
}

/// Where a tab is between creation and deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Created,
    /// The channel to the parent is established.
    Active,
    /// Destroy was observed; the first delete pass is queued.
    Destroying,
    /// The delete task bounced once and is queued again at input priority.
    AwaitingSecondPass,
    Deleted,
}

impl LifecycleState {
    pub fn is_tearing_down(self) -> bool {
        matches!(self, Self::Destroying | Self::AwaitingSecondPass)
    }

    pub fn is_live(self) -> bool {
        matches!(self, Self::Created | Self::Active)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::Destroying => "destroying",
            Self::AwaitingSecondPass => "awaiting_second_pass",
            Self::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// The deferred delete task. It runs once at normal priority, resubmits
/// itself at input priority, and only then closes the channel, so every task
/// queued at either priority before the destroy has drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayedDelete {
    tab: TabId,
    ready_to_delete: bool,
}

impl DelayedDelete {
    pub fn new(tab: TabId) -> Self {
        Self {
            tab,
            ready_to_delete: false,
        }
    }

    pub fn tab(&self) -> TabId {
        self.tab
    }

    pub fn is_ready(&self) -> bool {
        self.ready_to_delete
    }

    pub fn priority(&self) -> Priority {
        if self.ready_to_delete {
            Priority::Input
        } else {
            Priority::Normal
        }
    }

    /// The task as resubmitted after its first pass.
    pub fn bounced(self) -> Self {
        Self {
            ready_to_delete: true,
            ..self
        }
    }
}
