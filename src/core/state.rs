//! # Navigation State
//!
//! Process-local record of the transition currently being handled, plus the
//! outcome of each classification.
//!
//! ```text
//! Idle ──▶ InProgress ──▶ { SameHash | InnerApp | ParamOnly | ShellChange | Error } ──▶ Idle
//!                    └──▶ { Abandoned | Custom | Kept | Suppressed }  (filter/guard exits)
//! ```
//!
//! Every exit path leaves the status at `Finished`, so external code polling
//! [`NavigationState`] can tell whether a notification is still in flight.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum NavigationStatus {
    InProgress,
    #[default]
    Finished,
}

/// The in-flight (or last handled) transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NavigationState {
    pub old_hash: Option<String>,
    pub new_hash: Option<String>,
    pub status: NavigationStatus,
}

impl NavigationState {
    pub fn start(&mut self, new_hash: &str, old_hash: &str) {
        self.new_hash = Some(new_hash.to_string());
        self.old_hash = Some(old_hash.to_string());
        self.status = NavigationStatus::InProgress;
    }

    pub fn finish(&mut self) {
        self.status = NavigationStatus::Finished;
    }

    pub fn in_progress(&self) -> bool {
        self.status == NavigationStatus::InProgress
    }
}

/// How a fragment change was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Classification {
    /// Nothing but technical parameters (if anything) changed.
    SameHash,
    /// Only the app-specific route changed.
    InnerApp,
    /// Same intent, different parameters, and someone listens for that.
    ParamOnly,
    /// Anything else: the shell has to react.
    ShellChange,
    /// The new fragment does not follow the grammar.
    Error,
    /// A filter abandoned the change; the location was reverted.
    Abandoned,
    /// A filter took over the change.
    Custom,
    /// A filter asked to keep the current page.
    Kept,
    /// Dropped by the re-entrancy guard around a forced location write.
    Suppressed,
    /// Arrived while another notification was in flight; handled afterwards.
    Queued,
}
