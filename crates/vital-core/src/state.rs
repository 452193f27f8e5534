//! # Aggregate Sync State
//!
//! The single value the UI observes to render sync status. Recomputed by the
//! orchestrator after every pass; never hand-edited elsewhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate sync state, published after every orchestration pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// When the last pass finished (successfully or not).
    pub last_sync: Option<DateTime<Utc>>,

    /// Whether the device currently believes it has connectivity.
    pub is_online: bool,

    /// Whether a pass is executing right now.
    pub is_syncing: bool,

    /// Entries with status `pending` or `failed`.
    pub pending_uploads: i64,

    /// Entries with status `failed`.
    pub failed_uploads: i64,

    /// User-visible message from the last systemic failure, if any.
    pub last_error: Option<String>,
}

impl Default for SyncState {
    fn default() -> Self {
        SyncState {
            last_sync: None,
            is_online: false,
            is_syncing: false,
            pending_uploads: 0,
            failed_uploads: 0,
            last_error: None,
        }
    }
}

impl SyncState {
    /// True when the automatic trigger should start a pass.
    ///
    /// Observed reactively by the engine's background task, not polled.
    pub fn should_auto_sync(&self) -> bool {
        self.is_online && self.pending_uploads > 0 && !self.is_syncing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle_offline() {
        let state = SyncState::default();
        assert!(!state.is_online);
        assert!(!state.is_syncing);
        assert_eq!(state.pending_uploads, 0);
        assert!(!state.should_auto_sync());
    }

    #[test]
    fn test_auto_sync_trigger_condition() {
        let mut state = SyncState {
            is_online: true,
            pending_uploads: 3,
            ..Default::default()
        };
        assert!(state.should_auto_sync());

        state.is_syncing = true;
        assert!(!state.should_auto_sync());

        state.is_syncing = false;
        state.pending_uploads = 0;
        assert!(!state.should_auto_sync());

        state.pending_uploads = 1;
        state.is_online = false;
        assert!(!state.should_auto_sync());
    }
}
