//! # Error Types
//!
//! Domain-specific error types for vital-core.
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (local id, status names)
//! 3. Errors are enum variants, never String

use thiserror::Error;

use crate::entry::SyncStatus;

/// Core domain errors.
///
/// These errors represent domain rule violations. Storage and network
/// failures live in vital-db and vital-sync respectively.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A status transition that the entry state machine forbids.
    ///
    /// ## When This Occurs
    /// - Marking a purged entry as synced
    /// - Purging an entry that is still pending upload
    #[error("Entry {local_id}: illegal transition {from:?} -> {to:?}")]
    InvalidTransition {
        local_id: String,
        from: SyncStatus,
        to: SyncStatus,
    },

    /// Metric name has no server-side type id.
    #[error("Unknown metric type: {0}")]
    UnknownMetricType(String),

    /// Entry payload failed structural validation.
    ///
    /// ## When This Occurs
    /// - Non-finite metric value
    /// - Empty image file path
    #[error("Invalid entry payload: {0}")]
    InvalidPayload(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_context() {
        let err = CoreError::InvalidTransition {
            local_id: "abc-123".into(),
            from: SyncStatus::Synced,
            to: SyncStatus::DeletedOnServer,
        };
        assert!(err.to_string().contains("abc-123"));

        let err = CoreError::UnknownMetricType("shoe_size".into());
        assert!(err.to_string().contains("shoe_size"));
    }
}
