//! # Sync Entries
//!
//! Locally-recorded metric and photo entries tracked for reconciliation with
//! the remote store, and the status state machine that governs them.
//!
//! ## Status State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Entry Status Lifecycle                             │
//! │                                                                         │
//! │   enqueue / local edit                                                  │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   ┌─────────┐  pass picks up   ┌─────────┐  upload ok   ┌─────────┐    │
//! │   │ PENDING │ ───────────────► │ SYNCING │ ───────────► │ SYNCED  │    │
//! │   └─────────┘                  └────┬────┘              └────┬────┘    │
//! │        ▲                            │ upload rejected        │         │
//! │        │       retry next pass      ▼                        │ local   │
//! │        └──────────────────────┌─────────┐                    │ edit    │
//! │                               │ FAILED  │                    ▼         │
//! │                               └─────────┘               back to        │
//! │                                                         PENDING        │
//! │   local delete                                                          │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   ┌──────────────────┐  delete confirmed   ┌───────────────────┐       │
//! │   │ DELETED_LOCALLY  │ ──────────────────► │ purged (row gone) │       │
//! │   └──────────────────┘                     └───────────────────┘       │
//! │                                                  ▲                      │
//! │   server reports entry gone (404)                │                      │
//! │        │                                         │                      │
//! │        ▼                                         │                      │
//! │   ┌───────────────────┐ ─────────────────────────┘                      │
//! │   │ DELETED_ON_SERVER │                                                 │
//! │   └───────────────────┘                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entry has:
//! - `local_id`: UUID v4 - assigned at creation, stable for the local lifetime
//! - `server_id`: set on first successful upload; its presence decides
//!   create-vs-update on the next sync

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Version stamp written alongside every serialized payload.
///
/// The original client encoded entries as pipe-delimited strings; the queue
/// now stores structured JSON and bumps this number on shape changes.
pub const PAYLOAD_SCHEMA_VERSION: i64 = 1;

// =============================================================================
// Sync Status
// =============================================================================

/// Reconciliation status of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Needs upload.
    Pending,

    /// Upload in flight. Must not be concurrently re-picked.
    Syncing,

    /// Matches the server. Ground truth until a local edit supersedes it.
    Synced,

    /// Upload attempted and rejected; eligible for retry on the next pass.
    Failed,

    /// Tombstone awaiting server-side delete confirmation.
    DeletedLocally,

    /// Server reported the entry gone; local copy is to be purged.
    DeletedOnServer,
}

impl SyncStatus {
    /// Returns true if a sync pass should pick this entry up for upload.
    pub fn needs_upload(&self) -> bool {
        matches!(self, SyncStatus::Pending | SyncStatus::Failed)
    }

    /// Returns true if the entry may be removed from the queue entirely.
    ///
    /// Purge is only legal once the server has confirmed (or reported)
    /// the deletion.
    pub fn allows_purge(&self) -> bool {
        matches!(self, SyncStatus::DeletedOnServer | SyncStatus::DeletedLocally)
    }

    /// Validates a status transition against the state machine.
    pub fn can_transition_to(&self, next: SyncStatus) -> bool {
        use SyncStatus::*;
        match (self, next) {
            // A local edit resets any live entry to pending
            (Pending | Syncing | Synced | Failed, Pending) => true,
            (Pending | Failed, Syncing) => true,
            (Syncing, Synced | Failed) => true,
            // Deletion intent can arrive in any live state
            (Pending | Syncing | Synced | Failed, DeletedLocally) => true,
            // The server declaring an entry gone trumps local state
            (_, DeletedOnServer) => true,
            // Tombstones only leave the queue by purge
            (DeletedLocally | DeletedOnServer, _) => false,
            _ => false,
        }
    }

    /// Stable string form used in the database and in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
            SyncStatus::DeletedLocally => "deleted_locally",
            SyncStatus::DeletedOnServer => "deleted_on_server",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "syncing" => Ok(SyncStatus::Syncing),
            "synced" => Ok(SyncStatus::Synced),
            "failed" => Ok(SyncStatus::Failed),
            "deleted_locally" => Ok(SyncStatus::DeletedLocally),
            "deleted_on_server" => Ok(SyncStatus::DeletedOnServer),
            other => Err(CoreError::InvalidPayload(format!(
                "unknown sync status '{other}'"
            ))),
        }
    }
}

// =============================================================================
// Entry Kind & Payload
// =============================================================================

/// Discriminates metric entries from progress-photo entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Metric,
    Image,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Metric => "metric",
            EntryKind::Image => "image",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured payload of one entry.
///
/// Serialized to JSON in the queue (tagged by `kind`), replacing the ad hoc
/// delimited text encoding of the original client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryPayload {
    /// One recorded measurement (weight, body fat, ...).
    Metric {
        /// Measured value in the unit of the metric type.
        value: f64,
        /// Server-side numeric type id (see [`crate::metrics`]).
        metric_type_id: i64,
        /// Day the measurement applies to.
        recorded_on: NaiveDate,
        /// Whether the value was imported from a health platform.
        #[serde(default)]
        imported: bool,
    },
    /// One progress photo pending upload.
    Image {
        /// Absolute path of the image file on device.
        file_path: String,
        /// Server-side image category id.
        image_type_id: i64,
        /// Day the photo was taken.
        recorded_on: NaiveDate,
    },
}

impl EntryPayload {
    /// Kind discriminant for queue filtering.
    pub fn kind(&self) -> EntryKind {
        match self {
            EntryPayload::Metric { .. } => EntryKind::Metric,
            EntryPayload::Image { .. } => EntryKind::Image,
        }
    }

    /// Structural validation before the payload enters the queue.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            EntryPayload::Metric { value, .. } => {
                if !value.is_finite() {
                    return Err(CoreError::InvalidPayload(format!(
                        "metric value must be finite, got {value}"
                    )));
                }
                Ok(())
            }
            EntryPayload::Image { file_path, .. } => {
                if file_path.trim().is_empty() {
                    return Err(CoreError::InvalidPayload(
                        "image file path is empty".into(),
                    ));
                }
                Ok(())
            }
        }
    }
}

// =============================================================================
// Sync Entry
// =============================================================================

/// One queued entry: a local record plus its reconciliation bookkeeping.
///
/// Invariant: an entry with a non-null `server_id` and status `Synced` is the
/// ground truth; any local mutation afterwards must move the status away from
/// `Synced`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEntry {
    /// Local identifier (UUID v4), assigned at creation.
    pub local_id: String,

    /// Server identifier, set on first successful upload.
    pub server_id: Option<String>,

    /// The recorded data.
    pub payload: EntryPayload,

    /// Current reconciliation status.
    pub status: SyncStatus,

    /// Number of upload attempts so far.
    pub attempts: i64,

    /// Last error message if an attempt failed.
    pub last_error: Option<String>,

    /// When the entry was created locally.
    pub created_at: DateTime<Utc>,

    /// When the entry was last edited locally.
    pub updated_at: DateTime<Utc>,

    /// When the last sync attempt ran.
    pub attempted_at: Option<DateTime<Utc>>,
}

impl SyncEntry {
    /// Creates a new pending metric entry with a fresh local id.
    pub fn new_metric(value: f64, metric_type_id: i64, recorded_on: NaiveDate) -> Self {
        Self::new(EntryPayload::Metric {
            value,
            metric_type_id,
            recorded_on,
            imported: false,
        })
    }

    /// Creates a new pending image entry with a fresh local id.
    pub fn new_image(file_path: impl Into<String>, image_type_id: i64, recorded_on: NaiveDate) -> Self {
        Self::new(EntryPayload::Image {
            file_path: file_path.into(),
            image_type_id,
            recorded_on,
        })
    }

    fn new(payload: EntryPayload) -> Self {
        let now = Utc::now();
        SyncEntry {
            local_id: Uuid::new_v4().to_string(),
            server_id: None,
            payload,
            status: SyncStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
            attempted_at: None,
        }
    }

    /// Kind discriminant of the payload.
    pub fn kind(&self) -> EntryKind {
        self.payload.kind()
    }

    /// True if the next pass should upload this entry.
    pub fn needs_upload(&self) -> bool {
        self.status.needs_upload()
    }

    /// True if this upload must be a create (no server id yet).
    pub fn is_create(&self) -> bool {
        self.server_id.is_none()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn test_new_metric_is_pending_create() {
        let entry = SyncEntry::new_metric(70.5, 1, date());
        assert_eq!(entry.status, SyncStatus::Pending);
        assert!(entry.is_create());
        assert!(entry.needs_upload());
        assert_eq!(entry.kind(), EntryKind::Metric);
    }

    #[test]
    fn test_status_transitions() {
        use SyncStatus::*;

        assert!(Pending.can_transition_to(Syncing));
        assert!(Syncing.can_transition_to(Synced));
        assert!(Syncing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Syncing));
        // Local edit resets a synced entry
        assert!(Synced.can_transition_to(Pending));
        // Tombstones are terminal until purge
        assert!(!DeletedLocally.can_transition_to(Pending));
        assert!(!DeletedOnServer.can_transition_to(Syncing));
        // Server-side deletion trumps anything
        assert!(Synced.can_transition_to(DeletedOnServer));
        // Synced entries are not re-picked
        assert!(!Synced.can_transition_to(Syncing));
    }

    #[test]
    fn test_purge_only_from_deleted_states() {
        assert!(SyncStatus::DeletedOnServer.allows_purge());
        assert!(SyncStatus::DeletedLocally.allows_purge());
        assert!(!SyncStatus::Synced.allows_purge());
        assert!(!SyncStatus::Pending.allows_purge());
    }

    #[test]
    fn test_payload_json_is_tagged() {
        let payload = EntryPayload::Metric {
            value: 70.5,
            metric_type_id: 1,
            recorded_on: date(),
            imported: false,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"kind\":\"metric\""));

        let back: EntryPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_payload_validation() {
        let bad = EntryPayload::Metric {
            value: f64::NAN,
            metric_type_id: 1,
            recorded_on: date(),
            imported: false,
        };
        assert!(bad.validate().is_err());

        let bad = EntryPayload::Image {
            file_path: "  ".into(),
            image_type_id: 1,
            recorded_on: date(),
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            SyncStatus::Pending,
            SyncStatus::Syncing,
            SyncStatus::Synced,
            SyncStatus::Failed,
            SyncStatus::DeletedLocally,
            SyncStatus::DeletedOnServer,
        ] {
            let parsed: SyncStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }
}
