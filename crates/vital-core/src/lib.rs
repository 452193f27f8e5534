//! # vital-core: Pure Domain Types for Vital
//!
//! This crate is the **heart** of the Vital sync core. It contains the domain
//! model as plain types with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Vital Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    UI Shell (out of scope)                      │   │
//! │  │    Record weight ──► Attach photo ──► Observe sync state        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ vital-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   entry   │  │  metrics  │  │  session  │  │   state   │  │   │
//! │  │   │ SyncEntry │  │ type map  │  │  Session  │  │ SyncState │  │   │
//! │  │   │SyncStatus │  │ id ⇄ name │  │   User    │  │ aggregate │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE TYPES               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          vital-db (storage)    vital-sync (engine)              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`entry`] - Sync entries, payloads, and the status state machine
//! - [`metrics`] - Fixed mapping of local metric names to server type ids
//! - [`session`] - Authenticated session and user identity
//! - [`state`] - Aggregate sync state observed by the UI
//! - [`error`] - Domain error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod entry;
pub mod error;
pub mod metrics;
pub mod session;
pub mod state;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use entry::{EntryKind, EntryPayload, SyncEntry, SyncStatus, PAYLOAD_SCHEMA_VERSION};
pub use error::CoreError;
pub use metrics::{metric_type_id, metric_type_name, MetricType};
pub use session::{Session, User};
pub use state::SyncState;
