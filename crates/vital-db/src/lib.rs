//! # vital-db: Database Layer for Vital
//!
//! This crate provides local persistence for the Vital sync core.
//! It uses SQLite for durable storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Vital Data Flow                                 │
//! │                                                                         │
//! │  UI mutation (record weight) / Sync pass (status update)               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     vital-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────────┐   ┌────────────┐ │   │
//! │  │   │   Database    │    │   Repositories    │   │ Migrations │ │   │
//! │  │   │   (pool.rs)   │    │ EntryQueueRepo    │   │ (embedded) │ │   │
//! │  │   │               │◄───│ CredentialRepo    │   │ 001_init   │ │   │
//! │  │   │ SqlitePool    │    │                   │   │            │ │   │
//! │  │   └───────────────┘    └───────────────────┘   └────────────┘ │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database (device-local file, WAL mode)                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Entry queue and credential store implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vital_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/vital.db")).await?;
//! let pending = db.entries().pending(100).await?;
//! let session = db.credentials().get().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::credential::CredentialRepository;
pub use repository::queue::EntryQueueRepository;
