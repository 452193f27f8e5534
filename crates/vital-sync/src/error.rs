//! # Sync Error Types
//!
//! Error taxonomy for the sync engine.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Network      │  │      Auth       │  │      Server             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Network        │  │  InvalidCreds   │  │  Server (non-2xx)       │ │
//! │  │  Timeout        │  │  TokenExpired   │  │  Conflict (404 on id)   │ │
//! │  │                 │  │  TokenRevoked   │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Storage      │  │    Internal     │                              │
//! │  │                 │  │                 │                              │
//! │  │  Storage(Db)    │  │  InvalidConfig  │                              │
//! │  │  always fatal   │  │  Serialization  │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Propagation Policy
//! - Per-entry failures are recovered locally (entry marked failed, pass
//!   continues)
//! - Auth failures that refresh cannot resolve abort the pass
//! - Storage failures are always surfaced (data-loss risk)

use thiserror::Error;

use vital_db::DbError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// Auth Error
// =============================================================================

/// Authentication failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Username/password rejected by the server.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Access token rejected and refresh did not produce a usable one.
    #[error("Access token expired")]
    TokenExpired,

    /// Refresh token expired or revoked; the session is no longer usable.
    #[error("Refresh token revoked or expired")]
    TokenRevoked,

    /// No stored session to authenticate with.
    #[error("Not logged in")]
    NotLoggedIn,

    /// Network failure while talking to the auth endpoints.
    #[error("Network error during authentication: {0}")]
    Network(String),

    /// Auth endpoint returned a server-side failure.
    #[error("Authentication server error: {0}")]
    Server(String),
}

impl AuthError {
    /// True if the stored session is definitively dead and must be cleared.
    ///
    /// Network and server hiccups are NOT fatal - the refresh token may
    /// still be valid and logging the user out over a flaky connection
    /// would be hostile.
    pub fn invalidates_session(&self) -> bool {
        matches!(
            self,
            AuthError::TokenRevoked | AuthError::InvalidCredentials
        )
    }
}

// =============================================================================
// Sync Error
// =============================================================================

/// Sync error type covering all reconciliation failures.
///
/// ## Design Principles
/// - Each variant includes enough context for debugging
/// - Errors are categorized for different handling strategies
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Network Errors
    // =========================================================================
    /// Server unreachable.
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded its bounded timeout.
    /// Treated identically to any other network failure.
    #[error("Request timed out: {0}")]
    Timeout(String),

    // =========================================================================
    // Auth Errors
    // =========================================================================
    /// Authentication failure (see [`AuthError`]).
    #[error(transparent)]
    Auth(#[from] AuthError),

    // =========================================================================
    // Server Errors
    // =========================================================================
    /// Remote API returned a non-2xx status with a message.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Entry id not found server-side; local copy is to be treated as
    /// deleted on server.
    #[error("Entry not found on server: {0}")]
    Conflict(String),

    // =========================================================================
    // Local Errors
    // =========================================================================
    /// Local persistence failure. Fatal to the current operation,
    /// surfaced immediately, never silently swallowed.
    #[error("Storage error: {0}")]
    Storage(#[from] DbError),

    /// Failed to (de)serialize a request or response body.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Could not read an image file pending upload.
    #[error("Failed to read image file {path}: {message}")]
    FileRead { path: String, message: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// Internal sync engine error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(err.to_string())
        } else if err.is_decode() {
            SyncError::Serialization(err.to_string())
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for pass control flow)
// =============================================================================

impl SyncError {
    /// Returns true if a later pass may succeed without user intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_) | SyncError::Timeout(_) => true,
            SyncError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true if the pass must abort: authentication is unrecoverable
    /// and continuing would mark unrelated entries as failed.
    pub fn is_auth_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Auth(
                AuthError::TokenExpired
                    | AuthError::TokenRevoked
                    | AuthError::NotLoggedIn
                    | AuthError::InvalidCredentials
            )
        )
    }

    /// Returns true if the server reported the entry gone.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Conflict(_))
    }
}
