//! # Session & User Identity
//!
//! The persisted authentication session and the user it belongs to.
//!
//! ## Ownership
//! The `Session` is exclusively owned by the session manager in vital-sync.
//! Other components read the access token through accessor calls and never
//! hold a long-lived copy - tokens can be rotated underneath them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An authenticated user as reported by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// A full authentication session.
///
/// The access token has a short effective lifetime; the refresh token is
/// longer-lived and bound to `device_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The user this session belongs to.
    pub user: User,

    /// Short-lived bearer credential for authenticated requests.
    pub access_token: String,

    /// Long-lived, device-bound credential for obtaining new access tokens.
    pub refresh_token: String,

    /// Stable identifier of this device, generated on first run.
    pub device_id: String,

    /// When the session row was last written.
    pub updated_at: DateTime<Utc>,
}
