//! # Session Manager
//!
//! Owns the authentication session: login, registration, coalesced token
//! refresh, and logout.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Session Lifecycle                                │
//! │                                                                         │
//! │            login / register              restore (app start)            │
//! │                   │                            │                        │
//! │                   ▼                            ▼                        │
//! │            ┌─────────────────────────────────────────┐                  │
//! │            │              LOGGED IN                  │                  │
//! │            │   access token + refresh token stored   │◄──┐              │
//! │            └─────────────────────────────────────────┘   │ refresh ok   │
//! │                   │                │                     │              │
//! │          logout   │                │ 401 → refresh ──────┘              │
//! │     (always local)│                │                                    │
//! │                   ▼                ▼ refresh token revoked              │
//! │            ┌─────────────────────────────────────────┐                  │
//! │            │             LOGGED OUT                  │                  │
//! │            │        credential row cleared           │                  │
//! │            └─────────────────────────────────────────┘                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Refresh Coalescing
//! Concurrent requests that all hit 401 with the same stale token trigger
//! exactly ONE network refresh: callers serialize on a mutex and compare
//! the token they observed against the current one. A caller whose stale
//! token has already been replaced gets the fresh token without a network
//! call.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use vital_core::{Session, User};
use vital_db::CredentialRepository;

use crate::api::AuthApi;
use crate::error::{AuthError, SyncResult};

// =============================================================================
// Auth State (observable)
// =============================================================================

/// Broadcast auth state. Late subscribers receive the current value
/// immediately.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    LoggedOut,
    LoggedIn { user: User },
}

impl AuthState {
    pub fn is_logged_in(&self) -> bool {
        matches!(self, AuthState::LoggedIn { .. })
    }
}

// =============================================================================
// Session Manager
// =============================================================================

/// Manages the authentication session and its persistence.
pub struct SessionManager {
    store: CredentialRepository,
    api: Arc<dyn AuthApi>,
    device_id: String,
    session: RwLock<Option<Session>>,
    /// Serializes refresh attempts so N concurrent 401s make one call.
    refresh_lock: Mutex<()>,
    state_tx: watch::Sender<AuthState>,
}

impl SessionManager {
    pub fn new(store: CredentialRepository, api: Arc<dyn AuthApi>, device_id: String) -> Self {
        let (state_tx, _) = watch::channel(AuthState::LoggedOut);
        SessionManager {
            store,
            api,
            device_id,
            session: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            state_tx,
        }
    }

    /// Loads any persisted session from the credential store.
    ///
    /// Called once at startup. Tokens are NOT validated here; a stale
    /// access token is discovered on first use and refreshed then.
    pub async fn restore(&self) -> SyncResult<Option<User>> {
        let stored = self.store.get().await?;

        match stored {
            Some(session) => {
                let user = session.user.clone();
                info!(user = %user.username, "Restored persisted session");
                *self.session.write().await = Some(session);
                self.publish().await;
                Ok(Some(user))
            }
            None => {
                debug!("No persisted session found");
                Ok(None)
            }
        }
    }

    /// Authenticates with the server and persists the resulting session.
    pub async fn login(&self, username: &str, password: &str) -> SyncResult<Session> {
        let outcome = self.api.login(username, password, &self.device_id).await?;

        let session = Session {
            user: outcome.user,
            access_token: outcome.access_token,
            refresh_token: outcome.refresh_token,
            device_id: self.device_id.clone(),
            updated_at: Utc::now(),
        };

        self.store.put(&session).await?;
        *self.session.write().await = Some(session.clone());
        self.publish().await;

        info!(user = %session.user.username, "Logged in");
        Ok(session)
    }

    /// Creates an account, then logs in with the same credentials.
    ///
    /// Registration reports success as soon as the account exists. If the
    /// follow-up login fails the user stays logged out and retries via
    /// [`login`](Self::login), not by registering again.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        email: Option<&str>,
    ) -> SyncResult<User> {
        let user = self.api.register(username, password, email).await?;
        debug!(user = %username, "Account registered, logging in");

        if let Err(e) = self.login(username, password).await {
            warn!(?e, "Auto-login after registration failed");
        }
        Ok(user)
    }

    /// Exchanges the refresh token for a new access token.
    ///
    /// `stale` is the access token the caller observed when it got the 401.
    /// If the current token already differs, another caller refreshed first
    /// and the current token is returned without a network call.
    ///
    /// On [`AuthError::TokenRevoked`] or [`AuthError::InvalidCredentials`]
    /// the session is cleared locally: the user must log in again. Network
    /// failures leave the session intact.
    pub async fn refresh_access_token(&self, stale: &str) -> Result<String, AuthError> {
        let _guard = self.refresh_lock.lock().await;

        let (refresh_token, current) = {
            let session = self.session.read().await;
            match session.as_ref() {
                Some(s) => (s.refresh_token.clone(), s.access_token.clone()),
                None => return Err(AuthError::NotLoggedIn),
            }
        };

        // Someone else already refreshed while we waited for the lock.
        if current != stale {
            debug!("Token already refreshed by a concurrent caller");
            return Ok(current);
        }

        match self.api.refresh(&refresh_token, &self.device_id).await {
            Ok(outcome) => {
                let updated = {
                    let mut session = self.session.write().await;
                    let s = session.as_mut().ok_or(AuthError::NotLoggedIn)?;
                    s.access_token = outcome.access_token.clone();
                    if let Some(rotated) = outcome.refresh_token {
                        s.refresh_token = rotated;
                    }
                    s.updated_at = Utc::now();
                    s.clone()
                };

                // The in-memory token is authoritative; if persistence lags
                // we refresh again after the next restart.
                if let Err(e) = self.store.put(&updated).await {
                    warn!(?e, "Failed to persist refreshed tokens");
                }

                debug!("Access token refreshed");
                Ok(outcome.access_token)
            }
            Err(e) => {
                if e.invalidates_session() {
                    warn!(?e, "Refresh token rejected, clearing session");
                    self.clear_local_session().await;
                } else {
                    warn!(?e, "Token refresh failed transiently, keeping session");
                }
                Err(e)
            }
        }
    }

    /// Logs out. Server-side revocation is best-effort; the local session
    /// is ALWAYS cleared, even offline.
    pub async fn logout(&self) -> SyncResult<()> {
        let token = {
            let session = self.session.read().await;
            session.as_ref().map(|s| s.access_token.clone())
        };

        if let Some(token) = token {
            if let Err(e) = self.api.logout(&token, &self.device_id).await {
                warn!(?e, "Server-side logout failed, clearing locally anyway");
            }
        }

        self.store.clear().await?;
        *self.session.write().await = None;
        self.publish().await;

        info!("Logged out");
        Ok(())
    }

    async fn clear_local_session(&self) {
        *self.session.write().await = None;
        // Best-effort: if the row delete fails the in-memory state still
        // wins for this process lifetime.
        if let Err(e) = self.store.clear().await {
            warn!(?e, "Failed to clear persisted credentials");
        }
        self.publish().await;
    }

    async fn publish(&self) {
        let state = match self.session.read().await.as_ref() {
            Some(s) => AuthState::LoggedIn {
                user: s.user.clone(),
            },
            None => AuthState::LoggedOut,
        };
        let _ = self.state_tx.send(state);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The current access token, if logged in.
    pub async fn access_token(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    /// The logged-in user, if any.
    pub async fn current_user(&self) -> Option<User> {
        self.session.read().await.as_ref().map(|s| s.user.clone())
    }

    pub async fn is_logged_in(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// Subscribes to auth state changes. The receiver immediately holds
    /// the current state.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state_tx.subscribe()
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

// =============================================================================
// Tests
// =============================================================================
