//! # Authenticated HTTP Transport
//!
//! Wraps `reqwest::Client` with bearer-token injection and the single
//! 401 refresh-retry.
//!
//! ## Request Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     AuthedClient::execute                               │
//! │                                                                         │
//! │   build request ──► attach bearer (if logged in) ──► send               │
//! │                                                       │                 │
//! │                             ┌─────────────────────────┤                 │
//! │                             │ 401 + had token?        │ anything else   │
//! │                             ▼                         ▼                 │
//! │                     refresh (coalesced) ──ok──► rebuild + resend        │
//! │                             │                         │                 │
//! │                             │ refresh failed          ▼                 │
//! │                             ▼                  return response          │
//! │                     return ORIGINAL 401                                 │
//! │                     (caller maps to auth error)                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - At most ONE refresh-retry per logical request, even if the retried
//!   response is itself a 401 (no recursion)
//! - The request builder closure is re-invoked for the retry, so bodies
//!   (including multipart forms) are rebuilt rather than reused
//! - Requests without a stored session go out with no Authorization
//!   header and are never retried

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::error::SyncResult;
use crate::session::SessionManager;

/// HTTP client that authenticates requests against the current session.
#[derive(Clone)]
pub struct AuthedClient {
    client: Client,
    session: Arc<SessionManager>,
}

impl AuthedClient {
    pub fn new(client: Client, session: Arc<SessionManager>) -> Self {
        AuthedClient { client, session }
    }

    /// Builds a `reqwest::Client` with the configured timeouts.
    pub fn build_http_client(config: &ServerConfig) -> SyncResult<Client> {
        Ok(Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?)
    }

    /// Executes a request with bearer auth and at most one refresh-retry.
    ///
    /// `build` is called once per attempt so the retry gets a fresh body.
    /// The returned response may still be an error status; the caller owns
    /// status interpretation.
    pub async fn execute<F>(&self, build: F) -> SyncResult<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let token = self.session.access_token().await;

        let request = match &token {
            Some(t) => build(&self.client).bearer_auth(t),
            None => build(&self.client),
        };
        let response = request.send().await?;

        let stale = match token {
            Some(t) if response.status() == StatusCode::UNAUTHORIZED => t,
            _ => return Ok(response),
        };

        debug!("Request returned 401, attempting token refresh");
        let fresh = match self.session.refresh_access_token(&stale).await {
            Ok(fresh) => fresh,
            Err(e) => {
                // Hand the original 401 back; the session manager has
                // already decided whether the session is dead.
                warn!(?e, "Token refresh failed, returning original 401");
                return Ok(response);
            }
        };

        let retried = build(&self.client).bearer_auth(&fresh).send().await?;
        Ok(retried)
    }
}
