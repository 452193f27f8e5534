//! # Vital Sync
//!
//! Offline-first sync layer for Vital: records health entries into a durable
//! local queue and reconciles them with the remote API when connectivity and
//! a valid session allow.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         vital-sync                                      │
//! │                                                                         │
//! │   app / UI layer                                                        │
//! │        │ record / edit / delete          │ watch::Receiver<SyncState>   │
//! │        ▼                                 ▲                              │
//! │   ┌──────────────────────────────────────┴───────────┐                  │
//! │   │                  SyncEngine                      │                  │
//! │   │   single-flight passes over the entry queue      │                  │
//! │   └───────┬──────────────────────────────┬───────────┘                  │
//! │           │ vital-db                     │ RemoteApi                    │
//! │           ▼                              ▼                              │
//! │   ┌───────────────┐            ┌──────────────────┐                     │
//! │   │  entry queue  │            │  HttpRemoteApi   │                     │
//! │   │  credentials  │            │        │         │                     │
//! │   └───────────────┘            │  AuthedClient    │ 401 → refresh,      │
//! │           ▲                    │        │         │ retry once          │
//! │           │                    │ SessionManager   │                     │
//! │           └────────────────────┤  (coalesced      │                     │
//! │                                │   refresh)       │                     │
//! │                                └──────────────────┘                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//! ```no_run
//! use std::sync::Arc;
//! use vital_db::{Database, DbConfig};
//! use vital_sync::{
//!     AuthedClient, HttpAuthApi, HttpRemoteApi, SessionManager, SyncConfig, SyncEngine,
//! };
//!
//! # async fn run() -> vital_sync::SyncResult<()> {
//! let config = SyncConfig::load_or_default(None);
//! config.validate()?;
//!
//! let db = Database::new(DbConfig::new("vital.db")).await?;
//!
//! let http = AuthedClient::build_http_client(&config.server)?;
//! let auth_api = Arc::new(HttpAuthApi::new(http.clone(), &config.server.base_url));
//! let session = Arc::new(SessionManager::new(
//!     db.credentials(),
//!     auth_api,
//!     config.device_id().to_string(),
//! ));
//! session.restore().await?;
//!
//! let transport = AuthedClient::new(http, session.clone());
//! let remote = Arc::new(HttpRemoteApi::new(transport, &config.server.base_url));
//!
//! let engine = Arc::new(SyncEngine::new(db.entries(), session, remote, &config.sync));
//! engine.refresh_counts().await?;
//! let _watcher = engine.spawn();
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod session;
pub mod transport;

pub use api::{
    AuthApi, HttpAuthApi, HttpRemoteApi, ImageUploadRequest, LoginOutcome, MetricEntryDto,
    MetricTypeDto, MetricUpdateRequest, MetricUpsertRequest, RefreshOutcome, RemoteApi,
};
pub use config::{DeviceConfig, ServerConfig, SyncConfig, SyncSettings};
pub use engine::{PassSummary, SyncEngine};
pub use error::{AuthError, SyncError, SyncResult};
pub use session::{AuthState, SessionManager};
pub use transport::AuthedClient;
