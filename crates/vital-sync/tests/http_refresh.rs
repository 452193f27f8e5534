//! End-to-end test of the authenticated transport against a real local HTTP
//! server: expired access token, 401, coalesced refresh, single retry.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};

use vital_core::{Session, User};
use vital_db::{Database, DbConfig};
use vital_sync::{
    AuthError, AuthedClient, HttpAuthApi, HttpRemoteApi, MetricUpsertRequest, RemoteApi,
    SessionManager, SyncError,
};

const EXPIRED_TOKEN: &str = "expired-access";
const FRESH_TOKEN: &str = "fresh-access";

struct ServerState {
    refresh_calls: AtomicUsize,
    metric_calls: AtomicUsize,
    /// When false the refresh endpoint rejects every attempt.
    refresh_works: bool,
}

async fn refresh_handler(State(state): State<Arc<ServerState>>) -> (StatusCode, Json<Value>) {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    if state.refresh_works {
        (
            StatusCode::OK,
            Json(json!({ "success": true, "accessToken": FRESH_TOKEN })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": "refresh token revoked" })),
        )
    }
}

async fn metrics_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.metric_calls.fetch_add(1, Ordering::SeqCst);

    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {FRESH_TOKEN}"))
        .unwrap_or(false);

    if authorized {
        (StatusCode::OK, Json(json!({ "entryId": "srv-1" })))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "invalid token" })),
        )
    }
}

async fn start_server(refresh_works: bool) -> (SocketAddr, Arc<ServerState>) {
    let state = Arc::new(ServerState {
        refresh_calls: AtomicUsize::new(0),
        metric_calls: AtomicUsize::new(0),
        refresh_works,
    });

    let app = Router::new()
        .route("/auth/refresh", post(refresh_handler))
        .route("/api/metrics", post(metrics_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// Seeds a persisted session holding the expired access token and wires the
/// full transport stack against the local server.
async fn stack(addr: SocketAddr) -> (Arc<SessionManager>, HttpRemoteApi) {
    let base_url = format!("http://{addr}");
    let db = Database::new(DbConfig::in_memory()).await.unwrap();

    db.credentials()
        .put(&Session {
            user: User {
                id: "u1".into(),
                username: "alice".into(),
                email: None,
            },
            access_token: EXPIRED_TOKEN.into(),
            refresh_token: "refresh-1".into(),
            device_id: "device-1".into(),
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

    let http = reqwest::Client::new();
    let auth_api = Arc::new(HttpAuthApi::new(http.clone(), base_url.clone()));
    let session = Arc::new(SessionManager::new(
        db.credentials(),
        auth_api,
        "device-1".into(),
    ));
    session.restore().await.unwrap();

    let transport = AuthedClient::new(http, session.clone());
    let remote = HttpRemoteApi::new(transport, base_url);
    (session, remote)
}

fn request() -> MetricUpsertRequest {
    MetricUpsertRequest {
        metric_type_id: 1,
        value: 82.5,
        date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
        is_apple_health: false,
    }
}

#[tokio::test]
async fn expired_token_is_refreshed_and_request_retried_once() {
    let (addr, state) = start_server(true).await;
    let (session, remote) = stack(addr).await;

    let server_id = remote.create_metric(&request()).await.unwrap();
    assert_eq!(server_id, "srv-1");

    // One 401 attempt, one refresh, one successful retry
    assert_eq!(state.metric_calls.load(Ordering::SeqCst), 2);
    assert_eq!(state.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.access_token().await.as_deref(), Some(FRESH_TOKEN));
}

#[tokio::test]
async fn concurrent_requests_share_one_refresh() {
    let (addr, state) = start_server(true).await;
    let (_session, remote) = stack(addr).await;
    let remote = Arc::new(remote);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let remote = remote.clone();
        handles.push(tokio::spawn(async move {
            remote.create_metric(&request()).await.unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), "srv-1");
    }

    assert_eq!(state.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_refresh_surfaces_auth_error_without_retry_loop() {
    let (addr, state) = start_server(false).await;
    let (session, remote) = stack(addr).await;

    let err = remote.create_metric(&request()).await.unwrap_err();
    assert!(matches!(err, SyncError::Auth(AuthError::TokenExpired)));

    // The original 401 was NOT retried after the refresh failed
    assert_eq!(state.metric_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.refresh_calls.load(Ordering::SeqCst), 1);

    // The refresh endpoint said the refresh token is dead: session cleared
    assert!(!session.is_logged_in().await);
}

#[tokio::test]
async fn logged_out_requests_carry_no_bearer_and_skip_refresh() {
    let (addr, state) = start_server(true).await;
    let base_url = format!("http://{addr}");

    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let http = reqwest::Client::new();
    let auth_api = Arc::new(HttpAuthApi::new(http.clone(), base_url.clone()));
    let session = Arc::new(SessionManager::new(
        db.credentials(),
        auth_api,
        "device-1".into(),
    ));

    let remote = HttpRemoteApi::new(AuthedClient::new(http, session), base_url);
    let err = remote.create_metric(&request()).await.unwrap_err();
    assert!(matches!(err, SyncError::Auth(AuthError::TokenExpired)));

    // Exactly one unauthenticated attempt, no refresh
    assert_eq!(state.metric_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.refresh_calls.load(Ordering::SeqCst), 0);
}
