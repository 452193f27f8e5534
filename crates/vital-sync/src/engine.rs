//! # Sync Engine
//!
//! Drains the local entry queue against the remote API and publishes
//! observable aggregate state.
//!
//! ## Pass Structure
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Sync Pass                                     │
//! │                                                                         │
//! │  try_lock ──busy──► return { already_running }                          │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  UPLOAD PHASE          pending(batch) oldest-first                      │
//! │     for each entry:    mark_syncing ─► upload ─┬─ ok ──► mark_synced   │
//! │                                                ├─ 404 ──► deleted on   │
//! │                                                │          server+purge │
//! │                                                └─ err ──► mark_failed  │
//! │                                                           (pass goes   │
//! │                                                            on; auth-   │
//! │                                                            fatal stops)│
//! │  DELETE PHASE          tombstones()                                     │
//! │     for each:          remote delete ─► purge (404 counts as done)      │
//! │                                                                         │
//! │  FINALIZE              recompute counts, publish SyncState              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - At most one pass runs at a time (`try_lock`, never queued)
//! - One entry failing never blocks the rest of the batch
//! - Unrecoverable auth failure aborts the pass; untouched entries keep
//!   their eligible status
//! - The published `SyncState` always reflects the queue after the pass

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vital_core::{EntryKind, EntryPayload, SyncEntry, SyncState};
use vital_db::EntryQueueRepository;

use crate::api::{
    ImageUploadRequest, MetricEntryDto, MetricTypeDto, MetricUpdateRequest, MetricUpsertRequest,
    RemoteApi,
};
use crate::config::SyncSettings;
use crate::error::{AuthError, SyncError, SyncResult};
use crate::session::SessionManager;

// =============================================================================
// Pass Summary
// =============================================================================

/// Outcome of a single sync pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassSummary {
    /// Entries uploaded (created or updated) this pass.
    pub uploaded: usize,
    /// Entries confirmed deleted (tombstones resolved or conflicts).
    pub deleted: usize,
    /// Entries that failed and remain eligible for the next pass.
    pub failed: usize,
    /// True if another pass held the lock; nothing was done.
    pub already_running: bool,
    /// Message of the last per-entry failure, if any.
    pub last_error: Option<String>,
}

// =============================================================================
// Sync Engine
// =============================================================================

/// Orchestrates sync passes over the entry queue.
pub struct SyncEngine {
    queue: EntryQueueRepository,
    session: Arc<SessionManager>,
    api: Arc<dyn RemoteApi>,
    batch_size: u32,
    page_size: u32,
    retry_delay: Duration,
    state_tx: watch::Sender<SyncState>,
    /// Single-flight guard. `try_lock`: a second trigger is dropped, not
    /// queued, so triggers never pile up behind a slow pass.
    pass_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        queue: EntryQueueRepository,
        session: Arc<SessionManager>,
        api: Arc<dyn RemoteApi>,
        settings: &SyncSettings,
    ) -> Self {
        let (state_tx, _) = watch::channel(SyncState::default());
        SyncEngine {
            queue,
            session,
            api,
            batch_size: settings.batch_size,
            page_size: settings.page_size,
            retry_delay: Duration::from_secs(settings.retry_delay_secs),
            state_tx,
            pass_lock: Mutex::new(()),
        }
    }

    // =========================================================================
    // Local Recording
    // =========================================================================

    /// Records a metric locally and queues it for upload.
    pub async fn record_metric(
        &self,
        value: f64,
        metric_type_id: i64,
        recorded_on: NaiveDate,
    ) -> SyncResult<SyncEntry> {
        let entry = SyncEntry::new_metric(value, metric_type_id, recorded_on);
        self.queue.enqueue(&entry).await?;
        self.refresh_counts().await?;
        Ok(entry)
    }

    /// Records an image entry locally and queues it for upload. The file
    /// itself is read at upload time.
    pub async fn record_image(
        &self,
        file_path: impl Into<String>,
        image_type_id: i64,
        recorded_on: NaiveDate,
    ) -> SyncResult<SyncEntry> {
        let entry = SyncEntry::new_image(file_path.into(), image_type_id, recorded_on);
        self.queue.enqueue(&entry).await?;
        self.refresh_counts().await?;
        Ok(entry)
    }

    /// Applies a local edit to an existing metric entry and re-queues it.
    ///
    /// If the entry is mid-upload the edit is parked and applied when the
    /// in-flight attempt resolves.
    pub async fn edit_metric(
        &self,
        local_id: &str,
        value: f64,
        metric_type_id: i64,
        recorded_on: NaiveDate,
    ) -> SyncResult<()> {
        let mut entry = self
            .queue
            .get(local_id)
            .await?
            .ok_or_else(|| SyncError::Internal(format!("no entry with local id {local_id}")))?;

        entry.payload = EntryPayload::Metric {
            value,
            metric_type_id,
            recorded_on,
            imported: false,
        };
        self.queue.enqueue(&entry).await?;
        self.refresh_counts().await?;
        Ok(())
    }

    /// Deletes an entry locally. If the server has a copy, a tombstone is
    /// left for the next pass; otherwise the record is gone immediately.
    pub async fn delete_entry(&self, local_id: &str) -> SyncResult<()> {
        let tombstoned = self.queue.mark_deleted_locally(local_id).await?;
        debug!(local_id, tombstoned, "Entry deleted locally");
        self.refresh_counts().await?;
        Ok(())
    }

    // =========================================================================
    // Sync Pass
    // =========================================================================

    /// Runs one sync pass. Returns immediately with `already_running` if a
    /// pass is in flight.
    pub async fn sync_now(&self) -> SyncResult<PassSummary> {
        let _guard = match self.pass_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Sync pass already running, skipping trigger");
                return Ok(PassSummary {
                    already_running: true,
                    ..PassSummary::default()
                });
            }
        };

        if !self.session.is_logged_in().await {
            return Err(SyncError::Auth(AuthError::NotLoggedIn));
        }

        self.state_tx.send_modify(|s| {
            s.is_syncing = true;
        });

        // A storage failure mid-pass must still clear `is_syncing`; a stuck
        // flag would disable the auto-sync trigger for the process lifetime.
        let outcome = self.run_pass().await;
        self.finalize(&outcome).await;
        outcome.map(|(summary, _)| summary)
    }

    async fn run_pass(&self) -> SyncResult<(PassSummary, bool)> {
        let mut summary = PassSummary::default();
        let mut aborted = false;

        // --- Upload phase ---------------------------------------------------
        let batch = self.queue.pending(self.batch_size).await?;
        info!(batch = batch.len(), "Starting sync pass");

        for entry in batch {
            self.queue.mark_syncing(&entry.local_id).await?;

            match self.upload(&entry).await {
                Ok(server_id) => {
                    self.queue.mark_synced(&entry.local_id, &server_id).await?;
                    summary.uploaded += 1;
                }
                Err(e) if e.is_conflict() => {
                    // Server says the entry is gone: adopt its view.
                    warn!(local_id = %entry.local_id, "Entry deleted on server, dropping local copy");
                    self.queue.mark_deleted_on_server(&entry.local_id).await?;
                    self.queue.purge(&entry.local_id).await?;
                    summary.deleted += 1;
                }
                Err(e) => {
                    let message = e.to_string();
                    self.queue.mark_failed(&entry.local_id, &message).await?;
                    summary.failed += 1;
                    summary.last_error = Some(message);

                    if e.is_auth_fatal() {
                        warn!(local_id = %entry.local_id, "Authentication dead, aborting pass");
                        aborted = true;
                        break;
                    }
                    warn!(local_id = %entry.local_id, error = %e, "Upload failed, continuing pass");
                }
            }
        }

        // --- Delete phase ---------------------------------------------------
        if !aborted {
            for tombstone in self.queue.tombstones().await? {
                match &tombstone.server_id {
                    // Never reached the server; nothing to delete remotely.
                    None => {
                        self.queue.purge(&tombstone.local_id).await?;
                        summary.deleted += 1;
                    }
                    Some(server_id) => match self.remote_delete(tombstone.kind(), server_id).await {
                        Ok(()) => {
                            self.queue.purge(&tombstone.local_id).await?;
                            summary.deleted += 1;
                        }
                        Err(e) if e.is_conflict() => {
                            // Already gone server-side; that is what we wanted.
                            self.queue.purge(&tombstone.local_id).await?;
                            summary.deleted += 1;
                        }
                        Err(e) => {
                            let message = e.to_string();
                            self.queue.mark_failed(&tombstone.local_id, &message).await?;
                            summary.failed += 1;
                            summary.last_error = Some(message);

                            if e.is_auth_fatal() {
                                aborted = true;
                                break;
                            }
                        }
                    },
                }
            }
        }

        info!(
            uploaded = summary.uploaded,
            deleted = summary.deleted,
            failed = summary.failed,
            aborted,
            "Sync pass finished"
        );
        Ok((summary, aborted))
    }

    /// Publishes the post-pass state. Always clears `is_syncing`, whether the
    /// pass completed, aborted, or died on a storage error.
    async fn finalize(&self, outcome: &SyncResult<(PassSummary, bool)>) {
        let (last_error, completed) = match outcome {
            Ok((summary, aborted)) => (summary.last_error.clone(), !aborted),
            Err(e) => (Some(e.to_string()), false),
        };

        // Counts are unavailable when storage itself is the failure; clearing
        // the flag must not depend on them.
        let counts = self.queue.counts().await.ok();

        self.state_tx.send_modify(|s| {
            s.is_syncing = false;
            if let Some((pending, failed)) = counts {
                s.pending_uploads = pending;
                s.failed_uploads = failed;
            }
            s.last_error = last_error.clone();
            // An aborted or errored pass never reached the end; its
            // timestamp would overstate freshness
            if completed {
                s.last_sync = Some(Utc::now());
            }
        });
    }

    async fn upload(&self, entry: &SyncEntry) -> SyncResult<String> {
        match &entry.payload {
            EntryPayload::Metric {
                value,
                metric_type_id,
                recorded_on,
                imported,
            } => match &entry.server_id {
                Some(server_id) => {
                    let request = MetricUpdateRequest {
                        value: *value,
                        date: *recorded_on,
                        is_apple_health: *imported,
                    };
                    self.api.update_metric(server_id, &request).await?;
                    Ok(server_id.clone())
                }
                None => {
                    let request = MetricUpsertRequest {
                        metric_type_id: *metric_type_id,
                        value: *value,
                        date: *recorded_on,
                        is_apple_health: *imported,
                    };
                    self.api.create_metric(&request).await
                }
            },

            EntryPayload::Image {
                file_path,
                image_type_id,
                recorded_on,
            } => match &entry.server_id {
                // Images are immutable once uploaded.
                Some(server_id) => Ok(server_id.clone()),
                None => {
                    self.api
                        .upload_image(&ImageUploadRequest {
                            file_path: file_path.clone(),
                            image_type_id: *image_type_id,
                            recorded_on: *recorded_on,
                        })
                        .await
                }
            },
        }
    }

    async fn remote_delete(&self, kind: EntryKind, server_id: &str) -> SyncResult<()> {
        match kind {
            EntryKind::Metric => self.api.delete_metric(server_id).await,
            EntryKind::Image => self.api.delete_image(server_id).await,
        }
    }

    // =========================================================================
    // Remote Reads
    // =========================================================================

    /// Fetches a page of the user's metric entries from the server.
    pub async fn list_remote_metrics(
        &self,
        metric_type_id: Option<i64>,
        page: u32,
    ) -> SyncResult<Vec<MetricEntryDto>> {
        self.api
            .list_metrics(metric_type_id, self.page_size, page * self.page_size)
            .await
    }

    /// Fetches the server's metric type catalog.
    pub async fn fetch_metric_types(&self) -> SyncResult<Vec<MetricTypeDto>> {
        self.api.fetch_metric_types().await
    }

    // =========================================================================
    // Observable State
    // =========================================================================

    /// Subscribes to sync state changes. Late subscribers immediately see
    /// the current state.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    /// Records a connectivity change. Coming online with pending entries
    /// makes [`spawn`](Self::spawn)'s watcher trigger a pass.
    pub fn set_online(&self, online: bool) {
        self.state_tx.send_modify(|s| {
            s.is_online = online;
        });
    }

    /// Recomputes queue counters and publishes them.
    pub async fn refresh_counts(&self) -> SyncResult<()> {
        let (pending, failed) = self.queue.counts().await?;
        self.state_tx.send_modify(|s| {
            s.pending_uploads = pending;
            s.failed_uploads = failed;
        });
        Ok(())
    }

    /// Spawns the auto-sync watcher: whenever the published state says a
    /// pass should run (online, pending work, not already syncing), one is
    /// triggered. A pass that left retryable failures behind delays the next
    /// trigger by `retry_delay_secs`. The task ends when the engine is
    /// dropped.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let mut rx = engine.subscribe();

        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let should_run = rx.borrow_and_update().should_auto_sync();
                if !(should_run && engine.session.is_logged_in().await) {
                    continue;
                }

                debug!("Auto-sync triggered");
                let outcome = engine.sync_now().await;
                if let Err(e) = &outcome {
                    warn!(?e, "Auto-sync pass failed");
                }
                if Self::should_back_off(&outcome) {
                    tokio::time::sleep(engine.retry_delay).await;
                }
            }
        })
    }

    /// Whether the watcher should wait before the next trigger. Per-entry
    /// failures and retryable pass errors get a delayed retry; errors that
    /// retrying cannot fix (dead auth, broken storage) wait for a state
    /// change instead.
    fn should_back_off(outcome: &SyncResult<PassSummary>) -> bool {
        match outcome {
            Ok(summary) => summary.failed > 0,
            Err(e) => e.is_retryable(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AuthApi, LoginOutcome, RefreshOutcome};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use vital_core::User;
    use vital_db::{Database, DbConfig};

    // -------------------------------------------------------------------------
    // Fakes
    // -------------------------------------------------------------------------

    struct FakeAuth;

    #[async_trait]
    impl AuthApi for FakeAuth {
        async fn login(
            &self,
            username: &str,
            _password: &str,
            _device_id: &str,
        ) -> Result<LoginOutcome, AuthError> {
            Ok(LoginOutcome {
                access_token: "access".into(),
                refresh_token: "refresh".into(),
                user: User {
                    id: "u1".into(),
                    username: username.into(),
                    email: None,
                },
            })
        }

        async fn register(
            &self,
            username: &str,
            _password: &str,
            email: Option<&str>,
        ) -> Result<User, AuthError> {
            Ok(User {
                id: "u1".into(),
                username: username.into(),
                email: email.map(str::to_string),
            })
        }

        async fn refresh(
            &self,
            _refresh_token: &str,
            _device_id: &str,
        ) -> Result<RefreshOutcome, AuthError> {
            Ok(RefreshOutcome {
                access_token: "access-2".into(),
                refresh_token: None,
            })
        }

        async fn logout(&self, _access_token: &str, _device_id: &str) -> Result<(), AuthError> {
            Ok(())
        }
    }

    /// Failure mode injected into [`FakeRemote`].
    #[derive(Clone, Copy, PartialEq)]
    enum Failure {
        None,
        Offline,
        AuthDead,
        ConflictOnUpdate,
    }

    /// In-memory server recording every call.
    struct FakeRemote {
        next_id: AtomicUsize,
        calls: StdMutex<Vec<String>>,
        failure: Failure,
        /// Per-call delay, for exercising the single-flight guard.
        delay: Option<Duration>,
    }

    impl FakeRemote {
        fn new() -> Self {
            Self::with_failure(Failure::None)
        }

        fn with_failure(failure: Failure) -> Self {
            FakeRemote {
                next_id: AtomicUsize::new(1),
                calls: StdMutex::new(Vec::new()),
                failure,
                delay: None,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        async fn gate(&self, call: String) -> SyncResult<()> {
            self.calls.lock().unwrap().push(call);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.failure {
                Failure::Offline => Err(SyncError::Network("connection refused".into())),
                Failure::AuthDead => Err(SyncError::Auth(AuthError::TokenExpired)),
                _ => Ok(()),
            }
        }
    }

    #[async_trait]
    impl RemoteApi for FakeRemote {
        async fn create_metric(&self, req: &MetricUpsertRequest) -> SyncResult<String> {
            self.gate(format!("create value={}", req.value)).await?;
            Ok(format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
        }

        async fn update_metric(
            &self,
            server_id: &str,
            req: &MetricUpdateRequest,
        ) -> SyncResult<()> {
            self.gate(format!("update {} value={}", server_id, req.value))
                .await?;
            if self.failure == Failure::ConflictOnUpdate {
                return Err(SyncError::Conflict(server_id.into()));
            }
            Ok(())
        }

        async fn delete_metric(&self, server_id: &str) -> SyncResult<()> {
            self.gate(format!("delete {server_id}")).await
        }

        async fn upload_image(&self, req: &ImageUploadRequest) -> SyncResult<String> {
            self.gate(format!("upload_image {}", req.file_path)).await?;
            Ok(format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
        }

        async fn delete_image(&self, server_id: &str) -> SyncResult<()> {
            self.gate(format!("delete_image {server_id}")).await
        }

        async fn list_metrics(
            &self,
            _metric_type_id: Option<i64>,
            _limit: u32,
            _offset: u32,
        ) -> SyncResult<Vec<MetricEntryDto>> {
            self.gate("list".into()).await?;
            Ok(Vec::new())
        }

        async fn fetch_metric_types(&self) -> SyncResult<Vec<MetricTypeDto>> {
            self.gate("types".into()).await?;
            Ok(Vec::new())
        }
    }

    async fn engine_with(remote: Arc<FakeRemote>) -> (Arc<SyncEngine>, Database) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let session = Arc::new(SessionManager::new(
            db.credentials(),
            Arc::new(FakeAuth),
            "device-1".into(),
        ));
        session.login("alice", "secret").await.unwrap();

        let engine = Arc::new(SyncEngine::new(
            db.entries(),
            session,
            remote,
            &SyncSettings::default(),
        ));
        (engine, db)
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    // -------------------------------------------------------------------------
    // Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_pass_uploads_oldest_first() {
        let remote = Arc::new(FakeRemote::new());
        let (engine, db) = engine_with(remote.clone()).await;

        let a = engine.record_metric(70.0, 1, date()).await.unwrap();
        let b = engine.record_metric(71.0, 1, date()).await.unwrap();

        let summary = engine.sync_now().await.unwrap();
        assert_eq!(summary.uploaded, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(
            remote.calls(),
            vec!["create value=70", "create value=71"]
        );

        let stored_a = db.entries().get(&a.local_id).await.unwrap().unwrap();
        let stored_b = db.entries().get(&b.local_id).await.unwrap().unwrap();
        assert_eq!(stored_a.server_id.as_deref(), Some("srv-1"));
        assert_eq!(stored_b.server_id.as_deref(), Some("srv-2"));

        let state = engine.subscribe().borrow().clone();
        assert_eq!(state.pending_uploads, 0);
        assert!(state.last_sync.is_some());
        assert!(!state.is_syncing);
    }

    #[tokio::test]
    async fn test_second_pass_is_a_no_op() {
        let remote = Arc::new(FakeRemote::new());
        let (engine, _db) = engine_with(remote.clone()).await;

        engine.record_metric(70.0, 1, date()).await.unwrap();
        engine.sync_now().await.unwrap();

        let summary = engine.sync_now().await.unwrap();
        assert_eq!(summary.uploaded, 0);
        assert_eq!(remote.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_edit_after_sync_issues_update() {
        let remote = Arc::new(FakeRemote::new());
        let (engine, _db) = engine_with(remote.clone()).await;

        let entry = engine.record_metric(70.0, 1, date()).await.unwrap();
        engine.sync_now().await.unwrap();

        engine.edit_metric(&entry.local_id, 72.5, 1, date()).await.unwrap();
        let summary = engine.sync_now().await.unwrap();

        assert_eq!(summary.uploaded, 1);
        assert_eq!(
            remote.calls(),
            vec!["create value=70", "update srv-1 value=72.5"]
        );
    }

    #[tokio::test]
    async fn test_offline_marks_all_failed_and_pass_continues() {
        let remote = Arc::new(FakeRemote::with_failure(Failure::Offline));
        let (engine, db) = engine_with(remote.clone()).await;

        let a = engine.record_metric(70.0, 1, date()).await.unwrap();
        let b = engine.record_metric(71.0, 1, date()).await.unwrap();

        let summary = engine.sync_now().await.unwrap();
        assert_eq!(summary.uploaded, 0);
        assert_eq!(summary.failed, 2);
        assert!(summary.last_error.unwrap().contains("connection refused"));
        // One entry failing did not stop the other from being attempted
        assert_eq!(remote.calls().len(), 2);

        for id in [&a.local_id, &b.local_id] {
            let stored = db.entries().get(id).await.unwrap().unwrap();
            assert_eq!(stored.attempts, 1);
        }

        let state = engine.subscribe().borrow().clone();
        assert_eq!(state.failed_uploads, 2);
        assert_eq!(state.pending_uploads, 2);
        assert!(state.last_error.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_auth_fatal_aborts_pass_without_touching_rest() {
        let remote = Arc::new(FakeRemote::with_failure(Failure::AuthDead));
        let (engine, db) = engine_with(remote.clone()).await;

        let a = engine.record_metric(70.0, 1, date()).await.unwrap();
        let b = engine.record_metric(71.0, 1, date()).await.unwrap();

        let summary = engine.sync_now().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(remote.calls().len(), 1);

        // First entry recorded the failure; second was never attempted
        let stored_a = db.entries().get(&a.local_id).await.unwrap().unwrap();
        let stored_b = db.entries().get(&b.local_id).await.unwrap().unwrap();
        assert_eq!(stored_a.attempts, 1);
        assert_eq!(stored_b.attempts, 0);
    }

    #[tokio::test]
    async fn test_conflict_adopts_server_deletion() {
        let remote = Arc::new(FakeRemote::with_failure(Failure::ConflictOnUpdate));
        let (engine, db) = engine_with(remote.clone()).await;

        let entry = engine.record_metric(70.0, 1, date()).await.unwrap();
        // First pass creates fine (create is not the conflicting call)
        engine.sync_now().await.unwrap();

        engine.edit_metric(&entry.local_id, 71.0, 1, date()).await.unwrap();
        let summary = engine.sync_now().await.unwrap();

        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.failed, 0);
        assert!(db.entries().get(&entry.local_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tombstone_deleted_remotely_then_purged() {
        let remote = Arc::new(FakeRemote::new());
        let (engine, db) = engine_with(remote.clone()).await;

        let entry = engine.record_metric(70.0, 1, date()).await.unwrap();
        engine.sync_now().await.unwrap();

        engine.delete_entry(&entry.local_id).await.unwrap();
        let summary = engine.sync_now().await.unwrap();

        assert_eq!(summary.deleted, 1);
        assert_eq!(
            remote.calls(),
            vec!["create value=70", "delete srv-1"]
        );
        assert!(db.entries().get(&entry.local_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_before_upload_needs_no_network() {
        let remote = Arc::new(FakeRemote::new());
        let (engine, db) = engine_with(remote.clone()).await;

        let entry = engine.record_metric(70.0, 1, date()).await.unwrap();
        engine.delete_entry(&entry.local_id).await.unwrap();

        let summary = engine.sync_now().await.unwrap();
        assert_eq!(summary.uploaded, 0);
        assert_eq!(summary.deleted, 0);
        assert!(remote.calls().is_empty());
        assert!(db.entries().get(&entry.local_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_trigger_is_dropped() {
        let mut remote = FakeRemote::new();
        remote.delay = Some(Duration::from_millis(100));
        let remote = Arc::new(remote);
        let (engine, _db) = engine_with(remote.clone()).await;

        engine.record_metric(70.0, 1, date()).await.unwrap();

        let slow = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.sync_now().await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = engine.sync_now().await.unwrap();
        assert!(second.already_running);

        let first = slow.await.unwrap();
        assert_eq!(first.uploaded, 1);
        assert_eq!(remote.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_requires_login() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let session = Arc::new(SessionManager::new(
            db.credentials(),
            Arc::new(FakeAuth),
            "device-1".into(),
        ));
        let engine = SyncEngine::new(
            db.entries(),
            session,
            Arc::new(FakeRemote::new()),
            &SyncSettings::default(),
        );

        let err = engine.sync_now().await.unwrap_err();
        assert!(err.is_auth_fatal());
    }

    #[tokio::test]
    async fn test_image_entries_upload_as_multipart_call() {
        let remote = Arc::new(FakeRemote::new());
        let (engine, db) = engine_with(remote.clone()).await;

        let entry = engine
            .record_image("/tmp/progress.jpg", 2, date())
            .await
            .unwrap();
        let summary = engine.sync_now().await.unwrap();

        assert_eq!(summary.uploaded, 1);
        assert_eq!(remote.calls(), vec!["upload_image /tmp/progress.jpg"]);

        let stored = db.entries().get(&entry.local_id).await.unwrap().unwrap();
        assert_eq!(stored.server_id.as_deref(), Some("srv-1"));
    }

    #[tokio::test]
    async fn test_auto_sync_triggers_on_coming_online() {
        let remote = Arc::new(FakeRemote::new());
        let (engine, _db) = engine_with(remote.clone()).await;
        let _watcher = engine.spawn();

        engine.record_metric(70.0, 1, date()).await.unwrap();
        engine.set_online(true);

        // Give the watcher a moment to run the pass
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if !remote.calls().is_empty() {
                break;
            }
        }
        assert_eq!(remote.calls(), vec!["create value=70"]);
    }

    #[tokio::test]
    async fn test_storage_failure_mid_pass_still_clears_syncing_flag() {
        let remote = Arc::new(FakeRemote::new());
        let (engine, db) = engine_with(remote.clone()).await;

        engine.record_metric(70.0, 1, date()).await.unwrap();
        // Storage dies out from under the pass
        db.close().await;

        let err = engine.sync_now().await.unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));

        // A stuck flag would block should_auto_sync for the process lifetime
        let state = engine.subscribe().borrow().clone();
        assert!(!state.is_syncing);
        assert!(state.last_error.is_some());
        assert!(state.last_sync.is_none());
    }

    #[test]
    fn test_backoff_only_for_retryable_outcomes() {
        let failures = PassSummary {
            failed: 1,
            ..PassSummary::default()
        };
        assert!(SyncEngine::should_back_off(&Ok(failures)));
        assert!(!SyncEngine::should_back_off(&Ok(PassSummary::default())));

        assert!(SyncEngine::should_back_off(&Err(SyncError::Network(
            "unreachable".into()
        ))));
        // Retrying cannot revive a dead session; wait for a login instead
        assert!(!SyncEngine::should_back_off(&Err(SyncError::Auth(
            AuthError::TokenRevoked
        ))));
    }
}
