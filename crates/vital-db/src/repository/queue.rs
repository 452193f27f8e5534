//! # Local Entry Queue Repository
//!
//! Durable, app-local record of metric/image entries pending reconciliation
//! with the server.
//!
//! ## The Queue Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Entry Queue Implementation                           │
//! │                                                                         │
//! │  LOCAL OPERATION (e.g., record weight)                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  enqueue() ── INSERT OR UPDATE by local_id, status := 'pending'        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            SYNC PASS (vital-sync orchestrator)                  │   │
//! │  │                                                                 │   │
//! │  │  1. pending(limit) ── oldest first, status IN (pending,failed) │   │
//! │  │  2. mark_syncing(id)                                           │   │
//! │  │  3. Upload to remote API                                       │   │
//! │  │     On success: mark_synced(id, server_id)                     │   │
//! │  │     On failure: mark_failed(id, error)                         │   │
//! │  │  4. tombstones() ── delete remotely, then purge(id)            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • Exactly one row per local id                                        │
//! │  • Status transitions for one id are serialized (row-level tx)         │
//! │  • An edit during 'syncing' is parked in deferred_payload and          │
//! │    applied when the in-flight attempt resolves                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;

use crate::error::{DbError, DbResult};
use vital_core::{EntryPayload, SyncEntry, SyncStatus, PAYLOAD_SCHEMA_VERSION};

// =============================================================================
// Row Mapping
// =============================================================================

/// Raw row shape; payload columns stay JSON until decoded.
#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    local_id: String,
    server_id: Option<String>,
    payload: String,
    schema_version: i64,
    status: SyncStatus,
    attempts: i64,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    attempted_at: Option<DateTime<Utc>>,
}

impl EntryRow {
    fn into_entry(self) -> DbResult<SyncEntry> {
        if self.schema_version > PAYLOAD_SCHEMA_VERSION {
            return Err(DbError::Serialization(format!(
                "entry {} has payload schema v{}, this build reads up to v{}",
                self.local_id, self.schema_version, PAYLOAD_SCHEMA_VERSION
            )));
        }

        let payload: EntryPayload = serde_json::from_str(&self.payload)?;

        Ok(SyncEntry {
            local_id: self.local_id,
            server_id: self.server_id,
            payload,
            status: self.status,
            attempts: self.attempts,
            last_error: self.last_error,
            created_at: self.created_at,
            updated_at: self.updated_at,
            attempted_at: self.attempted_at,
        })
    }
}

const SELECT_COLUMNS: &str = "local_id, server_id, payload, schema_version, status, \
     attempts, last_error, created_at, updated_at, attempted_at";

// =============================================================================
// Entry Queue Repository
// =============================================================================

/// Repository for the `sync_entries` table.
#[derive(Debug, Clone)]
pub struct EntryQueueRepository {
    pool: SqlitePool,
}

impl EntryQueueRepository {
    /// Creates a new EntryQueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        EntryQueueRepository { pool }
    }

    /// Inserts or updates an entry by local id, resetting it to `pending`.
    ///
    /// Re-enqueueing an already-uploaded entry keeps its `server_id`, so the
    /// next pass issues an update instead of a create. If the row is mid-
    /// upload (`syncing`), the new payload is parked in `deferred_payload`
    /// and applied when the in-flight attempt resolves.
    pub async fn enqueue(&self, entry: &SyncEntry) -> DbResult<()> {
        entry
            .payload
            .validate()
            .map_err(|e| DbError::Serialization(e.to_string()))?;

        let payload_json = serde_json::to_string(&entry.payload)?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let current = fetch_status(&mut tx, &entry.local_id).await?;

        match current {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO sync_entries (
                        local_id, kind, server_id, payload, schema_version,
                        status, attempts, last_error, deferred_payload,
                        created_at, updated_at, attempted_at
                    ) VALUES (?1, ?2, NULL, ?3, ?4, 'pending', 0, NULL, NULL, ?5, ?5, NULL)
                    "#,
                )
                .bind(&entry.local_id)
                .bind(entry.kind())
                .bind(&payload_json)
                .bind(PAYLOAD_SCHEMA_VERSION)
                .bind(now)
                .execute(&mut *tx)
                .await?;

                debug!(local_id = %entry.local_id, kind = %entry.kind(), "Enqueued new entry");
            }

            Some(SyncStatus::Syncing) => {
                // Upload in flight: park the edit, do not race the attempt
                sqlx::query(
                    r#"
                    UPDATE sync_entries SET
                        deferred_payload = ?2,
                        updated_at = ?3
                    WHERE local_id = ?1
                    "#,
                )
                .bind(&entry.local_id)
                .bind(&payload_json)
                .bind(now)
                .execute(&mut *tx)
                .await?;

                debug!(local_id = %entry.local_id, "Deferred edit for in-flight entry");
            }

            Some(status @ (SyncStatus::DeletedLocally | SyncStatus::DeletedOnServer)) => {
                return Err(DbError::InvalidState {
                    id: entry.local_id.clone(),
                    status: status.as_str().into(),
                    operation: "enqueue".into(),
                });
            }

            Some(_) => {
                sqlx::query(
                    r#"
                    UPDATE sync_entries SET
                        payload = ?2,
                        schema_version = ?3,
                        status = 'pending',
                        last_error = NULL,
                        updated_at = ?4
                    WHERE local_id = ?1
                    "#,
                )
                .bind(&entry.local_id)
                .bind(&payload_json)
                .bind(PAYLOAD_SCHEMA_VERSION)
                .bind(now)
                .execute(&mut *tx)
                .await?;

                debug!(local_id = %entry.local_id, "Re-enqueued edited entry");
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Fetches one entry by local id.
    pub async fn get(&self, local_id: &str) -> DbResult<Option<SyncEntry>> {
        let row = sqlx::query_as::<_, EntryRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM sync_entries WHERE local_id = ?1"
        ))
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EntryRow::into_entry).transpose()
    }

    /// Entries that need upload, oldest creation first (FIFO).
    ///
    /// Oldest-first bounds the staleness of any one entry.
    pub async fn pending(&self, limit: u32) -> DbResult<Vec<SyncEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM sync_entries
            WHERE status IN ('pending', 'failed')
            ORDER BY created_at ASC
            LIMIT ?1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EntryRow::into_entry).collect()
    }

    /// Local tombstones awaiting server-side delete confirmation.
    pub async fn tombstones(&self) -> DbResult<Vec<SyncEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM sync_entries
            WHERE status = 'deleted_locally'
            ORDER BY created_at ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EntryRow::into_entry).collect()
    }

    /// Marks an entry as picked up by the current pass. Idempotent.
    ///
    /// Only `pending` and `failed` entries are eligible; a `syncing` entry
    /// stays `syncing` so a re-invocation cannot double-pick it.
    pub async fn mark_syncing(&self, local_id: &str) -> DbResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let status = require_status(&mut tx, local_id).await?;
        match status {
            SyncStatus::Pending | SyncStatus::Failed | SyncStatus::Syncing => {
                sqlx::query(
                    r#"
                    UPDATE sync_entries SET
                        status = 'syncing',
                        attempted_at = ?2
                    WHERE local_id = ?1
                    "#,
                )
                .bind(local_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            other => {
                return Err(DbError::InvalidState {
                    id: local_id.into(),
                    status: other.as_str().into(),
                    operation: "mark_syncing".into(),
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Records a successful upload: stores the server id and resolves the
    /// attempt.
    ///
    /// If an edit was parked while the upload was in flight, it is applied
    /// now and the entry returns to `pending`; otherwise the entry becomes
    /// `synced`. If the entry was tombstoned mid-flight only the server id
    /// is recorded, so the delete step can reach it.
    pub async fn mark_synced(&self, local_id: &str, server_id: &str) -> DbResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let status = require_status(&mut tx, local_id).await?;
        match status {
            SyncStatus::Syncing => {
                let deferred = fetch_deferred(&mut tx, local_id).await?;
                if let Some(deferred_json) = deferred {
                    sqlx::query(
                        r#"
                        UPDATE sync_entries SET
                            server_id = ?2,
                            payload = ?3,
                            deferred_payload = NULL,
                            status = 'pending',
                            last_error = NULL,
                            updated_at = ?4
                        WHERE local_id = ?1
                        "#,
                    )
                    .bind(local_id)
                    .bind(server_id)
                    .bind(&deferred_json)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;

                    debug!(local_id, server_id, "Synced; deferred edit re-queued");
                } else {
                    sqlx::query(
                        r#"
                        UPDATE sync_entries SET
                            server_id = ?2,
                            status = 'synced',
                            last_error = NULL,
                            updated_at = ?3
                        WHERE local_id = ?1
                        "#,
                    )
                    .bind(local_id)
                    .bind(server_id)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;

                    debug!(local_id, server_id, "Entry synced");
                }
            }

            // Tombstoned while the upload was in flight: keep the tombstone,
            // record the server id so the delete step can target it
            SyncStatus::DeletedLocally => {
                sqlx::query(
                    "UPDATE sync_entries SET server_id = ?2, updated_at = ?3 WHERE local_id = ?1",
                )
                .bind(local_id)
                .bind(server_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }

            other => {
                return Err(DbError::InvalidState {
                    id: local_id.into(),
                    status: other.as_str().into(),
                    operation: "mark_synced".into(),
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Records a failed upload attempt.
    ///
    /// The entry becomes `failed` and stays eligible for the next pass. A
    /// parked edit is applied, returning the entry to `pending`.
    pub async fn mark_failed(&self, local_id: &str, error: &str) -> DbResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let status = require_status(&mut tx, local_id).await?;
        match status {
            SyncStatus::Syncing => {
                let deferred = fetch_deferred(&mut tx, local_id).await?;
                let (new_status, payload_update) = match deferred {
                    Some(json) => (SyncStatus::Pending, Some(json)),
                    None => (SyncStatus::Failed, None),
                };

                if let Some(deferred_json) = payload_update {
                    sqlx::query(
                        r#"
                        UPDATE sync_entries SET
                            payload = ?2,
                            deferred_payload = NULL,
                            status = ?3,
                            attempts = attempts + 1,
                            last_error = ?4,
                            attempted_at = ?5
                        WHERE local_id = ?1
                        "#,
                    )
                    .bind(local_id)
                    .bind(&deferred_json)
                    .bind(new_status)
                    .bind(error)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                } else {
                    sqlx::query(
                        r#"
                        UPDATE sync_entries SET
                            status = ?2,
                            attempts = attempts + 1,
                            last_error = ?3,
                            attempted_at = ?4
                        WHERE local_id = ?1
                        "#,
                    )
                    .bind(local_id)
                    .bind(new_status)
                    .bind(error)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                }

                debug!(local_id, error, "Upload attempt failed");
            }

            // A failed delete attempt leaves the tombstone for the next pass
            SyncStatus::DeletedLocally => {
                sqlx::query(
                    r#"
                    UPDATE sync_entries SET
                        attempts = attempts + 1,
                        last_error = ?2,
                        attempted_at = ?3
                    WHERE local_id = ?1
                    "#,
                )
                .bind(local_id)
                .bind(error)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }

            other => {
                return Err(DbError::InvalidState {
                    id: local_id.into(),
                    status: other.as_str().into(),
                    operation: "mark_failed".into(),
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Tombstones an entry for server-side deletion. Idempotent.
    ///
    /// An entry that never reached the server has nothing to delete remotely
    /// and is purged immediately. Returns true if a tombstone remains.
    pub async fn mark_deleted_locally(&self, local_id: &str) -> DbResult<bool> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let row: Option<(SyncStatus, Option<String>)> = sqlx::query_as(
            "SELECT status, server_id FROM sync_entries WHERE local_id = ?1",
        )
        .bind(local_id)
        .fetch_optional(&mut *tx)
        .await?;

        let tombstoned = match row {
            None => return Err(DbError::not_found("Entry", local_id)),

            // Already resolved; nothing to do
            Some((SyncStatus::DeletedLocally, _)) | Some((SyncStatus::DeletedOnServer, _)) => true,

            // Never uploaded and not in flight: purge outright
            Some((status, None)) if status != SyncStatus::Syncing => {
                sqlx::query("DELETE FROM sync_entries WHERE local_id = ?1")
                    .bind(local_id)
                    .execute(&mut *tx)
                    .await?;
                false
            }

            Some(_) => {
                sqlx::query(
                    r#"
                    UPDATE sync_entries SET
                        status = 'deleted_locally',
                        deferred_payload = NULL,
                        updated_at = ?2
                    WHERE local_id = ?1
                    "#,
                )
                .bind(local_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                true
            }
        };

        tx.commit().await?;
        debug!(local_id, tombstoned, "Entry deleted locally");
        Ok(tombstoned)
    }

    /// Records that the server reported this entry gone. Idempotent.
    pub async fn mark_deleted_on_server(&self, local_id: &str) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE sync_entries SET
                status = 'deleted_on_server',
                deferred_payload = NULL,
                updated_at = ?2
            WHERE local_id = ?1
            "#,
        )
        .bind(local_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Entry", local_id));
        }
        Ok(())
    }

    /// Permanently removes an entry record.
    ///
    /// Only valid once the deletion is confirmed (`deleted_on_server`) or the
    /// tombstone's remote delete succeeded (`deleted_locally`).
    pub async fn purge(&self, local_id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let status = require_status(&mut tx, local_id).await?;
        if !status.allows_purge() {
            return Err(DbError::InvalidState {
                id: local_id.into(),
                status: status.as_str().into(),
                operation: "purge".into(),
            });
        }

        sqlx::query("DELETE FROM sync_entries WHERE local_id = ?1")
            .bind(local_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(local_id, "Entry purged");
        Ok(())
    }

    /// Returns (pending_uploads, failed_uploads) in one query.
    ///
    /// pending_uploads counts both `pending` and `failed` entries, matching
    /// what the next pass would pick up.
    pub async fn counts(&self) -> DbResult<(i64, i64)> {
        let row: (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status IN ('pending', 'failed')),
                COUNT(*) FILTER (WHERE status = 'failed')
            FROM sync_entries
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Returns entries stranded in `syncing` by a crash to `pending`.
    ///
    /// A process that dies mid-upload leaves its row in `syncing`, a status
    /// no pass selects; without recovery the entry would never sync again.
    /// A parked edit is applied. Runs at startup, before any pass. Returns
    /// the number of rows recovered.
    pub async fn recover_in_flight(&self) -> DbResult<u64> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE sync_entries SET
                payload = COALESCE(deferred_payload, payload),
                deferred_payload = NULL,
                status = 'pending',
                last_error = NULL,
                updated_at = ?1
            WHERE status = 'syncing'
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            debug!(recovered, "Recovered interrupted in-flight entries");
        }
        Ok(recovered)
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

async fn fetch_status(
    tx: &mut Transaction<'_, Sqlite>,
    local_id: &str,
) -> DbResult<Option<SyncStatus>> {
    let status: Option<(SyncStatus,)> =
        sqlx::query_as("SELECT status FROM sync_entries WHERE local_id = ?1")
            .bind(local_id)
            .fetch_optional(&mut **tx)
            .await?;

    Ok(status.map(|(s,)| s))
}

async fn require_status(
    tx: &mut Transaction<'_, Sqlite>,
    local_id: &str,
) -> DbResult<SyncStatus> {
    fetch_status(tx, local_id)
        .await?
        .ok_or_else(|| DbError::not_found("Entry", local_id))
}

async fn fetch_deferred(
    tx: &mut Transaction<'_, Sqlite>,
    local_id: &str,
) -> DbResult<Option<String>> {
    let deferred: Option<(Option<String>,)> =
        sqlx::query_as("SELECT deferred_payload FROM sync_entries WHERE local_id = ?1")
            .bind(local_id)
            .fetch_optional(&mut **tx)
            .await?;

    Ok(deferred.and_then(|(d,)| d))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::NaiveDate;
    use vital_core::SyncEntry;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn metric(value: f64) -> SyncEntry {
        SyncEntry::new_metric(value, 1, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    #[tokio::test]
    async fn test_enqueue_and_get() {
        let db = test_db().await;
        let repo = db.entries();

        let entry = metric(70.5);
        repo.enqueue(&entry).await.unwrap();

        let stored = repo.get(&entry.local_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SyncStatus::Pending);
        assert_eq!(stored.payload, entry.payload);
        assert!(stored.server_id.is_none());
    }

    #[tokio::test]
    async fn test_pending_is_fifo_and_excludes_synced() {
        let db = test_db().await;
        let repo = db.entries();

        let first = metric(70.0);
        let second = metric(71.0);
        let third = metric(72.0);

        repo.enqueue(&first).await.unwrap();
        repo.enqueue(&second).await.unwrap();
        repo.enqueue(&third).await.unwrap();

        // Sync the middle entry
        repo.mark_syncing(&second.local_id).await.unwrap();
        repo.mark_synced(&second.local_id, "srv-2").await.unwrap();

        let pending = repo.pending(10).await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|e| e.local_id.as_str()).collect();
        assert_eq!(ids, vec![first.local_id.as_str(), third.local_id.as_str()]);
    }

    #[tokio::test]
    async fn test_failed_entries_stay_eligible() {
        let db = test_db().await;
        let repo = db.entries();

        let entry = metric(70.0);
        repo.enqueue(&entry).await.unwrap();
        repo.mark_syncing(&entry.local_id).await.unwrap();
        repo.mark_failed(&entry.local_id, "connection refused").await.unwrap();

        let stored = repo.get(&entry.local_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SyncStatus::Failed);
        assert_eq!(stored.attempts, 1);
        assert_eq!(stored.last_error.as_deref(), Some("connection refused"));
        assert!(stored.attempted_at.is_some());

        let pending = repo.pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_edit_after_synced_keeps_server_id() {
        let db = test_db().await;
        let repo = db.entries();

        let mut entry = metric(70.5);
        repo.enqueue(&entry).await.unwrap();
        repo.mark_syncing(&entry.local_id).await.unwrap();
        repo.mark_synced(&entry.local_id, "srv-1").await.unwrap();

        // Local edit: value changes, status must leave 'synced'
        entry.payload = EntryPayload::Metric {
            value: 71.0,
            metric_type_id: 1,
            recorded_on: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            imported: false,
        };
        repo.enqueue(&entry).await.unwrap();

        let stored = repo.get(&entry.local_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SyncStatus::Pending);
        assert_eq!(stored.server_id.as_deref(), Some("srv-1"));
    }

    #[tokio::test]
    async fn test_edit_while_syncing_is_deferred() {
        let db = test_db().await;
        let repo = db.entries();

        let mut entry = metric(70.5);
        repo.enqueue(&entry).await.unwrap();
        repo.mark_syncing(&entry.local_id).await.unwrap();

        // Edit arrives mid-flight
        entry.payload = EntryPayload::Metric {
            value: 99.9,
            metric_type_id: 1,
            recorded_on: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            imported: false,
        };
        repo.enqueue(&entry).await.unwrap();

        // Status untouched while in flight
        let stored = repo.get(&entry.local_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SyncStatus::Syncing);

        // Attempt resolves: deferred edit applies, entry re-queues
        repo.mark_synced(&entry.local_id, "srv-1").await.unwrap();
        let stored = repo.get(&entry.local_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SyncStatus::Pending);
        assert_eq!(stored.server_id.as_deref(), Some("srv-1"));
        match stored.payload {
            EntryPayload::Metric { value, .. } => assert_eq!(value, 99.9),
            _ => panic!("expected metric payload"),
        }
    }

    #[tokio::test]
    async fn test_delete_before_upload_purges_immediately() {
        let db = test_db().await;
        let repo = db.entries();

        let entry = metric(70.0);
        repo.enqueue(&entry).await.unwrap();

        let tombstoned = repo.mark_deleted_locally(&entry.local_id).await.unwrap();
        assert!(!tombstoned);
        assert!(repo.get(&entry.local_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_after_upload_leaves_tombstone() {
        let db = test_db().await;
        let repo = db.entries();

        let entry = metric(70.0);
        repo.enqueue(&entry).await.unwrap();
        repo.mark_syncing(&entry.local_id).await.unwrap();
        repo.mark_synced(&entry.local_id, "srv-1").await.unwrap();

        let tombstoned = repo.mark_deleted_locally(&entry.local_id).await.unwrap();
        assert!(tombstoned);

        let tombstones = repo.tombstones().await.unwrap();
        assert_eq!(tombstones.len(), 1);
        assert_eq!(tombstones[0].server_id.as_deref(), Some("srv-1"));

        // Delete confirmed remotely: purge is now legal
        repo.purge(&entry.local_id).await.unwrap();
        assert!(repo.get(&entry.local_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_rejected_for_live_entries() {
        let db = test_db().await;
        let repo = db.entries();

        let entry = metric(70.0);
        repo.enqueue(&entry).await.unwrap();

        let err = repo.purge(&entry.local_id).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_counts() {
        let db = test_db().await;
        let repo = db.entries();

        let a = metric(1.0);
        let b = metric(2.0);
        let c = metric(3.0);
        repo.enqueue(&a).await.unwrap();
        repo.enqueue(&b).await.unwrap();
        repo.enqueue(&c).await.unwrap();

        repo.mark_syncing(&a.local_id).await.unwrap();
        repo.mark_failed(&a.local_id, "boom").await.unwrap();
        repo.mark_syncing(&b.local_id).await.unwrap();
        repo.mark_synced(&b.local_id, "srv-b").await.unwrap();

        let (pending, failed) = repo.counts().await.unwrap();
        assert_eq!(pending, 2); // a (failed) + c (pending)
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn test_mark_syncing_is_idempotent() {
        let db = test_db().await;
        let repo = db.entries();

        let entry = metric(70.0);
        repo.enqueue(&entry).await.unwrap();
        repo.mark_syncing(&entry.local_id).await.unwrap();
        repo.mark_syncing(&entry.local_id).await.unwrap();

        let stored = repo.get(&entry.local_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SyncStatus::Syncing);
    }

    #[tokio::test]
    async fn test_startup_requeues_entries_interrupted_mid_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vital.db");

        // Simulate a crash: the process picked the entry up and died before
        // the attempt resolved
        let entry = metric(70.0);
        {
            let db = Database::new(DbConfig::new(&path)).await.unwrap();
            let repo = db.entries();
            repo.enqueue(&entry).await.unwrap();
            repo.mark_syncing(&entry.local_id).await.unwrap();
            db.close().await;
        }

        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let repo = db.entries();

        let stored = repo.get(&entry.local_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SyncStatus::Pending);

        // Visible to the next pass and to the counters again
        assert_eq!(repo.pending(10).await.unwrap().len(), 1);
        let (pending, failed) = repo.counts().await.unwrap();
        assert_eq!(pending, 1);
        assert_eq!(failed, 0);
    }

    #[tokio::test]
    async fn test_recover_in_flight_applies_parked_edit() {
        let db = test_db().await;
        let repo = db.entries();

        let mut entry = metric(70.0);
        repo.enqueue(&entry).await.unwrap();
        repo.mark_syncing(&entry.local_id).await.unwrap();

        // Edit arrived while the doomed attempt was in flight
        entry.payload = EntryPayload::Metric {
            value: 99.9,
            metric_type_id: 1,
            recorded_on: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            imported: false,
        };
        repo.enqueue(&entry).await.unwrap();

        let recovered = repo.recover_in_flight().await.unwrap();
        assert_eq!(recovered, 1);

        let stored = repo.get(&entry.local_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SyncStatus::Pending);
        match stored.payload {
            EntryPayload::Metric { value, .. } => assert_eq!(value, 99.9),
            _ => panic!("expected metric payload"),
        }

        // Nothing left in flight: a second recovery is a no-op
        assert_eq!(repo.recover_in_flight().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_synced_requires_in_flight_entry() {
        let db = test_db().await;
        let repo = db.entries();

        let entry = metric(70.0);
        repo.enqueue(&entry).await.unwrap();

        let err = repo.mark_synced(&entry.local_id, "srv-1").await.unwrap_err();
        assert!(matches!(err, DbError::InvalidState { .. }));
    }
}
