//! # Credential Store Repository
//!
//! Persists the authentication session (tokens + device identity) across
//! process restarts.
//!
//! ## Crash Safety
//! The session lives in a single row (id = 1) and every `put` is one
//! SQLite statement: an interrupted write is rolled back by the WAL journal
//! and the previous session survives. No partial token state is ever
//! observable.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use vital_core::{Session, User};

#[derive(Debug, sqlx::FromRow)]
struct CredentialRow {
    user_id: String,
    username: String,
    email: Option<String>,
    access_token: String,
    refresh_token: String,
    device_id: String,
    updated_at: DateTime<Utc>,
}

impl From<CredentialRow> for Session {
    fn from(row: CredentialRow) -> Self {
        Session {
            user: User {
                id: row.user_id,
                username: row.username,
                email: row.email,
            },
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            device_id: row.device_id,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for the single-row `credential` table.
#[derive(Debug, Clone)]
pub struct CredentialRepository {
    pool: SqlitePool,
}

impl CredentialRepository {
    /// Creates a new CredentialRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CredentialRepository { pool }
    }

    /// Reads the stored session, if any.
    pub async fn get(&self) -> DbResult<Option<Session>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT user_id, username, email, access_token, refresh_token,
                   device_id, updated_at
            FROM credential
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Session::from))
    }

    /// Writes the session, replacing any previous one atomically.
    pub async fn put(&self, session: &Session) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO credential (
                id, user_id, username, email, access_token, refresh_token,
                device_id, updated_at
            ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (id) DO UPDATE SET
                user_id = excluded.user_id,
                username = excluded.username,
                email = excluded.email,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                device_id = excluded.device_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&session.user.id)
        .bind(&session.user.username)
        .bind(&session.user.email)
        .bind(&session.access_token)
        .bind(&session.refresh_token)
        .bind(&session.device_id)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(user = %session.user.username, "Session persisted");
        Ok(())
    }

    /// Removes the stored session. Idempotent.
    pub async fn clear(&self) -> DbResult<()> {
        sqlx::query("DELETE FROM credential WHERE id = 1")
            .execute(&self.pool)
            .await?;

        debug!("Session cleared");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn session(access: &str) -> Session {
        Session {
            user: User {
                id: "u1".into(),
                username: "alice".into(),
                email: Some("alice@example.com".into()),
            },
            access_token: access.into(),
            refresh_token: "refresh-1".into(),
            device_id: "device-1".into(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.credentials();

        assert!(repo.get().await.unwrap().is_none());

        let s = session("access-1");
        repo.put(&s).await.unwrap();

        let stored = repo.get().await.unwrap().unwrap();
        assert_eq!(stored.access_token, "access-1");
        assert_eq!(stored.user.username, "alice");
        assert_eq!(stored.device_id, "device-1");
    }

    #[tokio::test]
    async fn test_put_replaces_previous_session() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.credentials();

        repo.put(&session("access-1")).await.unwrap();
        repo.put(&session("access-2")).await.unwrap();

        let stored = repo.get().await.unwrap().unwrap();
        assert_eq!(stored.access_token, "access-2");
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.credentials();

        repo.put(&session("access-1")).await.unwrap();
        repo.clear().await.unwrap();
        repo.clear().await.unwrap();

        assert!(repo.get().await.unwrap().is_none());
    }
}
