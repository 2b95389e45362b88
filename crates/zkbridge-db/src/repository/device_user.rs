//! # Device User Repository
//!
//! The user roster staged per terminal.
//!
//! ## Replace-Wholesale Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 replace_roster (single transaction)                     │
//! │                                                                         │
//! │  1. For each fetched user:                                             │
//! │     INSERT .. ON CONFLICT (terminal_id, user_id)                       │
//! │     DO UPDATE SET device_uid, name   ← synced_at untouched             │
//! │                                                                         │
//! │  2. DELETE roster rows for users no longer on the device               │
//! │                                                                         │
//! │  COMMIT ← readers never observe a partial roster                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The device is the source of truth for its roster; the sync timestamp
//! is the one piece of local state the fetch must never clobber.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use zkbridge_core::{DeviceUser, FetchedUser};

const USER_COLUMNS: &str = "id, terminal_id, device_uid, user_id, name, synced_at";

/// Repository for staged device users.
#[derive(Debug, Clone)]
pub struct DeviceUserRepository {
    pool: SqlitePool,
}

impl DeviceUserRepository {
    /// Creates a new DeviceUserRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DeviceUserRepository { pool }
    }

    /// Replaces the full roster for a terminal atomically.
    ///
    /// Fetched users are upserted (preserving `synced_at` for users that
    /// were already staged); users absent from the device are removed.
    /// An empty roster clears the terminal's staged users.
    pub async fn replace_roster(&self, terminal_id: i64, users: &[FetchedUser]) -> DbResult<()> {
        debug!(terminal_id, count = users.len(), "Replacing user roster");

        let mut tx = self.pool.begin().await?;

        for user in users {
            sqlx::query(
                r#"
                INSERT INTO device_users (terminal_id, device_uid, user_id, name)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT (terminal_id, user_id)
                DO UPDATE SET device_uid = excluded.device_uid, name = excluded.name
                "#,
            )
            .bind(terminal_id)
            .bind(user.device_uid)
            .bind(&user.user_id)
            .bind(&user.name)
            .execute(&mut *tx)
            .await?;
        }

        let present: Vec<&str> = users.iter().map(|u| u.user_id.as_str()).collect();
        let present_json = serde_json::to_string(&present)
            .map_err(|e| crate::DbError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            DELETE FROM device_users
            WHERE terminal_id = ?1
              AND user_id NOT IN (SELECT value FROM json_each(?2))
            "#,
        )
        .bind(terminal_id)
        .bind(present_json)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Returns staged users with no sync timestamp, in insertion order.
    pub async fn unsynced(&self, limit: u32) -> DbResult<Vec<DeviceUser>> {
        let users = sqlx::query_as::<_, DeviceUser>(&format!(
            r#"
            SELECT {USER_COLUMNS} FROM device_users
            WHERE synced_at IS NULL
            ORDER BY id ASC
            LIMIT ?1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    /// Sets the sync timestamp for one user.
    ///
    /// Guarded by `synced_at IS NULL`: a record is marked at most once,
    /// re-marking after a crash is a no-op. Returns whether the mark was
    /// applied.
    pub async fn mark_synced(&self, id: i64, at: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE device_users SET synced_at = ?2
            WHERE id = ?1 AND synced_at IS NULL
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Lists the staged roster for a terminal.
    pub async fn list_for_terminal(&self, terminal_id: i64) -> DbResult<Vec<DeviceUser>> {
        let users = sqlx::query_as::<_, DeviceUser>(&format!(
            r#"
            SELECT {USER_COLUMNS} FROM device_users
            WHERE terminal_id = ?1
            ORDER BY id ASC
            "#
        ))
        .bind(terminal_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    /// Counts staged users for a terminal.
    pub async fn count_for_terminal(&self, terminal_id: i64) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM device_users WHERE terminal_id = ?1")
                .bind(terminal_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;
    use zkbridge_core::{FetchedUser, NewTerminal};

    async fn db_with_terminal() -> (Database, i64) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let t = db
            .terminals()
            .create(&NewTerminal {
                name: "lobby".into(),
                ip: "10.0.0.2".into(),
                port: 4370,
                password: None,
                remote_name: None,
            })
            .await
            .unwrap();
        (db, t.id)
    }

    fn user(uid: i64, user_id: &str, name: &str) -> FetchedUser {
        FetchedUser {
            device_uid: uid,
            user_id: user_id.into(),
            name: name.into(),
        }
    }

    #[tokio::test]
    async fn test_replace_roster_is_idempotent() {
        let (db, tid) = db_with_terminal().await;
        let roster = vec![user(1, "100", "Ada"), user(2, "101", "Grace")];

        db.device_users().replace_roster(tid, &roster).await.unwrap();
        db.device_users().replace_roster(tid, &roster).await.unwrap();

        assert_eq!(db.device_users().count_for_terminal(tid).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_replace_roster_preserves_synced_at() {
        let (db, tid) = db_with_terminal().await;
        db.device_users()
            .replace_roster(tid, &[user(1, "100", "Ada")])
            .await
            .unwrap();

        let staged = &db.device_users().unsynced(10).await.unwrap()[0];
        assert!(db.device_users().mark_synced(staged.id, Utc::now()).await.unwrap());

        // Re-fetch with a renamed user: name updates, synced_at survives.
        db.device_users()
            .replace_roster(tid, &[user(1, "100", "Ada L.")])
            .await
            .unwrap();

        let roster = db.device_users().list_for_terminal(tid).await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].name, "Ada L.");
        assert!(roster[0].synced_at.is_some());
        assert!(db.device_users().unsynced(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_roster_drops_absentees() {
        let (db, tid) = db_with_terminal().await;
        db.device_users()
            .replace_roster(tid, &[user(1, "100", "Ada"), user(2, "101", "Grace")])
            .await
            .unwrap();

        db.device_users()
            .replace_roster(tid, &[user(2, "101", "Grace")])
            .await
            .unwrap();

        let roster = db.device_users().list_for_terminal(tid).await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].user_id, "101");
    }

    #[tokio::test]
    async fn test_mark_synced_applies_at_most_once() {
        let (db, tid) = db_with_terminal().await;
        db.device_users()
            .replace_roster(tid, &[user(1, "100", "Ada")])
            .await
            .unwrap();

        let id = db.device_users().unsynced(10).await.unwrap()[0].id;
        assert!(db.device_users().mark_synced(id, Utc::now()).await.unwrap());
        assert!(!db.device_users().mark_synced(id, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_unsynced_in_insertion_order() {
        let (db, tid) = db_with_terminal().await;
        db.device_users()
            .replace_roster(
                tid,
                &[user(3, "300", "C"), user(1, "100", "A"), user(2, "200", "B")],
            )
            .await
            .unwrap();

        let ids: Vec<String> = db
            .device_users()
            .unsynced(10)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.user_id)
            .collect();
        assert_eq!(ids, vec!["300", "100", "200"]);
    }
}
