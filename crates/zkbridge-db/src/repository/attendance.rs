//! # Attendance Repository
//!
//! Append-only staging for punch-clock records.
//!
//! ## Insert-If-Absent Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │               insert_if_absent (single transaction)                     │
//! │                                                                         │
//! │  For each punch:                                                       │
//! │    INSERT OR IGNORE INTO attendance (...)                              │
//! │         │                                                               │
//! │         ├── key (terminal, user, timestamp) new → inserted             │
//! │         └── key already staged              → silently dropped         │
//! │                                                                         │
//! │  COMMIT ← a re-reported overlapping range changes nothing              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Retention cleanup deletes only rows that are BOTH strictly older than
//! the horizon AND already synced. An old unsynced punch survives until
//! an upload cycle marks it; losing it would silently drop attendance.

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use zkbridge_core::{derive_att_id, AttendanceRecord, FetchedPunch};

const ATTENDANCE_COLUMNS: &str = "id, terminal_id, user_id, att_id, timestamp, synced_at";

/// Repository for staged attendance records.
#[derive(Debug, Clone)]
pub struct AttendanceRepository {
    pool: SqlitePool,
}

impl AttendanceRepository {
    /// Creates a new AttendanceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AttendanceRepository { pool }
    }

    /// The maximum punch timestamp stored for a terminal.
    ///
    /// This is the fetch watermark: the next fetch requests only records
    /// after it. None for a terminal that has never staged a punch.
    pub async fn latest_timestamp(&self, terminal_id: i64) -> DbResult<Option<NaiveDateTime>> {
        let latest: Option<NaiveDateTime> =
            sqlx::query_scalar("SELECT MAX(timestamp) FROM attendance WHERE terminal_id = ?1")
                .bind(terminal_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(latest)
    }

    /// Inserts punches whose key is not already staged; duplicates are
    /// silently dropped. Runs in a single transaction and returns the
    /// number of rows actually inserted.
    pub async fn insert_if_absent(
        &self,
        terminal_id: i64,
        punches: &[FetchedPunch],
    ) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for punch in punches {
            let att_id = derive_att_id(terminal_id, &punch.user_id, punch.timestamp);
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO attendance (terminal_id, user_id, att_id, timestamp)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(terminal_id)
            .bind(&punch.user_id)
            .bind(att_id)
            .bind(punch.timestamp)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;

        debug!(terminal_id, fetched = punches.len(), inserted, "Staged attendance");
        Ok(inserted)
    }

    /// Returns staged punches with no sync timestamp, in insertion order.
    pub async fn unsynced(&self, limit: u32) -> DbResult<Vec<AttendanceRecord>> {
        let records = sqlx::query_as::<_, AttendanceRecord>(&format!(
            r#"
            SELECT {ATTENDANCE_COLUMNS} FROM attendance
            WHERE synced_at IS NULL
            ORDER BY id ASC
            LIMIT ?1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Sets the sync timestamp for a batch of records in one transaction.
    ///
    /// Guarded by `synced_at IS NULL` so a record is marked at most once.
    /// Returns the number of rows newly marked.
    pub async fn mark_synced(&self, ids: &[i64], at: DateTime<Utc>) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let ids_json =
            serde_json::to_string(ids).map_err(|e| DbError::Internal(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE attendance SET synced_at = ?1
            WHERE id IN (SELECT value FROM json_each(?2))
              AND synced_at IS NULL
            "#,
        )
        .bind(at)
        .bind(ids_json)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Deletes synced records strictly older than the cutoff.
    ///
    /// Unsynced records survive regardless of age; that is a correctness
    /// invariant, not an optimization.
    pub async fn purge_old_synced(&self, cutoff: NaiveDateTime) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM attendance
            WHERE timestamp < ?1 AND synced_at IS NOT NULL
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Counts punches still pending upload.
    pub async fn count_unsynced(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM attendance WHERE synced_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Counts staged punches for a terminal.
    pub async fn count_for_terminal(&self, terminal_id: i64) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM attendance WHERE terminal_id = ?1")
                .bind(terminal_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
