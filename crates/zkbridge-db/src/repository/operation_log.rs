//! # Operation Log Repository
//!
//! Append-only log of everything the engine does. Informational only:
//! the engine writes entries, the presentation layer reads them, and
//! retention cleanup prunes them by age. The engine itself never reads
//! them back.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::DbResult;
use zkbridge_core::{OperationKind, OperationLogEntry};

const LOG_COLUMNS: &str = "id, terminal_id, timestamp, operation, message";

/// Repository for operation log entries.
#[derive(Debug, Clone)]
pub struct OperationLogRepository {
    pool: SqlitePool,
}

impl OperationLogRepository {
    /// Creates a new OperationLogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OperationLogRepository { pool }
    }

    /// Appends one entry, stamped with the current UTC time.
    pub async fn append(
        &self,
        terminal_id: Option<i64>,
        operation: OperationKind,
        message: &str,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO operation_logs (terminal_id, timestamp, operation, message)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(terminal_id)
        .bind(Utc::now())
        .bind(operation)
        .bind(message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns the most recent entries, newest first.
    pub async fn recent(&self, limit: u32) -> DbResult<Vec<OperationLogEntry>> {
        let entries = sqlx::query_as::<_, OperationLogEntry>(&format!(
            r#"
            SELECT {LOG_COLUMNS} FROM operation_logs
            ORDER BY id DESC
            LIMIT ?1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Deletes entries strictly older than the cutoff. Returns the number
    /// deleted.
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM operation_logs WHERE timestamp < ?1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Deletes all entries (bulk clear from the management surface).
    pub async fn clear_all(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM operation_logs")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
