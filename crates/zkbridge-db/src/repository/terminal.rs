//! # Terminal Repository
//!
//! CRUD for configured terminals plus the two engine-driven updates:
//! recording a successful connection and linking to a backend machine.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use zkbridge_core::{NewTerminal, Terminal};

const TERMINAL_COLUMNS: &str = "id, name, ip, port, password, serial_number, last_connected, \
     remote_name, remote_id, utc_offset_minutes";

/// Repository for terminal configuration rows.
#[derive(Debug, Clone)]
pub struct TerminalRepository {
    pool: SqlitePool,
}

impl TerminalRepository {
    /// Creates a new TerminalRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TerminalRepository { pool }
    }

    /// Creates a terminal. The name must be unique.
    pub async fn create(&self, new: &NewTerminal) -> DbResult<Terminal> {
        debug!(name = %new.name, ip = %new.ip, "Creating terminal");

        let result = sqlx::query(
            r#"
            INSERT INTO terminals (name, ip, port, password, remote_name)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&new.name)
        .bind(&new.ip)
        .bind(new.port)
        .bind(&new.password)
        .bind(&new.remote_name)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Terminal", id.to_string()))
    }

    /// Updates the editable fields of a terminal.
    pub async fn update(&self, id: i64, new: &NewTerminal) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE terminals
            SET name = ?2, ip = ?3, port = ?4, password = ?5, remote_name = ?6
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(&new.name)
        .bind(&new.ip)
        .bind(new.port)
        .bind(&new.password)
        .bind(&new.remote_name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Terminal", id.to_string()));
        }
        Ok(())
    }

    /// Deletes a terminal. Staged users, attendance and per-terminal logs
    /// go with it (ON DELETE CASCADE).
    pub async fn delete(&self, id: i64) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM terminals WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Terminal", id.to_string()));
        }
        Ok(())
    }

    /// Gets a terminal by id.
    pub async fn get(&self, id: i64) -> DbResult<Option<Terminal>> {
        let terminal = sqlx::query_as::<_, Terminal>(&format!(
            "SELECT {TERMINAL_COLUMNS} FROM terminals WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(terminal)
    }

    /// Gets a terminal by its unique name.
    pub async fn get_by_name(&self, name: &str) -> DbResult<Option<Terminal>> {
        let terminal = sqlx::query_as::<_, Terminal>(&format!(
            "SELECT {TERMINAL_COLUMNS} FROM terminals WHERE name = ?1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(terminal)
    }

    /// Lists all configured terminals in creation order.
    pub async fn list(&self) -> DbResult<Vec<Terminal>> {
        let terminals = sqlx::query_as::<_, Terminal>(&format!(
            "SELECT {TERMINAL_COLUMNS} FROM terminals ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(terminals)
    }

    /// Records a successful connection: serial number and timestamp.
    pub async fn record_connection(
        &self,
        id: i64,
        serial_number: &str,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE terminals SET serial_number = ?2, last_connected = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(serial_number)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stores the backend machine link for a terminal.
    pub async fn link_remote(
        &self,
        id: i64,
        remote_id: i64,
        utc_offset_minutes: Option<i64>,
    ) -> DbResult<()> {
        debug!(terminal_id = id, remote_id, "Linking terminal to backend machine");

        sqlx::query(
            r#"
            UPDATE terminals SET remote_id = ?2, utc_offset_minutes = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(remote_id)
        .bind(utc_offset_minutes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
