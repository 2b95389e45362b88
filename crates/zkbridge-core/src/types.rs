//! # Domain Types
//!
//! Core domain types used throughout ZKBridge.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Terminal     │   │   DeviceUser    │   │AttendanceRecord │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (local)     │   │  terminal_id    │   │  terminal_id    │       │
//! │  │  name (key)     │   │  user_id        │   │  user_id        │       │
//! │  │  ip / port      │   │  device_uid     │   │  timestamp      │       │
//! │  │  remote_id?     │   │  synced_at?     │   │  synced_at?     │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │OperationLogEntry│   │  BackendConfig  │                             │
//! │  │  ─────────────  │   │  ─────────────  │                             │
//! │  │  operation kind │   │  url / db       │                             │
//! │  │  message        │   │  username       │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two Clocks
//! Punch timestamps (`AttendanceRecord::timestamp`) carry the naive local
//! time reported by the device clock. Everything the bridge itself stamps
//! (`synced_at`, `last_connected`, log timestamps) is UTC. Conversion to
//! UTC happens once, at upload, via the terminal's configured offset.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Terminal
// =============================================================================

/// A configured attendance terminal on the local network.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Terminal {
    /// Local row id.
    pub id: i64,

    /// Local identity key; unique among configured terminals.
    pub name: String,

    /// Device network address.
    pub ip: String,

    /// Device port (ZK devices default to 4370).
    pub port: u16,

    /// Communication credential, if the device requires one.
    pub password: Option<String>,

    /// Serial number read during the last successful connection test.
    pub serial_number: Option<String>,

    /// When the device was last reached.
    pub last_connected: Option<DateTime<Utc>>,

    /// Name of the backend machine record this terminal maps to.
    pub remote_name: Option<String>,

    /// Backend machine record id, set by linking.
    pub remote_id: Option<i64>,

    /// Offset of the device clock from UTC, in minutes.
    /// Used to convert punch times at upload; naive times are sent when
    /// unset.
    pub utc_offset_minutes: Option<i64>,
}

impl Terminal {
    /// Whether this terminal is linked to its backend machine record.
    ///
    /// Unlinked terminals are fetched normally but their records are
    /// skipped (and logged) during upload.
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.remote_id.is_some()
    }

    /// Converts a device-local punch time to UTC using the configured
    /// clock offset.
    ///
    /// Returns the naive time reinterpreted as UTC when no offset is
    /// configured, which matches sending the raw device time upstream.
    pub fn punch_to_utc(&self, ts: NaiveDateTime) -> CoreResult<DateTime<Utc>> {
        match self.utc_offset_minutes {
            None => Ok(DateTime::from_naive_utc_and_offset(ts, Utc)),
            Some(minutes) => {
                let offset = FixedOffset::east_opt((minutes * 60) as i32).ok_or_else(|| {
                    CoreError::InvalidTimestamp(format!(
                        "terminal '{}' has out-of-range utc offset {minutes} minutes",
                        self.name
                    ))
                })?;
                let local = ts
                    .and_local_timezone(offset)
                    .single()
                    .ok_or_else(|| CoreError::InvalidTimestamp(ts.to_string()))?;
                Ok(local.with_timezone(&Utc))
            }
        }
    }
}

/// Fields accepted when creating or editing a terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTerminal {
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub password: Option<String>,
    pub remote_name: Option<String>,
}

// =============================================================================
// Device User
// =============================================================================

/// A user profile staged from a terminal.
///
/// Composite key is (terminal_id, user_id): device-local user ids are
/// only unique within one terminal. The roster is replaced wholesale on
/// each fetch; `synced_at` is written only by the upload coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DeviceUser {
    /// Local row id (insertion order, used for stable batching).
    pub id: i64,

    /// Terminal this roster entry belongs to.
    pub terminal_id: i64,

    /// Internal uid assigned by the device firmware.
    pub device_uid: i64,

    /// Device-local user id (badge/PIN identifier).
    pub user_id: String,

    /// Display name as stored on the device.
    pub name: String,

    /// When this user was created in the backend; None = pending upload.
    pub synced_at: Option<DateTime<Utc>>,
}

/// A roster entry as read off the device, before staging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedUser {
    pub device_uid: i64,
    pub user_id: String,
    pub name: String,
}

// =============================================================================
// Attendance
// =============================================================================

/// A staged punch-clock record.
///
/// Key is (terminal_id, user_id, timestamp); a device never reports two
/// punches for the same user at the same instant through this pipeline.
/// Rows are append-only and only retention cleanup deletes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AttendanceRecord {
    /// Local row id (insertion order, used for stable batching).
    pub id: i64,

    /// Terminal that reported the punch.
    pub terminal_id: i64,

    /// Device-local user id.
    pub user_id: String,

    /// Stable external id sent to the backend alongside the punch.
    pub att_id: String,

    /// Punch time as reported by the device clock (naive local time).
    pub timestamp: NaiveDateTime,

    /// When this punch was created in the backend; None = pending upload.
    pub synced_at: Option<DateTime<Utc>>,
}

/// A punch as read off the device, before staging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedPunch {
    pub user_id: String,
    pub timestamp: NaiveDateTime,
}

/// Derives the stable external id for a punch.
///
/// Format: `{terminal_id}-{user_id}-{yyyymmddhhmmss}`. Deterministic so a
/// punch recreated by a crashed upload cycle carries the same id and the
/// backend can deduplicate.
pub fn derive_att_id(terminal_id: i64, user_id: &str, ts: NaiveDateTime) -> String {
    format!("{terminal_id}-{user_id}-{}", ts.format("%Y%m%d%H%M%S"))
}

// =============================================================================
// Operation Log
// =============================================================================

/// Category of an operation log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Pulling users/punches from a terminal.
    Fetch,
    /// Uploading staged records to the backend.
    Upload,
    /// Scheduler lifecycle and ticks.
    Scheduler,
    /// Retention cleanup.
    Cleanup,
    /// Manual connection test against a terminal.
    TestConnection,
    /// Linking a terminal to its backend machine record.
    Link,
    /// Any failure; the message names the failing operation.
    Error,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationKind::Fetch => "fetch",
            OperationKind::Upload => "upload",
            OperationKind::Scheduler => "scheduler",
            OperationKind::Cleanup => "cleanup",
            OperationKind::TestConnection => "test_connection",
            OperationKind::Link => "link",
            OperationKind::Error => "error",
        };
        f.write_str(s)
    }
}

/// An append-only, informational log entry.
///
/// The engine writes these for every success and failure; it never reads
/// them back. The presentation layer renders them as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OperationLogEntry {
    pub id: i64,
    pub terminal_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub operation: OperationKind,
    pub message: String,
}

// =============================================================================
// Backend Configuration
// =============================================================================

/// Connection details for the remote HR backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend (e.g. `https://hr.example.com`).
    pub url: String,
    /// Backend database name.
    pub db: String,
    /// Login username.
    pub username: String,
    /// Login credential.
    pub password: String,
}

impl BackendConfig {
    /// Whether all four connection fields are present.
    pub fn is_complete(&self) -> bool {
        !self.url.trim().is_empty()
            && !self.db.trim().is_empty()
            && !self.username.trim().is_empty()
            && !self.password.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
