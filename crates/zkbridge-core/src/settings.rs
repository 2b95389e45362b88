//! # Sync Settings
//!
//! Engine configuration knobs and their allowed value sets.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Settings Lifecycle                                 │
//! │                                                                         │
//! │  Configuration surface writes key/value rows                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SettingsRepository::load() → SyncSettings (defaults fill gaps)        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Scheduler re-reads at the START of every cycle                        │
//! │  (a settings change takes effect on the following cycle,               │
//! │   no restart required)                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The allowed sets mirror what the configuration surface offers; values
//! outside them are rejected before they can reach a cycle.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Allowed lookback windows (days) for a terminal's first-ever fetch.
pub const ALLOWED_LOOKBACK_DAYS: &[u32] = &[1, 31, 60];

/// Allowed attendance upload batch sizes.
pub const ALLOWED_BATCH_SIZES: &[u32] = &[1, 50, 100, 500, 1000];

/// Allowed operation log retention horizons (days).
pub const ALLOWED_LOG_RETENTION_DAYS: &[u32] = &[5, 30, 60, 90];

/// Allowed attendance retention horizons (days).
pub const ALLOWED_ATTENDANCE_RETENTION_DAYS: &[u32] = &[30, 60, 90, 180, 360];

/// Engine configuration, read-only to the engine within one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// How far back the first fetch of a terminal reaches.
    pub lookback_days: u32,

    /// Attendance records per remote call during upload.
    pub batch_size: u32,

    /// Operation log entries older than this are pruned each cycle.
    pub log_retention_days: u32,

    /// Synced attendance older than this is pruned each cycle.
    /// Unsynced records survive regardless of age.
    pub attendance_retention_days: u32,

    /// Minutes between scheduled cycles.
    pub interval_minutes: u32,

    /// Whether the upload phase runs as part of a scheduled cycle.
    pub auto_sync: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            lookback_days: 31,
            batch_size: 1000,
            log_retention_days: 30,
            attendance_retention_days: 180,
            interval_minutes: 10,
            auto_sync: true,
        }
    }
}

impl SyncSettings {
    /// Validates every field against its allowed set.
    ///
    /// Returns the first violation found; callers surface it to the
    /// configuration surface, the engine itself only ever sees validated
    /// settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_allowed("lookback_days", self.lookback_days, ALLOWED_LOOKBACK_DAYS)?;
        check_allowed("batch_size", self.batch_size, ALLOWED_BATCH_SIZES)?;
        check_allowed(
            "log_retention_days",
            self.log_retention_days,
            ALLOWED_LOG_RETENTION_DAYS,
        )?;
        check_allowed(
            "attendance_retention_days",
            self.attendance_retention_days,
            ALLOWED_ATTENDANCE_RETENTION_DAYS,
        )?;

        if self.interval_minutes == 0 {
            return Err(ValidationError::OutOfRange {
                field: "interval_minutes".to_string(),
                min: 1,
                max: i64::from(u32::MAX),
            });
        }

        Ok(())
    }
}

fn check_allowed(field: &str, value: u32, allowed: &[u32]) -> Result<(), ValidationError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::NotAllowed {
            field: field.to_string(),
            allowed: allowed.iter().map(u32::to_string).collect(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
