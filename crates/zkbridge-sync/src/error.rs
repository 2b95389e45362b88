//! # Sync Error Types
//!
//! Error classification for the engine. The categories drive control
//! flow, not just reporting:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Handling Strategy                              │
//! │                                                                         │
//! │  Connection / DeviceProtocol → log, skip that terminal, continue       │
//! │  Auth                        → log, abort the upload phase             │
//! │  Remote                      → log, skip that record/batch, continue   │
//! │  Storage                     → fatal for the cycle (store is broken)   │
//! │  InvalidConfig               → reject before any network traffic       │
//! │  Busy                        → manual trigger rejected, no queueing    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use zkbridge_core::CoreError;
use zkbridge_db::DbError;

/// Errors produced by the fetch, upload and scheduler paths.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The terminal could not be reached (network down, wrong address,
    /// connect timeout).
    #[error("Terminal '{terminal}' unreachable: {message}")]
    Connection { terminal: String, message: String },

    /// The terminal was reached but the device conversation failed
    /// (bad password, malformed reply, device busy).
    #[error("Terminal '{terminal}' protocol error: {message}")]
    DeviceProtocol { terminal: String, message: String },

    /// The backend rejected the credentials or authentication could not
    /// complete. Aborts the upload phase; fetched data stays staged.
    #[error("Backend authentication failed: {0}")]
    Auth(String),

    /// A backend create call failed after successful authentication.
    #[error("Backend request failed: {0}")]
    Remote(String),

    /// The staging store failed. Fatal for the running cycle.
    #[error("Staging store error: {0}")]
    Storage(#[from] DbError),

    /// The operation was attempted with incomplete or invalid
    /// configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A sync cycle already holds the cycle lock; manual triggers are
    /// rejected rather than queued.
    #[error("A sync cycle is already running")]
    Busy,
}

impl SyncError {
    /// Shorthand for a connection failure against a named terminal.
    pub fn connection(terminal: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Connection {
            terminal: terminal.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a device protocol failure against a named terminal.
    pub fn protocol(terminal: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::DeviceProtocol {
            terminal: terminal.into(),
            message: message.into(),
        }
    }

    /// Whether this error must abort the whole cycle. Only storage
    /// failures qualify; everything else is scoped to one terminal,
    /// record or batch.
    pub fn is_fatal_for_cycle(&self) -> bool {
        matches!(self, SyncError::Storage(_))
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        SyncError::InvalidConfig(err.to_string())
    }
}

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_storage_is_fatal() {
        assert!(SyncError::Storage(DbError::Internal("disk full".into())).is_fatal_for_cycle());
        assert!(!SyncError::connection("lobby", "timed out").is_fatal_for_cycle());
        assert!(!SyncError::Auth("bad credentials".into()).is_fatal_for_cycle());
        assert!(!SyncError::Busy.is_fatal_for_cycle());
    }

    #[test]
    fn test_display_names_terminal() {
        let err = SyncError::protocol("lobby", "invalid comm key");
        assert!(err.to_string().contains("lobby"));
        assert!(err.to_string().contains("invalid comm key"));
    }
}
