//! # Error Types
//!
//! Domain-specific error types for zkbridge-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  zkbridge-core errors (this file)                                      │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Settings/input validation failures             │
//! │                                                                         │
//! │  zkbridge-db errors (separate crate)                                   │
//! │  └── DbError          - Staging store failures                         │
//! │                                                                         │
//! │  zkbridge-sync errors (separate crate)                                 │
//! │  └── SyncError        - Terminal/backend/cycle failures                │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → operation log         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (terminal name, field, ...)
//! 3. Errors are enum variants, never String

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Terminal cannot be found in the local configuration.
    #[error("Terminal not found: {0}")]
    TerminalNotFound(String),

    /// A terminal has no remote machine link but one is required.
    ///
    /// ## When This Occurs
    /// - Uploading records for a terminal that was never linked to its
    ///   backend machine record
    #[error("Terminal '{terminal}' is not linked to a remote machine")]
    TerminalNotLinked { terminal: String },

    /// A punch timestamp could not be interpreted.
    #[error("Invalid punch timestamp: {0}")]
    InvalidTimestamp(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Settings arrive from an external configuration surface; these errors
/// keep bad values out of the engine before a cycle starts.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value is not in the allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Invalid format (e.g., unparseable URL or port).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
