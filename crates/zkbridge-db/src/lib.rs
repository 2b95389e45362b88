//! # zkbridge-db: Staging Store for ZKBridge
//!
//! Durable local persistence for everything the bridge stages between a
//! terminal fetch and a backend upload.
//!
//! ## Write Policies
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Conflict Policies                                  │
//! │                                                                         │
//! │  device_users   REPLACE WHOLESALE                                      │
//! │                 one transaction per fetch; upsert preserves            │
//! │                 synced_at, absentees are deleted                       │
//! │                                                                         │
//! │  attendance     INSERT IF ABSENT                                       │
//! │                 append-only; duplicates silently dropped so a         │
//! │                 terminal re-reporting an overlapping range is safe    │
//! │                                                                         │
//! │  synced_at      SET ONCE                                               │
//! │                 written only by the upload coordinator, guarded by    │
//! │                 `AND synced_at IS NULL`                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two distinct write operations with different conflict policies keep
//! each invariant enforceable in one place; there is deliberately no
//! generic "save" path.

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::attendance::AttendanceRepository;
pub use repository::device_user::DeviceUserRepository;
pub use repository::operation_log::OperationLogRepository;
pub use repository::settings::SettingsRepository;
pub use repository::terminal::TerminalRepository;
