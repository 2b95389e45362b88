//! # Repository Pattern
//!
//! One repository per table, each a thin handle over the shared pool.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database ──► terminals()       ──► TerminalRepository                  │
//! │           ──► device_users()    ──► DeviceUserRepository                │
//! │           ──► attendance()      ──► AttendanceRepository                │
//! │           ──► operation_logs()  ──► OperationLogRepository              │
//! │           ──► settings()        ──► SettingsRepository                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod attendance;
pub mod device_user;
pub mod operation_log;
pub mod settings;
pub mod terminal;
