//! # ZKBridge Sync Engine
//!
//! Fetch-and-sync between attendance terminals and the HR backend.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Fetch-and-Sync Engine                            │
//! │                                                                         │
//! │  ┌──────────┐   fetch    ┌─────────────────┐   upload   ┌───────────┐  │
//! │  │ Terminals│ ─────────► │  Staging Store  │ ─────────► │ HR Backend│  │
//! │  │ (ZK-type │  roster +  │  (zkbridge-db)  │  batched,  │ (JSON-RPC)│  │
//! │  │  devices)│  punches   │  synced_at=NULL │  mark-after│           │  │
//! │  └──────────┘            │  = pending      │  -create   └───────────┘  │
//! │                          └─────────────────┘                           │
//! │                                  ▲                                      │
//! │                                  │ every cycle                          │
//! │                          ┌───────┴────────┐                             │
//! │                          │   Scheduler    │  timer ticks + manual       │
//! │                          │  (cycle lock)  │  triggers, retention        │
//! │                          └────────────────┘  cleanup                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The store sits between the two networks so neither side has to be up
//! for the other to make progress: fetch succeeds with the backend down,
//! upload succeeds with every device off. Sync state (`synced_at`) and
//! key-based dedup make every phase safe to repeat.

pub mod error;
pub mod fetch;
pub mod remote;
pub mod scheduler;
pub mod terminal;
pub mod upload;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export commonly used types
pub use error::{SyncError, SyncResult};
pub use fetch::{FetchCoordinator, FetchSummary};
pub use remote::{
    AttendancePayload, AuthSession, OdooRpcClient, RemoteClient, RemoteMachine, UserPayload,
};
pub use scheduler::{CycleSummary, Scheduler, SchedulerState, SchedulerStatus};
pub use terminal::{TerminalClient, TerminalEndpoint, TerminalSession};
pub use upload::{UploadCoordinator, UploadSummary};
