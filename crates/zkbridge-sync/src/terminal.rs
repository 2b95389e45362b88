//! # Terminal Client Boundary
//!
//! The seam between the engine and the physical attendance terminals.
//!
//! The engine only ever talks to a device through [`TerminalClient`] and
//! [`TerminalSession`]. A session maps onto one connect/disconnect pair
//! on the device; ZK-protocol firmware serves a single control session
//! at a time, so the fetch coordinator opens sessions strictly
//! sequentially and always disconnects, even on error.
//!
//! ```text
//! ┌──────────────┐   connect    ┌──────────────────┐
//! │ TerminalClient│ ───────────► │ TerminalSession  │
//! └──────────────┘              │                  │
//!                               │  serial_number() │
//!                               │  users()         │
//!                               │  attendance()    │
//!                               │  disconnect()    │
//!                               └──────────────────┘
//! ```

use async_trait::async_trait;

use crate::error::SyncResult;
use zkbridge_core::{FetchedPunch, FetchedUser, Terminal};

/// Network address and credential for one device connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalEndpoint {
    /// Terminal name, carried for error messages.
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub password: Option<String>,
}

impl From<&Terminal> for TerminalEndpoint {
    fn from(t: &Terminal) -> Self {
        TerminalEndpoint {
            name: t.name.clone(),
            ip: t.ip.clone(),
            port: t.port,
            password: t.password.clone(),
        }
    }
}

/// Opens sessions against attendance terminals.
///
/// Implementations wrap the actual device protocol; the engine never
/// sees wire details.
#[async_trait]
pub trait TerminalClient: Send + Sync {
    /// Connects to the device and establishes a control session.
    async fn connect(&self, endpoint: &TerminalEndpoint) -> SyncResult<Box<dyn TerminalSession>>;
}

/// One live device conversation.
///
/// Methods take `&mut self`: the underlying protocol is a half-duplex
/// command/reply exchange over a single socket.
#[async_trait]
pub trait TerminalSession: Send {
    /// Reads the device serial number.
    async fn serial_number(&mut self) -> SyncResult<String>;

    /// Reads the full user roster stored on the device.
    async fn users(&mut self) -> SyncResult<Vec<FetchedUser>>;

    /// Reads all attendance records stored on the device.
    ///
    /// ZK-class devices have no server-side time filter; the caller
    /// filters by watermark after the full read.
    async fn attendance(&mut self) -> SyncResult<Vec<FetchedPunch>>;

    /// Releases the device. Consumes the session; a device left holding
    /// a stale control session refuses the next connect.
    async fn disconnect(self: Box<Self>) -> SyncResult<()>;
}
