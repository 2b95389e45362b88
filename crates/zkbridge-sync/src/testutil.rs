//! Shared test doubles for the terminal and backend boundaries.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{SyncError, SyncResult};
use crate::remote::{AttendancePayload, AuthSession, RemoteClient, RemoteMachine, UserPayload};
use crate::terminal::{TerminalClient, TerminalEndpoint, TerminalSession};
use zkbridge_core::{BackendConfig, FetchedPunch, FetchedUser};

// =============================================================================
// Terminal Mock
// =============================================================================

/// A scripted terminal: serves fixed users and punches, optionally
/// failing or delaying the connect. State lives behind shared handles so
/// sessions observe later test mutations and counters survive sessions.
pub struct MockTerminal {
    pub serial: String,
    pub users: Arc<Mutex<Vec<FetchedUser>>>,
    pub punches: Arc<Mutex<Vec<FetchedPunch>>>,
    pub fail_connect: bool,
    pub connect_delay: Option<Duration>,
    pub connects: Arc<AtomicUsize>,
    pub disconnects: Arc<AtomicUsize>,
}

impl MockTerminal {
    pub fn new(serial: &str) -> Arc<Self> {
        Self::with_data(serial, Vec::new(), Vec::new())
    }

    pub fn with_data(
        serial: &str,
        users: Vec<FetchedUser>,
        punches: Vec<FetchedPunch>,
    ) -> Arc<Self> {
        Arc::new(MockTerminal {
            serial: serial.to_string(),
            users: Arc::new(Mutex::new(users)),
            punches: Arc::new(Mutex::new(punches)),
            fail_connect: false,
            connect_delay: None,
            connects: Arc::new(AtomicUsize::new(0)),
            disconnects: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn unreachable(serial: &str) -> Arc<Self> {
        Arc::new(MockTerminal {
            serial: serial.to_string(),
            users: Arc::new(Mutex::new(Vec::new())),
            punches: Arc::new(Mutex::new(Vec::new())),
            fail_connect: true,
            connect_delay: None,
            connects: Arc::new(AtomicUsize::new(0)),
            disconnects: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// A reachable terminal whose connect takes `delay` to complete.
    pub fn slow(serial: &str, delay: Duration) -> Arc<Self> {
        Arc::new(MockTerminal {
            serial: serial.to_string(),
            users: Arc::new(Mutex::new(Vec::new())),
            punches: Arc::new(Mutex::new(Vec::new())),
            fail_connect: false,
            connect_delay: Some(delay),
            connects: Arc::new(AtomicUsize::new(0)),
            disconnects: Arc::new(AtomicUsize::new(0)),
        })
    }

}

struct MockSession {
    serial: String,
    users: Arc<Mutex<Vec<FetchedUser>>>,
    punches: Arc<Mutex<Vec<FetchedPunch>>>,
    disconnects: Arc<AtomicUsize>,
}

#[async_trait]
impl TerminalClient for MockTerminal {
    async fn connect(&self, endpoint: &TerminalEndpoint) -> SyncResult<Box<dyn TerminalSession>> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connect {
            return Err(SyncError::connection(&endpoint.name, "connection refused"));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            serial: self.serial.clone(),
            users: Arc::clone(&self.users),
            punches: Arc::clone(&self.punches),
            disconnects: Arc::clone(&self.disconnects),
        }))
    }
}

#[async_trait]
impl TerminalSession for MockSession {
    async fn serial_number(&mut self) -> SyncResult<String> {
        Ok(self.serial.clone())
    }

    async fn users(&mut self) -> SyncResult<Vec<FetchedUser>> {
        Ok(self.users.lock().unwrap().clone())
    }

    async fn attendance(&mut self) -> SyncResult<Vec<FetchedPunch>> {
        Ok(self.punches.lock().unwrap().clone())
    }

    async fn disconnect(self: Box<Self>) -> SyncResult<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Backend Mock
// =============================================================================

/// A scripted backend: records every call, optionally failing login,
/// selected users or selected attendance batches.
#[derive(Default)]
pub struct MockRemote {
    pub fail_auth: bool,
    /// user_ids whose create call fails.
    pub fail_users: HashSet<String>,
    /// Zero-based indexes of attendance batches whose create call fails.
    pub fail_batches: HashSet<usize>,
    /// Machines the backend knows, by name.
    pub machines: Vec<RemoteMachine>,
    pub auth_calls: AtomicUsize,
    pub created_users: Mutex<Vec<UserPayload>>,
    /// Size of every attendance create call, in order.
    pub batch_sizes: Mutex<Vec<usize>>,
    pub created_attendance: Mutex<Vec<AttendancePayload>>,
    next_user_id: AtomicI64,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(MockRemote {
            next_user_id: AtomicI64::new(1),
            ..Default::default()
        })
    }

    pub fn failing_auth() -> Arc<Self> {
        Arc::new(MockRemote {
            fail_auth: true,
            ..Default::default()
        })
    }

    pub fn failing_batches(indexes: &[usize]) -> Arc<Self> {
        Arc::new(MockRemote {
            fail_batches: indexes.iter().copied().collect(),
            next_user_id: AtomicI64::new(1),
            ..Default::default()
        })
    }

    pub fn with_machine(id: i64, name: &str) -> Arc<Self> {
        Arc::new(MockRemote {
            machines: vec![RemoteMachine {
                id,
                name: name.to_string(),
            }],
            next_user_id: AtomicI64::new(1),
            ..Default::default()
        })
    }
}

#[async_trait]
impl RemoteClient for MockRemote {
    async fn authenticate(&self, config: &BackendConfig) -> SyncResult<AuthSession> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_auth {
            return Err(SyncError::Auth("credentials rejected".into()));
        }
        Ok(AuthSession {
            url: config.url.clone(),
            db: config.db.clone(),
            uid: 2,
            password: config.password.clone(),
        })
    }

    async fn create_user(&self, _session: &AuthSession, payload: &UserPayload) -> SyncResult<i64> {
        if self.fail_users.contains(&payload.user_id) {
            return Err(SyncError::Remote(format!(
                "validation failed for user {}",
                payload.user_id
            )));
        }
        self.created_users.lock().unwrap().push(payload.clone());
        Ok(self.next_user_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn create_attendance(
        &self,
        _session: &AuthSession,
        payloads: &[AttendancePayload],
    ) -> SyncResult<()> {
        let index = {
            let mut sizes = self.batch_sizes.lock().unwrap();
            sizes.push(payloads.len());
            sizes.len() - 1
        };
        if self.fail_batches.contains(&index) {
            return Err(SyncError::Remote(format!("batch {index} rejected")));
        }
        self.created_attendance
            .lock()
            .unwrap()
            .extend_from_slice(payloads);
        Ok(())
    }

    async fn find_machine(
        &self,
        _session: &AuthSession,
        name: &str,
    ) -> SyncResult<Option<RemoteMachine>> {
        Ok(self.machines.iter().find(|m| m.name == name).cloned())
    }
}

/// A complete backend config for tests.
pub fn backend_config() -> BackendConfig {
    BackendConfig {
        url: "https://hr.example.com".into(),
        db: "prod".into(),
        username: "bridge".into(),
        password: "secret".into(),
    }
}
