//! # Remote Backend Client
//!
//! The seam between the engine and the HR backend, plus the concrete
//! Odoo JSON-RPC implementation.
//!
//! ## Protocol
//! ```text
//! POST {url}/jsonrpc
//!   service "common", method "authenticate" → numeric uid (false = rejected)
//!   service "object", method "execute_kw"   → model calls:
//!       azk.machine.proxy.users       create       (one per user)
//!       azk.machine.proxy.attendance  create       (one per batch)
//!       azk.machine                   search_read  (link lookup by name)
//! ```
//!
//! Every `execute_kw` call re-sends db/uid/password; the backend has no
//! session cookie for this transport. [`AuthSession`] carries those
//! three so coordinators authenticate once per cycle and thread the
//! session through.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{SyncError, SyncResult};
use zkbridge_core::BackendConfig;

const USERS_MODEL: &str = "azk.machine.proxy.users";
const ATTENDANCE_MODEL: &str = "azk.machine.proxy.attendance";
const MACHINE_MODEL: &str = "azk.machine";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Payloads
// =============================================================================

/// Proof of a completed login, threaded through every backend call.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub url: String,
    pub db: String,
    pub uid: i64,
    pub(crate) password: String,
}

/// One roster entry as sent to the backend.
#[derive(Debug, Clone, Serialize)]
pub struct UserPayload {
    /// Device-internal uid.
    pub uid: i64,
    /// Device-local user id (badge/PIN).
    pub user_id: String,
    pub name: String,
    /// Backend machine record the user belongs to.
    pub machine_id: i64,
}

/// One punch as sent to the backend.
#[derive(Debug, Clone, Serialize)]
pub struct AttendancePayload {
    pub user_id: String,
    /// `%Y-%m-%d %H:%M:%S`, UTC when the terminal has a clock offset
    /// configured, raw device time otherwise.
    pub timestamp: String,
    /// Backend machine record the punch came from.
    pub machine_id: i64,
    /// Stable external id for backend-side deduplication.
    pub att_id: String,
}

/// A backend machine record matched during linking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMachine {
    pub id: i64,
    pub name: String,
}

// =============================================================================
// Client Trait
// =============================================================================

/// Creates records in the HR backend.
///
/// One call per user, one call per attendance batch. Implementations
/// must not retry internally; the staging store's sync-state tracking
/// already makes redelivery safe.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Logs in. Returns a session for subsequent calls.
    async fn authenticate(&self, config: &BackendConfig) -> SyncResult<AuthSession>;

    /// Creates one user record; returns its backend id.
    async fn create_user(&self, session: &AuthSession, payload: &UserPayload) -> SyncResult<i64>;

    /// Creates a batch of attendance records in a single call.
    async fn create_attendance(
        &self,
        session: &AuthSession,
        payloads: &[AttendancePayload],
    ) -> SyncResult<()>;

    /// Looks up a backend machine record by its exact name.
    async fn find_machine(
        &self,
        session: &AuthSession,
        name: &str,
    ) -> SyncResult<Option<RemoteMachine>>;
}

// =============================================================================
// Odoo JSON-RPC Implementation
// =============================================================================

/// [`RemoteClient`] over Odoo's `/jsonrpc` endpoint.
#[derive(Debug, Clone)]
pub struct OdooRpcClient {
    http: reqwest::Client,
}

impl OdooRpcClient {
    /// Creates a client with the default request timeout.
    pub fn new() -> SyncResult<Self> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a client with an explicit request timeout.
    pub fn with_timeout(timeout: Duration) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Remote(format!("failed to build HTTP client: {e}")))?;
        Ok(OdooRpcClient { http })
    }

    /// Issues one JSON-RPC call and unwraps the `result` field.
    async fn rpc(&self, base_url: &str, service: &str, method: &str, args: Value) -> SyncResult<Value> {
        let endpoint = Url::parse(base_url)
            .and_then(|u| u.join("/jsonrpc"))
            .map_err(|e| SyncError::InvalidConfig(format!("bad backend URL '{base_url}': {e}")))?;

        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": {
                "service": service,
                "method": method,
                "args": args,
            },
            "id": 1,
        });

        debug!(%endpoint, service, method, "Backend RPC call");

        let response = self
            .http
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::Remote(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Remote(format!("backend returned HTTP {status}")));
        }

        let reply: Value = response
            .json()
            .await
            .map_err(|e| SyncError::Remote(format!("malformed backend reply: {e}")))?;

        if let Some(error) = reply.get("error") {
            let message = error
                .pointer("/data/message")
                .or_else(|| error.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown backend error");
            return Err(SyncError::Remote(message.to_string()));
        }

        reply
            .get("result")
            .cloned()
            .ok_or_else(|| SyncError::Remote("backend reply carried no result".into()))
    }

    /// `execute_kw` against a model, with the session credentials
    /// re-sent as the protocol requires.
    async fn execute_kw(
        &self,
        session: &AuthSession,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> SyncResult<Value> {
        self.rpc(
            &session.url,
            "object",
            "execute_kw",
            json!([
                session.db,
                session.uid,
                session.password,
                model,
                method,
                args,
                kwargs,
            ]),
        )
        .await
    }
}

#[async_trait]
impl RemoteClient for OdooRpcClient {
    #[instrument(skip(self, config), fields(url = %config.url, db = %config.db))]
    async fn authenticate(&self, config: &BackendConfig) -> SyncResult<AuthSession> {
        if !config.is_complete() {
            return Err(SyncError::InvalidConfig(
                "backend URL, database, username and password are all required".into(),
            ));
        }

        let result = self
            .rpc(
                &config.url,
                "common",
                "authenticate",
                json!([config.db, config.username, config.password, {}]),
            )
            .await
            .map_err(|e| match e {
                // Unreachable or broken backend at login time is an auth
                // failure for cycle purposes: the upload phase cannot run.
                SyncError::Remote(msg) => SyncError::Auth(msg),
                other => other,
            })?;

        // Odoo answers `false` for rejected credentials.
        let uid = result
            .as_i64()
            .ok_or_else(|| SyncError::Auth("credentials rejected".into()))?;

        debug!(uid, "Backend authentication succeeded");
        Ok(AuthSession {
            url: config.url.clone(),
            db: config.db.clone(),
            uid,
            password: config.password.clone(),
        })
    }

    async fn create_user(&self, session: &AuthSession, payload: &UserPayload) -> SyncResult<i64> {
        let value = serde_json::to_value(payload)
            .map_err(|e| SyncError::Remote(format!("failed to encode user payload: {e}")))?;

        let result = self
            .execute_kw(session, USERS_MODEL, "create", json!([value]), json!({}))
            .await?;

        result
            .as_i64()
            .ok_or_else(|| SyncError::Remote("user create returned no id".into()))
    }

    async fn create_attendance(
        &self,
        session: &AuthSession,
        payloads: &[AttendancePayload],
    ) -> SyncResult<()> {
        if payloads.is_empty() {
            return Ok(());
        }

        let values = serde_json::to_value(payloads)
            .map_err(|e| SyncError::Remote(format!("failed to encode attendance batch: {e}")))?;

        self.execute_kw(session, ATTENDANCE_MODEL, "create", json!([values]), json!({}))
            .await?;
        Ok(())
    }

    async fn find_machine(
        &self,
        session: &AuthSession,
        name: &str,
    ) -> SyncResult<Option<RemoteMachine>> {
        let result = self
            .execute_kw(
                session,
                MACHINE_MODEL,
                "search_read",
                json!([[["name", "=", name]]]),
                json!({"fields": ["id", "name"], "limit": 1}),
            )
            .await?;

        let Some(record) = result.as_array().and_then(|a| a.first()) else {
            return Ok(None);
        };

        let id = record
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| SyncError::Remote("machine record carried no id".into()))?;
        let name = record
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(name)
            .to_string();

        Ok(Some(RemoteMachine { id, name }))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
