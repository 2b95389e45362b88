//! # Upload Coordinator
//!
//! Pushes staged records to the HR backend and marks them synced.
//!
//! ## Upload Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              run                                        │
//! │                                                                         │
//! │  authenticate once ──── failure aborts the phase, nothing is marked    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  users: one create per record, mark_synced immediately after each      │
//! │       │                 (unlinked terminal → skip + log, stays pending)│
//! │       ▼                                                                 │
//! │  attendance: batches of batch_size, one create call per batch,         │
//! │              mark_synced for the whole batch on success                 │
//! │              (failed batch → log, continue with the next)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Marking happens only after the backend confirms the create, so a
//! crash between the two leaves the record pending and it is re-sent
//! next cycle; the deterministic `att_id` lets the backend deduplicate.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::{SyncError, SyncResult};
use crate::remote::{AttendancePayload, AuthSession, RemoteClient, UserPayload};
use zkbridge_core::{OperationKind, SyncSettings, Terminal};
use zkbridge_db::Database;

/// One progress log line per this many user creates.
const USER_PROGRESS_EVERY: usize = 50;

/// Upper bound on records drained per cycle; each record is attempted
/// at most once per cycle either way.
const DRAIN_LIMIT: u32 = 100_000;

/// Outcome of one upload phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub users_uploaded: usize,
    pub users_skipped: usize,
    pub users_failed: usize,
    pub attendance_uploaded: usize,
    pub attendance_skipped: usize,
    pub attendance_failed: usize,
}

/// Pushes staged records to the backend.
pub struct UploadCoordinator {
    db: Database,
    remote: Arc<dyn RemoteClient>,
}

impl UploadCoordinator {
    /// Creates a new UploadCoordinator.
    pub fn new(db: Database, remote: Arc<dyn RemoteClient>) -> Self {
        UploadCoordinator { db, remote }
    }

    /// Runs one upload phase: users first, then attendance.
    #[instrument(skip(self, settings))]
    pub async fn run(&self, settings: &SyncSettings) -> SyncResult<UploadSummary> {
        let logs = self.db.operation_logs();

        let config = self.db.settings().load_backend_config().await?;
        if !config.is_complete() {
            let message = "Backend connection is not configured; skipping upload";
            logs.append(None, OperationKind::Upload, message).await?;
            return Err(SyncError::InvalidConfig(message.into()));
        }

        let session = match self.remote.authenticate(&config).await {
            Ok(session) => session,
            Err(e) => {
                logs.append(None, OperationKind::Error, &e.to_string()).await?;
                return Err(e);
            }
        };
        logs.append(
            None,
            OperationKind::Upload,
            &format!("Authenticated against {} as uid {}", session.url, session.uid),
        )
        .await?;

        let terminals: HashMap<i64, Terminal> = self
            .db
            .terminals()
            .list()
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let mut summary = UploadSummary::default();
        self.upload_users(&session, &terminals, &mut summary).await?;
        self.upload_attendance(&session, &terminals, settings, &mut summary)
            .await?;

        info!(
            users = summary.users_uploaded,
            attendance = summary.attendance_uploaded,
            "Upload phase complete"
        );
        logs.append(
            None,
            OperationKind::Upload,
            &format!(
                "Upload complete: {} users ({} skipped, {} failed), \
                 {} attendance records ({} skipped, {} failed)",
                summary.users_uploaded,
                summary.users_skipped,
                summary.users_failed,
                summary.attendance_uploaded,
                summary.attendance_skipped,
                summary.attendance_failed,
            ),
        )
        .await?;

        Ok(summary)
    }

    /// Links a terminal to its backend machine record by name.
    pub async fn link_terminal(&self, terminal: &Terminal) -> SyncResult<i64> {
        let logs = self.db.operation_logs();

        let Some(remote_name) = terminal.remote_name.as_deref().filter(|n| !n.is_empty()) else {
            return Err(SyncError::InvalidConfig(format!(
                "terminal '{}' has no backend machine name configured",
                terminal.name
            )));
        };

        let config = self.db.settings().load_backend_config().await?;
        let result = async {
            let session = self.remote.authenticate(&config).await?;
            let machine = self
                .remote
                .find_machine(&session, remote_name)
                .await?
                .ok_or_else(|| {
                    SyncError::Remote(format!("no backend machine named '{remote_name}'"))
                })?;
            Ok::<_, SyncError>(machine)
        }
        .await;

        match result {
            Ok(machine) => {
                self.db
                    .terminals()
                    .link_remote(terminal.id, machine.id, terminal.utc_offset_minutes)
                    .await?;
                logs.append(
                    Some(terminal.id),
                    OperationKind::Link,
                    &format!(
                        "Linked terminal '{}' to backend machine '{}' (id {})",
                        terminal.name, machine.name, machine.id
                    ),
                )
                .await?;
                Ok(machine.id)
            }
            Err(e) => {
                if !e.is_fatal_for_cycle() {
                    logs.append(Some(terminal.id), OperationKind::Error, &e.to_string())
                        .await?;
                }
                Err(e)
            }
        }
    }

    async fn upload_users(
        &self,
        session: &AuthSession,
        terminals: &HashMap<i64, Terminal>,
        summary: &mut UploadSummary,
    ) -> SyncResult<()> {
        let logs = self.db.operation_logs();
        let pending = self.db.device_users().unsynced(DRAIN_LIMIT).await?;
        if pending.is_empty() {
            return Ok(());
        }
        let total = pending.len();

        for user in pending {
            let Some(machine_id) = terminals.get(&user.terminal_id).and_then(|t| t.remote_id)
            else {
                summary.users_skipped += 1;
                logs.append(
                    Some(user.terminal_id),
                    OperationKind::Upload,
                    &format!(
                        "Skipping user '{}': terminal is not linked to a backend machine",
                        user.user_id
                    ),
                )
                .await?;
                continue;
            };

            let payload = UserPayload {
                uid: user.device_uid,
                user_id: user.user_id.clone(),
                name: user.name.clone(),
                machine_id,
            };

            match self.remote.create_user(session, &payload).await {
                Ok(_remote_id) => {
                    self.db.device_users().mark_synced(user.id, Utc::now()).await?;
                    summary.users_uploaded += 1;
                    if summary.users_uploaded % USER_PROGRESS_EVERY == 0 {
                        logs.append(
                            None,
                            OperationKind::Upload,
                            &format!("Uploaded {} of {total} users", summary.users_uploaded),
                        )
                        .await?;
                    }
                }
                Err(e) if e.is_fatal_for_cycle() => return Err(e),
                Err(e) => {
                    summary.users_failed += 1;
                    warn!(user_id = %user.user_id, error = %e, "User upload failed");
                    logs.append(
                        Some(user.terminal_id),
                        OperationKind::Error,
                        &format!("Failed to upload user '{}': {e}", user.user_id),
                    )
                    .await?;
                }
            }
        }

        Ok(())
    }

    async fn upload_attendance(
        &self,
        session: &AuthSession,
        terminals: &HashMap<i64, Terminal>,
        settings: &SyncSettings,
        summary: &mut UploadSummary,
    ) -> SyncResult<()> {
        let logs = self.db.operation_logs();
        let pending = self.db.attendance().unsynced(DRAIN_LIMIT).await?;
        if pending.is_empty() {
            return Ok(());
        }
        let total = pending.len();

        // Records from unlinked terminals stay pending; everything else
        // becomes (row id, payload) ready for batching.
        let mut ready: Vec<(i64, AttendancePayload)> = Vec::with_capacity(pending.len());
        for record in pending {
            let Some(terminal) = terminals.get(&record.terminal_id) else {
                summary.attendance_skipped += 1;
                continue;
            };
            let Some(machine_id) = terminal.remote_id else {
                summary.attendance_skipped += 1;
                logs.append(
                    Some(record.terminal_id),
                    OperationKind::Upload,
                    &format!(
                        "Skipping punch {}: terminal '{}' is not linked",
                        record.att_id, terminal.name
                    ),
                )
                .await?;
                continue;
            };

            // Fall back to the raw device time if the configured offset
            // is unusable; dropping the punch would be worse.
            let timestamp = match terminal.punch_to_utc(record.timestamp) {
                Ok(utc) => utc.naive_utc(),
                Err(e) => {
                    logs.append(Some(record.terminal_id), OperationKind::Error, &e.to_string())
                        .await?;
                    record.timestamp
                }
            };

            ready.push((
                record.id,
                AttendancePayload {
                    user_id: record.user_id,
                    timestamp: timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                    machine_id,
                    att_id: record.att_id,
                },
            ));
        }

        let batch_size = (settings.batch_size.max(1)) as usize;
        for batch in ready.chunks(batch_size) {
            let payloads: Vec<AttendancePayload> =
                batch.iter().map(|(_, p)| p.clone()).collect();

            match self.remote.create_attendance(session, &payloads).await {
                Ok(()) => {
                    let ids: Vec<i64> = batch.iter().map(|(id, _)| *id).collect();
                    self.db.attendance().mark_synced(&ids, Utc::now()).await?;
                    summary.attendance_uploaded += ids.len();
                    logs.append(
                        None,
                        OperationKind::Upload,
                        &format!(
                            "Uploaded {} of {total} attendance records",
                            summary.attendance_uploaded
                        ),
                    )
                    .await?;
                }
                Err(e) if e.is_fatal_for_cycle() => return Err(e),
                Err(e) => {
                    summary.attendance_failed += batch.len();
                    warn!(batch = batch.len(), error = %e, "Attendance batch failed");
                    logs.append(
                        None,
                        OperationKind::Error,
                        &format!("Failed to upload a batch of {}: {e}", batch.len()),
                    )
                    .await?;
                }
            }
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
