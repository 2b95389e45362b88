//! # Sync Scheduler
//!
//! Timer-driven cycles plus manual triggers, serialized by one lock.
//!
//! ## Cycle Anatomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       run_cycle (holds cycle lock)                      │
//! │                                                                         │
//! │  1. fetch_all        every terminal, failures logged per device        │
//! │  2. upload (if auto_sync)   auth failure aborts this phase only        │
//! │  3. cleanup          purge old logs + old SYNCED attendance            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Serialization
//! Exactly one cycle runs at a time. The timer loop waits on the lock;
//! manual triggers (`run_cycle_now`, `fetch_now`, `upload_now`) use
//! `try_lock` and answer [`SyncError::Busy`] instead of queueing, so an
//! operator clicking twice cannot pile up device sessions.
//!
//! Settings are re-read from the store at the top of every cycle; a
//! settings change takes effect on the following tick without a restart.
//! `stop` gates the next tick: an in-flight cycle always completes.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::fetch::{FetchCoordinator, FetchSummary};
use crate::remote::RemoteClient;
use crate::terminal::TerminalClient;
use crate::upload::{UploadCoordinator, UploadSummary};
use zkbridge_core::{OperationKind, SyncSettings};
use zkbridge_db::Database;

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Snapshot of the scheduler for the presentation layer.
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    /// When the last scheduled cycle started.
    pub last_run: Option<DateTime<Utc>>,
    /// When the next scheduled cycle is due. None while stopped.
    pub next_run: Option<DateTime<Utc>>,
}

/// Outcome of one full cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    pub fetched: Vec<FetchSummary>,
    /// None when auto_sync is off or the upload phase failed.
    pub upload: Option<UploadSummary>,
    pub logs_purged: u64,
    pub attendance_purged: u64,
}

/// Owns the timer loop and the cycle lock.
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

struct SchedulerInner {
    db: Database,
    fetch: FetchCoordinator,
    upload: UploadCoordinator,
    status: RwLock<SchedulerStatus>,
    cycle_lock: Mutex<()>,
}

impl Scheduler {
    /// Creates a stopped scheduler over the given boundaries.
    pub fn new(
        db: Database,
        terminal_client: Arc<dyn TerminalClient>,
        remote_client: Arc<dyn RemoteClient>,
    ) -> Self {
        let inner = Arc::new(SchedulerInner {
            fetch: FetchCoordinator::new(db.clone(), terminal_client),
            upload: UploadCoordinator::new(db.clone(), remote_client),
            db,
            status: RwLock::new(SchedulerStatus {
                state: SchedulerState::Stopped,
                last_run: None,
                next_run: None,
            }),
            cycle_lock: Mutex::new(()),
        });

        Scheduler {
            inner,
            shutdown_tx: None,
            task: None,
        }
    }

    /// The fetch coordinator, for manual per-terminal operations.
    pub fn fetch_coordinator(&self) -> &FetchCoordinator {
        &self.inner.fetch
    }

    /// The upload coordinator, for linking and manual uploads.
    pub fn upload_coordinator(&self) -> &UploadCoordinator {
        &self.inner.upload
    }

    /// Current lifecycle snapshot.
    pub async fn status(&self) -> SchedulerStatus {
        self.inner.status.read().await.clone()
    }

    /// Starts the timer loop. No-op if already running.
    pub async fn start(&mut self) -> SyncResult<()> {
        if self.shutdown_tx.is_some() {
            info!("Scheduler already running");
            return Ok(());
        }

        self.inner
            .db
            .operation_logs()
            .append(None, OperationKind::Scheduler, "Scheduler started")
            .await?;

        let (tx, mut rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(tx);
        self.inner.status.write().await.state = SchedulerState::Running;

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            loop {
                let settings = match inner.db.settings().load().await {
                    Ok(settings) => settings,
                    Err(e) => {
                        error!(error = %e, "Failed to load settings, using defaults");
                        SyncSettings::default()
                    }
                };

                let started = Utc::now();
                let next = started + ChronoDuration::minutes(i64::from(settings.interval_minutes));
                {
                    let mut status = inner.status.write().await;
                    status.last_run = Some(started);
                    status.next_run = Some(next);
                }

                {
                    let _guard = inner.cycle_lock.lock().await;
                    if let Err(e) = inner.run_cycle(&settings).await {
                        error!(error = %e, "Sync cycle failed");
                    }
                }

                let wait = (next - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::from_secs(0));
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = rx.recv() => break,
                }
            }
            info!("Scheduler loop exited");
        });
        self.task = Some(task);

        Ok(())
    }

    /// Stops the timer loop. Waits for an in-flight cycle to complete;
    /// no further tick fires afterwards. No-op if already stopped.
    pub async fn stop(&mut self) -> SyncResult<()> {
        let Some(tx) = self.shutdown_tx.take() else {
            return Ok(());
        };

        // Capacity-one channel: the signal is buffered even while a
        // cycle is mid-flight, and the loop sees it at the next select.
        let _ = tx.send(()).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }

        {
            let mut status = self.inner.status.write().await;
            status.state = SchedulerState::Stopped;
            status.next_run = None;
        }

        self.inner
            .db
            .operation_logs()
            .append(None, OperationKind::Scheduler, "Scheduler stopped")
            .await?;

        Ok(())
    }

    /// Runs one full cycle immediately. Rejected with [`SyncError::Busy`]
    /// while another cycle holds the lock.
    pub async fn run_cycle_now(&self) -> SyncResult<CycleSummary> {
        let _guard = self.inner.cycle_lock.try_lock().map_err(|_| SyncError::Busy)?;
        let settings = self.inner.db.settings().load().await?;
        self.inner.run_cycle(&settings).await
    }

    /// Fetches a single terminal immediately. Rejected while a cycle is
    /// running.
    pub async fn fetch_now(&self, terminal_id: i64) -> SyncResult<FetchSummary> {
        let _guard = self.inner.cycle_lock.try_lock().map_err(|_| SyncError::Busy)?;
        let terminal = self
            .inner
            .db
            .terminals()
            .get(terminal_id)
            .await?
            .ok_or_else(|| {
                SyncError::InvalidConfig(format!("no terminal with id {terminal_id}"))
            })?;
        let settings = self.inner.db.settings().load().await?;
        self.inner.fetch.fetch_terminal(&terminal, &settings).await
    }

    /// Runs an upload phase immediately. Rejected while a cycle is
    /// running.
    pub async fn upload_now(&self) -> SyncResult<UploadSummary> {
        let _guard = self.inner.cycle_lock.try_lock().map_err(|_| SyncError::Busy)?;
        let settings = self.inner.db.settings().load().await?;
        self.inner.upload.run(&settings).await
    }

    /// Tests connectivity to one terminal. Rejected while a cycle is
    /// running; a device serves a single control session at a time.
    pub async fn test_connection_now(&self, terminal_id: i64) -> SyncResult<String> {
        let _guard = self.inner.cycle_lock.try_lock().map_err(|_| SyncError::Busy)?;
        let terminal = self
            .inner
            .db
            .terminals()
            .get(terminal_id)
            .await?
            .ok_or_else(|| {
                SyncError::InvalidConfig(format!("no terminal with id {terminal_id}"))
            })?;
        self.inner.fetch.test_connection(&terminal).await
    }
}

impl SchedulerInner {
    /// One cycle: fetch, optional upload, cleanup. Caller holds the
    /// cycle lock.
    async fn run_cycle(&self, settings: &SyncSettings) -> SyncResult<CycleSummary> {
        let logs = self.db.operation_logs();
        logs.append(None, OperationKind::Scheduler, "Sync cycle started")
            .await?;

        let fetched = self.fetch.fetch_all(settings).await?;

        let upload = if settings.auto_sync {
            match self.upload.run(settings).await {
                Ok(summary) => Some(summary),
                Err(e) if e.is_fatal_for_cycle() => return Err(e),
                Err(e) => {
                    // Already logged by the upload phase; staged data is
                    // untouched and the next cycle retries.
                    warn!(error = %e, "Upload phase failed");
                    None
                }
            }
        } else {
            None
        };

        let logs_purged = logs
            .purge_older_than(
                Utc::now() - ChronoDuration::days(i64::from(settings.log_retention_days)),
            )
            .await?;
        let attendance_purged = self
            .db
            .attendance()
            .purge_old_synced(
                Utc::now().naive_utc()
                    - ChronoDuration::days(i64::from(settings.attendance_retention_days)),
            )
            .await?;

        if logs_purged + attendance_purged > 0 {
            logs.append(
                None,
                OperationKind::Cleanup,
                &format!(
                    "Removed {logs_purged} old log entries and \
                     {attendance_purged} old synced attendance records"
                ),
            )
            .await?;
        }

        logs.append(None, OperationKind::Scheduler, "Sync cycle finished")
            .await?;

        Ok(CycleSummary {
            fetched,
            upload,
            logs_purged,
            attendance_purged,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{backend_config, MockRemote, MockTerminal};
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::Ordering;
    use zkbridge_core::{FetchedPunch, FetchedUser, NewTerminal};
    use zkbridge_db::{Database, DbConfig};

    async fn db_with_terminal() -> (Database, i64) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let t = db
            .terminals()
            .create(&NewTerminal {
                name: "lobby".into(),
                ip: "10.0.0.2".into(),
                port: 4370,
                password: None,
                remote_name: Some("Lobby Machine".into()),
            })
            .await
            .unwrap();
        (db, t.id)
    }

    async fn scheduler_log_messages(db: &Database) -> Vec<String> {
        db.operation_logs()
            .recent(50)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.operation == OperationKind::Scheduler)
            .map(|e| e.message)
            .collect()
    }

    #[tokio::test]
    async fn test_start_runs_a_cycle_and_stop_halts() {
        let (db, _) = db_with_terminal().await;
        let device = MockTerminal::with_data(
            "SN1",
            vec![FetchedUser {
                device_uid: 1,
                user_id: "100".into(),
                name: "Ada".into(),
            }],
            Vec::new(),
        );
        let mut scheduler = Scheduler::new(db.clone(), device, MockRemote::new());

        scheduler.start().await.unwrap();
        scheduler.start().await.unwrap(); // second start is a no-op

        // Give the first (immediate) cycle time to finish.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let status = scheduler.status().await;
        assert_eq!(status.state, SchedulerState::Running);
        assert!(status.last_run.is_some());
        assert!(status.next_run.is_some());

        scheduler.stop().await.unwrap();
        let status = scheduler.status().await;
        assert_eq!(status.state, SchedulerState::Stopped);
        assert!(status.next_run.is_none());

        let messages = scheduler_log_messages(&db).await;
        assert!(messages.iter().any(|m| m == "Sync cycle finished"));
        assert!(messages.iter().any(|m| m == "Scheduler stopped"));
    }

    #[tokio::test]
    async fn test_stop_lets_inflight_cycle_complete() {
        let (db, _) = db_with_terminal().await;
        // Connect takes long enough that stop() lands mid-cycle.
        let device = MockTerminal::slow("SN1", Duration::from_millis(300));
        let mut scheduler = Scheduler::new(db.clone(), device, MockRemote::new());

        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.stop().await.unwrap();

        let messages = scheduler_log_messages(&db).await;
        assert!(messages.iter().any(|m| m == "Sync cycle finished"));
        assert_eq!(scheduler.status().await.state, SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn test_manual_trigger_rejected_while_cycle_running() {
        let (db, tid) = db_with_terminal().await;
        let device = MockTerminal::slow("SN1", Duration::from_millis(300));
        let scheduler = Arc::new(Scheduler::new(db.clone(), device, MockRemote::new()));

        let background = Arc::clone(&scheduler);
        let cycle = tokio::spawn(async move { background.run_cycle_now().await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(matches!(scheduler.fetch_now(tid).await, Err(SyncError::Busy)));
        assert!(matches!(scheduler.upload_now().await, Err(SyncError::Busy)));
        assert!(matches!(scheduler.run_cycle_now().await, Err(SyncError::Busy)));

        cycle.await.unwrap().unwrap();
        // Lock released: manual triggers work again.
        assert!(scheduler.fetch_now(tid).await.is_ok());
    }

    #[tokio::test]
    async fn test_cycle_without_auto_sync_skips_upload() {
        let (db, _) = db_with_terminal().await;
        db.settings()
            .save(&SyncSettings {
                auto_sync: false,
                ..SyncSettings::default()
            })
            .await
            .unwrap();
        db.settings().save_backend_config(&backend_config()).await.unwrap();

        let device = MockTerminal::new("SN1");
        let remote = MockRemote::new();
        let scheduler = Scheduler::new(db.clone(), device, remote.clone());

        let summary = scheduler.run_cycle_now().await.unwrap();
        assert!(summary.upload.is_none());
        assert_eq!(remote.auth_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cycle_runs_retention_cleanup() {
        let (db, tid) = db_with_terminal().await;
        // Upload disabled so the pending punch stays pending through the
        // cycle and retention must spare it.
        db.settings()
            .save(&SyncSettings {
                auto_sync: false,
                ..SyncSettings::default()
            })
            .await
            .unwrap();

        // Backdated rows, planted directly: one stale log entry, one
        // stale synced punch, one stale unsynced punch.
        let old_log_ts = Utc::now() - ChronoDuration::days(40);
        sqlx::query(
            "INSERT INTO operation_logs (terminal_id, timestamp, operation, message)
             VALUES (NULL, ?1, 'fetch', 'ancient entry')",
        )
        .bind(old_log_ts)
        .execute(db.pool())
        .await
        .unwrap();

        let old_ts = Utc::now().naive_utc() - ChronoDuration::days(200);
        db.attendance()
            .insert_if_absent(
                tid,
                &[
                    FetchedPunch {
                        user_id: "100".into(),
                        timestamp: old_ts,
                    },
                    FetchedPunch {
                        user_id: "101".into(),
                        timestamp: old_ts + ChronoDuration::hours(1),
                    },
                ],
            )
            .await
            .unwrap();
        let synced_id = db.attendance().unsynced(10).await.unwrap()[0].id;
        db.attendance().mark_synced(&[synced_id], Utc::now()).await.unwrap();

        let device = MockTerminal::new("SN1");
        let scheduler = Scheduler::new(db.clone(), device, MockRemote::new());

        let summary = scheduler.run_cycle_now().await.unwrap();
        assert_eq!(summary.logs_purged, 1);
        // Only the synced stale punch goes; the stale unsynced one
        // survives until an upload marks it.
        assert_eq!(summary.attendance_purged, 1);
        assert_eq!(db.attendance().count_unsynced().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fetch_now_rejects_unknown_terminal() {
        let (db, _) = db_with_terminal().await;
        let scheduler = Scheduler::new(db, MockTerminal::new("SN1"), MockRemote::new());

        let err = scheduler.fetch_now(999).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
    }
}
