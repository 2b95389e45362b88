//! # Fetch Coordinator
//!
//! Pulls rosters and punches from terminals into the staging store.
//!
//! ## Fetch Flow (per terminal)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         fetch_terminal                                  │
//! │                                                                         │
//! │  1. window lower bound = staged watermark, else now - lookback         │
//! │     (truncated to midnight: the first day is always re-pulled and      │
//! │      insert-if-absent drops the overlap)                               │
//! │  2. connect (timeout-bounded)                                          │
//! │  3. read serial → record_connection                                    │
//! │  4. read roster → replace_roster                                       │
//! │  5. read punches → keep lower < ts <= now → insert_if_absent           │
//! │  6. disconnect (always, also on error)                                 │
//! │  7. log summary / error entry                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One unreachable device never aborts the cycle: `fetch_all` logs the
//! failure and moves on. Only staging store errors are fatal.

use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::error::{SyncError, SyncResult};
use crate::terminal::{TerminalClient, TerminalEndpoint, TerminalSession};
use zkbridge_core::{FetchedPunch, OperationKind, SyncSettings, Terminal};
use zkbridge_db::Database;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Outcome of one terminal fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSummary {
    pub terminal_id: i64,
    /// Roster size staged.
    pub users: usize,
    /// Punches inside the fetch window.
    pub fetched: usize,
    /// Punches actually new to the store.
    pub inserted: u64,
}

/// Pulls device data into the staging store.
pub struct FetchCoordinator {
    db: Database,
    client: Arc<dyn TerminalClient>,
    connect_timeout: Duration,
}

impl FetchCoordinator {
    /// Creates a coordinator with the default connect timeout.
    pub fn new(db: Database, client: Arc<dyn TerminalClient>) -> Self {
        FetchCoordinator {
            db,
            client,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Overrides the per-device connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Fetches every configured terminal in creation order.
    ///
    /// Device failures are logged and skipped; only staging store errors
    /// abort. Returns a summary per terminal that succeeded.
    pub async fn fetch_all(&self, settings: &SyncSettings) -> SyncResult<Vec<FetchSummary>> {
        let terminals = self.db.terminals().list().await?;
        let mut summaries = Vec::with_capacity(terminals.len());

        for terminal in &terminals {
            match self.fetch_terminal(terminal, settings).await {
                Ok(summary) => summaries.push(summary),
                Err(e) if e.is_fatal_for_cycle() => return Err(e),
                Err(e) => {
                    warn!(terminal = %terminal.name, error = %e, "Fetch failed, continuing");
                }
            }
        }

        Ok(summaries)
    }

    /// Fetches one terminal and logs the outcome.
    #[instrument(skip(self, terminal, settings), fields(terminal = %terminal.name))]
    pub async fn fetch_terminal(
        &self,
        terminal: &Terminal,
        settings: &SyncSettings,
    ) -> SyncResult<FetchSummary> {
        let logs = self.db.operation_logs();
        logs.append(
            Some(terminal.id),
            OperationKind::Fetch,
            &format!("Fetching from terminal '{}'", terminal.name),
        )
        .await?;

        match self.fetch_inner(terminal, settings).await {
            Ok(summary) => {
                info!(
                    users = summary.users,
                    fetched = summary.fetched,
                    inserted = summary.inserted,
                    "Fetch complete"
                );
                logs.append(
                    Some(terminal.id),
                    OperationKind::Fetch,
                    &format!(
                        "Fetched {} users and {} attendance records ({} new) from '{}'",
                        summary.users, summary.fetched, summary.inserted, terminal.name
                    ),
                )
                .await?;
                Ok(summary)
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

    /// Manually verifies a device is reachable: connect, read the serial
    /// number, record it, disconnect.
    pub async fn test_connection(&self, terminal: &Terminal) -> SyncResult<String> {
        let logs = self.db.operation_logs();

        let result = async {
            let mut session = self.connect(terminal).await?;
            let serial = match session.serial_number().await {
                Ok(serial) => serial,
                Err(e) => {
                    let _ = session.disconnect().await;
                    return Err(e);
                }
            };
            session.disconnect().await?;
            Ok(serial)
        }
        .await;

        match result {
            Ok(serial) => {
                self.db
                    .terminals()
                    .record_connection(terminal.id, &serial, Utc::now())
                    .await?;
                logs.append(
                    Some(terminal.id),
                    OperationKind::TestConnection,
                    &format!("Terminal '{}' reachable, serial {serial}", terminal.name),
                )
                .await?;
                Ok(serial)
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

    async fn connect(&self, terminal: &Terminal) -> SyncResult<Box<dyn TerminalSession>> {
        let endpoint = TerminalEndpoint::from(terminal);
        tokio::time::timeout(self.connect_timeout, self.client.connect(&endpoint))
            .await
            .map_err(|_| {
                SyncError::connection(
                    &terminal.name,
                    format!("connect timed out after {:?}", self.connect_timeout),
                )
            })?
    }

    async fn fetch_inner(
        &self,
        terminal: &Terminal,
        settings: &SyncSettings,
    ) -> SyncResult<FetchSummary> {
        let now = device_now(terminal);
        let lower = match self.db.attendance().latest_timestamp(terminal.id).await? {
            Some(watermark) => watermark,
            None => now - ChronoDuration::days(i64::from(settings.lookback_days)),
        };
        let lower = truncate_to_midnight(lower);

        let mut session = self.connect(terminal).await?;

        let read = async {
            let serial = session.serial_number().await?;
            self.db
                .terminals()
                .record_connection(terminal.id, &serial, Utc::now())
                .await?;

            let users = session.users().await?;
            self.db
                .device_users()
                .replace_roster(terminal.id, &users)
                .await?;

            let punches = session.attendance().await?;
            Ok::<_, SyncError>((users.len(), punches))
        }
        .await;

        // The device refuses the next connect if a session is left open.
        let disconnect_result = session.disconnect().await;
        let (user_count, punches) = read?;
        disconnect_result?;

        let in_window: Vec<FetchedPunch> = punches
            .into_iter()
            .filter(|p| p.timestamp > lower && p.timestamp <= now)
            .collect();

        let inserted = self
            .db
            .attendance()
            .insert_if_absent(terminal.id, &in_window)
            .await?;

        Ok(FetchSummary {
            terminal_id: terminal.id,
            users: user_count,
            fetched: in_window.len(),
            inserted,
        })
    }
}

/// Current time on the device clock, approximated from the configured
/// offset. Without an offset the host's UTC clock stands in.
fn device_now(terminal: &Terminal) -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    match terminal.utc_offset_minutes {
        Some(minutes) => now + ChronoDuration::minutes(minutes),
        None => now,
    }
}

fn truncate_to_midnight(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date().and_hms_opt(0, 0, 0).unwrap_or(ts)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockTerminal;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::Arc;
    use zkbridge_core::{FetchedPunch, FetchedUser, NewTerminal, OperationKind};
    use zkbridge_db::{Database, DbConfig};

    async fn db_with_terminal() -> (Database, Terminal) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let t = db
            .terminals()
            .create(&NewTerminal {
                name: "lobby".into(),
                ip: "10.0.0.2".into(),
                port: 4370,
                password: None,
                remote_name: None,
            })
            .await
            .unwrap();
        (db, t)
    }

    fn user(uid: i64, user_id: &str, name: &str) -> FetchedUser {
        FetchedUser {
            device_uid: uid,
            user_id: user_id.into(),
            name: name.into(),
        }
    }

    fn punch_hours_ago(user: &str, hours: i64) -> FetchedPunch {
        FetchedPunch {
            user_id: user.into(),
            timestamp: Utc::now().naive_utc() - ChronoDuration::hours(hours),
        }
    }

    fn roster_of_five() -> Vec<FetchedUser> {
        (0..5)
            .map(|i| user(i + 1, &format!("10{i}"), &format!("User {i}")))
            .collect()
    }

    fn ten_punches() -> Vec<FetchedPunch> {
        (0..10)
            .map(|i| punch_hours_ago(&format!("10{}", i % 5), i + 1))
            .collect()
    }

    #[tokio::test]
    async fn test_fresh_terminal_stages_everything_unsynced() {
        let (db, terminal) = db_with_terminal().await;
        let device = MockTerminal::with_data("SN100", roster_of_five(), ten_punches());
        let coordinator = FetchCoordinator::new(db.clone(), device);

        let summary = coordinator
            .fetch_terminal(&terminal, &SyncSettings::default())
            .await
            .unwrap();

        assert_eq!(summary.users, 5);
        assert_eq!(summary.fetched, 10);
        assert_eq!(summary.inserted, 10);
        assert_eq!(db.device_users().unsynced(100).await.unwrap().len(), 5);
        assert_eq!(db.attendance().count_unsynced().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_refetch_is_idempotent() {
        let (db, terminal) = db_with_terminal().await;
        let device = MockTerminal::with_data("SN100", roster_of_five(), ten_punches());
        let coordinator = FetchCoordinator::new(db.clone(), device);
        let settings = SyncSettings::default();

        coordinator.fetch_terminal(&terminal, &settings).await.unwrap();
        let second = coordinator.fetch_terminal(&terminal, &settings).await.unwrap();

        // Same day re-pull: the window still covers the punches, but
        // nothing new is staged.
        assert_eq!(second.inserted, 0);
        assert_eq!(db.attendance().count_for_terminal(terminal.id).await.unwrap(), 10);
        assert_eq!(db.device_users().count_for_terminal(terminal.id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_window_excludes_old_and_future_punches() {
        let (db, terminal) = db_with_terminal().await;
        let device = MockTerminal::with_data(
            "SN100",
            vec![user(1, "100", "Ada")],
            vec![
                punch_hours_ago("100", 2),
                // Outside the 1-day lookback.
                punch_hours_ago("100", 24 * 40),
                // Device clock ahead of the window's upper bound.
                punch_hours_ago("100", -3),
            ],
        );
        let coordinator = FetchCoordinator::new(db.clone(), device);
        let settings = SyncSettings {
            lookback_days: 1,
            ..SyncSettings::default()
        };

        let summary = coordinator.fetch_terminal(&terminal, &settings).await.unwrap();
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.inserted, 1);
    }

    #[tokio::test]
    async fn test_fetch_records_connection() {
        let (db, terminal) = db_with_terminal().await;
        let device = MockTerminal::with_data("SN42", Vec::new(), Vec::new());
        let coordinator = FetchCoordinator::new(db.clone(), device.clone());

        coordinator
            .fetch_terminal(&terminal, &SyncSettings::default())
            .await
            .unwrap();

        let stored = db.terminals().get(terminal.id).await.unwrap().unwrap();
        assert_eq!(stored.serial_number.as_deref(), Some("SN42"));
        assert!(stored.last_connected.is_some());
        assert_eq!(device.disconnects.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_all_continues_past_unreachable_device() {
        let (db, _) = db_with_terminal().await;
        db.terminals()
            .create(&NewTerminal {
                name: "warehouse".into(),
                ip: "10.0.0.3".into(),
                port: 4370,
                password: None,
                remote_name: None,
            })
            .await
            .unwrap();

        // Both terminals go through the same client; it refuses every
        // connect, so fetch_all must survive both failures.
        let device = MockTerminal::unreachable("SN0");
        let coordinator = FetchCoordinator::new(db.clone(), device);

        let summaries = coordinator.fetch_all(&SyncSettings::default()).await.unwrap();
        assert!(summaries.is_empty());

        let errors: Vec<_> = db
            .operation_logs()
            .recent(20)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.operation == OperationKind::Error)
            .collect();
        assert_eq!(errors.len(), 2);
    }

    #[tokio::test]
    async fn test_connect_timeout_reported_as_connection_error() {
        let (db, terminal) = db_with_terminal().await;
        let device = MockTerminal::slow("SN100", Duration::from_secs(5));
        let coordinator = FetchCoordinator::new(db.clone(), device)
            .with_connect_timeout(Duration::from_millis(50));

        let err = coordinator
            .fetch_terminal(&terminal, &SyncSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_test_connection_logs_and_records() {
        let (db, terminal) = db_with_terminal().await;
        let device = MockTerminal::new("SN7");
        let coordinator = FetchCoordinator::new(db.clone(), device);

        let serial = coordinator.test_connection(&terminal).await.unwrap();
        assert_eq!(serial, "SN7");

        let recent = db.operation_logs().recent(5).await.unwrap();
        assert_eq!(recent[0].operation, OperationKind::TestConnection);

        let stored = db.terminals().get(terminal.id).await.unwrap().unwrap();
        assert_eq!(stored.serial_number.as_deref(), Some("SN7"));
    }

    #[test]
    fn test_truncate_to_midnight() {
        let ts = chrono::NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 30, 45)
            .unwrap();
        let midnight = truncate_to_midnight(ts);
        assert_eq!(midnight.time(), chrono::NaiveTime::MIN);
        assert_eq!(midnight.date(), ts.date());
    }
}
