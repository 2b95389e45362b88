//! # Settings Repository
//!
//! Key-value persistence for [`SyncSettings`] and [`BackendConfig`].
//!
//! Settings are written by the configuration surface and re-read by the
//! scheduler at the start of every cycle; a change takes effect on the
//! following cycle without a restart. Missing keys fall back to defaults
//! so a fresh store behaves sensibly before anything is configured.

use sqlx::SqlitePool;
use tracing::warn;

use crate::error::DbResult;
use zkbridge_core::{BackendConfig, SyncSettings};

// Settings keys.
const KEY_LOOKBACK_DAYS: &str = "lookback_days";
const KEY_BATCH_SIZE: &str = "batch_size";
const KEY_LOG_RETENTION_DAYS: &str = "log_retention_days";
const KEY_ATTENDANCE_RETENTION_DAYS: &str = "attendance_retention_days";
const KEY_INTERVAL_MINUTES: &str = "interval_minutes";
const KEY_AUTO_SYNC: &str = "auto_sync";

// Backend config keys.
const KEY_URL: &str = "url";
const KEY_DB: &str = "db";
const KEY_USERNAME: &str = "username";
const KEY_PASSWORD: &str = "password";

/// Repository for sync settings and backend connection details.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    /// Creates a new SettingsRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    /// Loads sync settings; missing or unparseable values fall back to
    /// their defaults.
    pub async fn load(&self) -> DbResult<SyncSettings> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM settings")
                .fetch_all(&self.pool)
                .await?;

        let mut settings = SyncSettings::default();
        for (key, value) in rows {
            match key.as_str() {
                KEY_LOOKBACK_DAYS => parse_into(&mut settings.lookback_days, &key, &value),
                KEY_BATCH_SIZE => parse_into(&mut settings.batch_size, &key, &value),
                KEY_LOG_RETENTION_DAYS => {
                    parse_into(&mut settings.log_retention_days, &key, &value)
                }
                KEY_ATTENDANCE_RETENTION_DAYS => {
                    parse_into(&mut settings.attendance_retention_days, &key, &value)
                }
                KEY_INTERVAL_MINUTES => parse_into(&mut settings.interval_minutes, &key, &value),
                KEY_AUTO_SYNC => match value.as_str() {
                    "true" | "1" => settings.auto_sync = true,
                    "false" | "0" => settings.auto_sync = false,
                    other => warn!(key = KEY_AUTO_SYNC, value = other, "Ignoring bad setting"),
                },
                _ => {}
            }
        }

        Ok(settings)
    }

    /// Persists sync settings as one transaction.
    pub async fn save(&self, settings: &SyncSettings) -> DbResult<()> {
        let pairs = [
            (KEY_LOOKBACK_DAYS, settings.lookback_days.to_string()),
            (KEY_BATCH_SIZE, settings.batch_size.to_string()),
            (KEY_LOG_RETENTION_DAYS, settings.log_retention_days.to_string()),
            (
                KEY_ATTENDANCE_RETENTION_DAYS,
                settings.attendance_retention_days.to_string(),
            ),
            (KEY_INTERVAL_MINUTES, settings.interval_minutes.to_string()),
            (KEY_AUTO_SYNC, settings.auto_sync.to_string()),
        ];

        let mut tx = self.pool.begin().await?;
        for (key, value) in pairs {
            sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    /// Loads backend connection details; missing keys come back empty.
    pub async fn load_backend_config(&self) -> DbResult<BackendConfig> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM backend_config")
                .fetch_all(&self.pool)
                .await?;

        let mut config = BackendConfig::default();
        for (key, value) in rows {
            match key.as_str() {
                KEY_URL => config.url = value,
                KEY_DB => config.db = value,
                KEY_USERNAME => config.username = value,
                KEY_PASSWORD => config.password = value,
                _ => {}
            }
        }

        Ok(config)
    }

    /// Persists backend connection details as one transaction.
    pub async fn save_backend_config(&self, config: &BackendConfig) -> DbResult<()> {
        let pairs = [
            (KEY_URL, config.url.as_str()),
            (KEY_DB, config.db.as_str()),
            (KEY_USERNAME, config.username.as_str()),
            (KEY_PASSWORD, config.password.as_str()),
        ];

        let mut tx = self.pool.begin().await?;
        for (key, value) in pairs {
            sqlx::query("INSERT OR REPLACE INTO backend_config (key, value) VALUES (?1, ?2)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }
}

fn parse_into(slot: &mut u32, key: &str, value: &str) {
    match value.parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(key, value, "Ignoring bad setting"),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use zkbridge_core::{BackendConfig, SyncSettings};

    #[tokio::test]
    async fn test_fresh_store_yields_defaults() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let settings = db.settings().load().await.unwrap();
        assert_eq!(settings, SyncSettings::default());
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let settings = SyncSettings {
            lookback_days: 60,
            batch_size: 50,
            log_retention_days: 5,
            attendance_retention_days: 360,
            interval_minutes: 30,
            auto_sync: false,
        };

        db.settings().save(&settings).await.unwrap();
        assert_eq!(db.settings().load().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_bad_value_falls_back_to_default() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sqlx::query("INSERT INTO settings (key, value) VALUES ('batch_size', 'lots')")
            .execute(db.pool())
            .await
            .unwrap();

        let settings = db.settings().load().await.unwrap();
        assert_eq!(settings.batch_size, SyncSettings::default().batch_size);
    }

    #[tokio::test]
    async fn test_backend_config_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let config = BackendConfig {
            url: "https://hr.example.com".into(),
            db: "prod".into(),
            username: "bridge".into(),
            password: "secret".into(),
        };

        db.settings().save_backend_config(&config).await.unwrap();
        let loaded = db.settings().load_backend_config().await.unwrap();
        assert_eq!(loaded.url, config.url);
        assert!(loaded.is_complete());
    }
}
