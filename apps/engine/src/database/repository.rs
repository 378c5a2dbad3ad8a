use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, params};
use uuid::Uuid;

use super::models::{
    AlertRecord, DiscordSettings, EmailSettings, Monitor, NotificationSettings, Observation,
    SlackSettings, SslState,
};
use crate::plans::PlanTier;
use crate::pool::LibsqlPool;

const MONITOR_COLUMNS: &str =
    "id, owner_id, name, probe_url, plan, next_check_at, alerts_enabled";

/// Read/write contract between the engine and persistence.
///
/// Every method is independent; nothing here spans a transaction.
#[async_trait]
pub trait Database: Send + Sync {
    /// Monitors with a non-empty probe URL whose `next_check_at` is not after `now`
    async fn fetch_due_monitors(&self, now: DateTime<Utc>) -> Result<Vec<Monitor>>;

    /// Most recent observation for a monitor, if any
    async fn previous_observation(&self, monitor_id: Uuid) -> Result<Option<Observation>>;

    /// Append an observation
    async fn insert_observation(
        &self,
        monitor_id: Uuid,
        status_code: u16,
        checked_at: DateTime<Utc>,
    ) -> Result<i64>;

    /// Move `next_check_at` forward. Returns false when the stored value is
    /// already at or past `next_check_at`; it never moves backwards.
    async fn advance_schedule(&self, monitor_id: Uuid, next_check_at: DateTime<Utc>) -> Result<bool>;

    /// Time of the most recent alert for a monitor
    async fn last_alert(&self, monitor_id: Uuid) -> Result<Option<DateTime<Utc>>>;

    /// Append an alert record
    async fn insert_alert_record(&self, monitor_id: Uuid, sent_at: DateTime<Utc>) -> Result<()>;

    /// Channel settings for an account
    async fn notification_settings(&self, owner_id: Uuid) -> Result<Option<NotificationSettings>>;

    /// Overwrite the certificate state of a monitor
    async fn update_ssl_state(&self, monitor_id: Uuid, state: &SslState) -> Result<()>;

    /// Delete observations checked before `cutoff` for monitors on `plan`.
    /// Returns the number of rows removed.
    async fn delete_observations_older_than(
        &self,
        plan: PlanTier,
        cutoff: DateTime<Utc>,
    ) -> Result<u64>;

    /// All monitors probed over HTTPS
    async fn https_monitors(&self) -> Result<Vec<Monitor>>;

    async fn monitor_by_id(&self, monitor_id: Uuid) -> Result<Option<Monitor>>;

    async fn ssl_state(&self, monitor_id: Uuid) -> Result<Option<SslState>>;

    /// Observations for a monitor, oldest first
    async fn observations(&self, monitor_id: Uuid) -> Result<Vec<Observation>>;

    /// Alert records for a monitor, oldest first
    async fn alert_records(&self, monitor_id: Uuid) -> Result<Vec<AlertRecord>>;

    /// Insert or update a monitor (account management, seeding)
    async fn save_monitor(&self, monitor: &Monitor) -> Result<()>;

    /// Insert or replace an account's channel settings (account management, seeding)
    async fn save_notification_settings(&self, settings: &NotificationSettings) -> Result<()>;
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<crate::pool::LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    async fn query_monitors(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<Monitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params).await?;
        let mut monitors = Vec::new();

        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }

        Ok(monitors)
    }
}

fn monitor_from_row(row: &Row) -> Result<Monitor> {
    let id: String = row.get(0)?;
    let owner_id: String = row.get(1)?;
    let plan: String = row.get(4)?;

    Ok(Monitor {
        id: Uuid::parse_str(&id)?,
        owner_id: Uuid::parse_str(&owner_id)?,
        name: row.get(2)?,
        probe_url: row.get(3)?,
        plan: PlanTier::from_name(&plan),
        next_check_at: Monitor::i64_to_timestamp(row.get(5)?),
        alerts_enabled: row.get::<i64>(6)? != 0,
    })
}

fn observation_from_row(row: &Row) -> Result<Observation> {
    let monitor_id: String = row.get(1)?;

    Ok(Observation {
        id: row.get(0)?,
        monitor_id: Uuid::parse_str(&monitor_id)?,
        status_code: u16::try_from(row.get::<i64>(2)?).unwrap_or(0),
        checked_at: Monitor::i64_to_timestamp(row.get(3)?),
    })
}

fn enabled_flag(enabled: bool) -> i64 {
    if enabled { 1 } else { 0 }
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn fetch_due_monitors(&self, now: DateTime<Utc>) -> Result<Vec<Monitor>> {
        let sql = format!(
            "SELECT {MONITOR_COLUMNS} FROM monitors WHERE probe_url != '' AND next_check_at <= ? ORDER BY next_check_at"
        );
        self.query_monitors(&sql, params![Monitor::timestamp_to_i64(now)]).await
    }

    async fn previous_observation(&self, monitor_id: Uuid) -> Result<Option<Observation>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, monitor_id, status_code, checked_at FROM observations WHERE monitor_id = ? ORDER BY id DESC LIMIT 1",
                params![monitor_id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(observation_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_observation(
        &self,
        monitor_id: Uuid,
        status_code: u16,
        checked_at: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO observations (monitor_id, status_code, checked_at) VALUES (?, ?, ?)",
            params![monitor_id.to_string(), status_code as i64, Monitor::timestamp_to_i64(checked_at)],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn advance_schedule(&self, monitor_id: Uuid, next_check_at: DateTime<Utc>) -> Result<bool> {
        let conn = self.get_conn().await?;
        let changed = conn
            .execute(
                "UPDATE monitors SET next_check_at = ?1 WHERE id = ?2 AND next_check_at < ?1",
                params![Monitor::timestamp_to_i64_ceil(next_check_at), monitor_id.to_string()],
            )
            .await?;

        Ok(changed > 0)
    }

    async fn last_alert(&self, monitor_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT MAX(sent_at) FROM alert_records WHERE monitor_id = ?",
                params![monitor_id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<Option<i64>>(0)?.map(Monitor::i64_to_timestamp)),
            None => Ok(None),
        }
    }

    async fn insert_alert_record(&self, monitor_id: Uuid, sent_at: DateTime<Utc>) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO alert_records (monitor_id, sent_at) VALUES (?, ?)",
            params![monitor_id.to_string(), Monitor::timestamp_to_i64_ceil(sent_at)],
        )
        .await?;
        Ok(())
    }

    async fn notification_settings(&self, owner_id: Uuid) -> Result<Option<NotificationSettings>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT email_address, email_enabled, slack_bot_token, slack_channel_id, slack_enabled, discord_user_id, discord_enabled
                 FROM notification_settings WHERE owner_id = ?",
                params![owner_id.to_string()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let email = match row.get::<Option<String>>(0)? {
            Some(address) => Some(EmailSettings { address, enabled: row.get::<i64>(1)? != 0 }),
            None => None,
        };

        let slack = match (row.get::<Option<String>>(2)?, row.get::<Option<String>>(3)?) {
            (Some(bot_token), Some(channel_id)) => Some(SlackSettings {
                bot_token,
                channel_id,
                enabled: row.get::<i64>(4)? != 0,
            }),
            _ => None,
        };

        let discord = match row.get::<Option<String>>(5)? {
            Some(user_id) => Some(DiscordSettings { user_id, enabled: row.get::<i64>(6)? != 0 }),
            None => None,
        };

        Ok(Some(NotificationSettings { owner_id, email, slack, discord }))
    }

    async fn update_ssl_state(&self, monitor_id: Uuid, state: &SslState) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE monitors SET ssl_expiry_date = ?, ssl_days_until_expiry = ?, ssl_issuer = ?, ssl_last_checked = ? WHERE id = ?",
            params![
                state.expiry_date.map(Monitor::timestamp_to_i64),
                state.days_until_expiry,
                state.issuer.clone(),
                state.last_checked.map(Monitor::timestamp_to_i64),
                monitor_id.to_string()
            ],
        )
        .await?;
        Ok(())
    }

    async fn delete_observations_older_than(
        &self,
        plan: PlanTier,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let conn = self.get_conn().await?;
        let cutoff = Monitor::timestamp_to_i64(cutoff);

        // Unrecognised plan names are billed as free, so they age out with it
        let deleted = match plan {
            PlanTier::Free => {
                conn.execute(
                    "DELETE FROM observations WHERE checked_at < ? AND monitor_id IN (
                        SELECT id FROM monitors WHERE lower(trim(plan)) NOT IN ('pro', 'business')
                    )",
                    params![cutoff],
                )
                .await?
            }
            other => {
                conn.execute(
                    "DELETE FROM observations WHERE checked_at < ? AND monitor_id IN (
                        SELECT id FROM monitors WHERE lower(trim(plan)) = ?
                    )",
                    params![cutoff, other.as_str()],
                )
                .await?
            }
        };

        Ok(deleted)
    }

    async fn https_monitors(&self) -> Result<Vec<Monitor>> {
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE probe_url LIKE 'https://%'");
        self.query_monitors(&sql, ()).await
    }

    async fn monitor_by_id(&self, monitor_id: Uuid) -> Result<Option<Monitor>> {
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?");
        Ok(self.query_monitors(&sql, params![monitor_id.to_string()]).await?.into_iter().next())
    }

    async fn ssl_state(&self, monitor_id: Uuid) -> Result<Option<SslState>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT ssl_expiry_date, ssl_days_until_expiry, ssl_issuer, ssl_last_checked FROM monitors WHERE id = ?",
                params![monitor_id.to_string()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        Ok(Some(SslState {
            expiry_date: row.get::<Option<i64>>(0)?.map(Monitor::i64_to_timestamp),
            days_until_expiry: row.get(1)?,
            issuer: row.get(2)?,
            last_checked: row.get::<Option<i64>>(3)?.map(Monitor::i64_to_timestamp),
        }))
    }

    async fn observations(&self, monitor_id: Uuid) -> Result<Vec<Observation>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, monitor_id, status_code, checked_at FROM observations WHERE monitor_id = ? ORDER BY id",
                params![monitor_id.to_string()],
            )
            .await?;

        let mut observations = Vec::new();
        while let Some(row) = rows.next().await? {
            observations.push(observation_from_row(&row)?);
        }
        Ok(observations)
    }

    async fn alert_records(&self, monitor_id: Uuid) -> Result<Vec<AlertRecord>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT sent_at FROM alert_records WHERE monitor_id = ? ORDER BY id",
                params![monitor_id.to_string()],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(AlertRecord { monitor_id, sent_at: Monitor::i64_to_timestamp(row.get(0)?) });
        }
        Ok(records)
    }

    async fn save_monitor(&self, monitor: &Monitor) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO monitors (id, owner_id, name, probe_url, plan, next_check_at, alerts_enabled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                owner_id = ?2, name = ?3, probe_url = ?4, plan = ?5, next_check_at = ?6, alerts_enabled = ?7",
            params![
                monitor.id.to_string(),
                monitor.owner_id.to_string(),
                monitor.name.clone(),
                monitor.probe_url.clone(),
                monitor.plan.as_str(),
                Monitor::timestamp_to_i64(monitor.next_check_at),
                enabled_flag(monitor.alerts_enabled)
            ],
        )
        .await?;
        Ok(())
    }

    async fn save_notification_settings(&self, settings: &NotificationSettings) -> Result<()> {
        let conn = self.get_conn().await?;
        let email = settings.email.as_ref();
        let slack = settings.slack.as_ref();
        let discord = settings.discord.as_ref();

        conn.execute(
            "INSERT OR REPLACE INTO notification_settings
                (owner_id, email_address, email_enabled, slack_bot_token, slack_channel_id, slack_enabled, discord_user_id, discord_enabled)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                settings.owner_id.to_string(),
                email.map(|e| e.address.clone()),
                enabled_flag(email.is_some_and(|e| e.enabled)),
                slack.map(|s| s.bot_token.clone()),
                slack.map(|s| s.channel_id.clone()),
                enabled_flag(slack.is_some_and(|s| s.enabled)),
                discord.map(|d| d.user_id.clone()),
                enabled_flag(discord.is_some_and(|d| d.enabled))
            ],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pool::open_local;
    use chrono::Duration;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Helper to create a migrated test database. Keep the `TempDir` alive
    /// for as long as the database is used.
    pub(crate) async fn create_test_database() -> Result<(Arc<DatabaseImpl>, TempDir)> {
        let temp_dir = tempfile::tempdir()?;
        let db_path = temp_dir.path().join("test.db");

        let pool: LibsqlPool = open_local(db_path.to_string_lossy().as_ref(), 8).await?;

        let conn = pool.get().await?;
        crate::database::initialize_database(&conn).await?;
        drop(conn);

        Ok((Arc::new(DatabaseImpl::new_from_pool(pool)), temp_dir))
    }

    fn monitor(url: &str, plan: PlanTier, next_check_at: DateTime<Utc>) -> Monitor {
        let mut monitor = Monitor::new(Uuid::new_v4(), "api".into(), url.into(), plan);
        monitor.next_check_at = next_check_at;
        monitor
    }

    #[tokio::test]
    async fn test_fetch_due_monitors_skips_future_and_empty_urls() -> Result<()> {
        let (database, _dir) = create_test_database().await?;
        let now = Utc::now();

        let due = monitor("https://due.example.com", PlanTier::Pro, now - Duration::seconds(5));
        let later = monitor("https://later.example.com", PlanTier::Pro, now + Duration::seconds(60));
        let no_url = monitor("", PlanTier::Pro, now - Duration::seconds(5));
        for m in [&due, &later, &no_url] {
            database.save_monitor(m).await?;
        }

        let fetched = database.fetch_due_monitors(now).await?;
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id, due.id);
        assert_eq!(fetched[0].plan, PlanTier::Pro);
        Ok(())
    }

    #[tokio::test]
    async fn test_advance_schedule_never_moves_backwards() -> Result<()> {
        let (database, _dir) = create_test_database().await?;
        let now = Utc::now();
        let m = monitor("https://example.com", PlanTier::Free, now);
        database.save_monitor(&m).await?;

        assert!(database.advance_schedule(m.id, now + Duration::seconds(300)).await?);
        assert!(!database.advance_schedule(m.id, now + Duration::seconds(60)).await?);

        let stored = database.monitor_by_id(m.id).await?.unwrap();
        assert!(stored.next_check_at >= now + Duration::seconds(300));
        assert!(stored.next_check_at - (now + Duration::seconds(300)) < Duration::milliseconds(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_schedule_keeps_sub_second_precision() -> Result<()> {
        let (database, _dir) = create_test_database().await?;
        let started = DateTime::from_timestamp(1_700_000_000, 900_000_000).unwrap();
        let m = monitor("https://example.com", PlanTier::Pro, started);
        database.save_monitor(&m).await?;

        let next = started + Duration::seconds(60);
        assert!(database.advance_schedule(m.id, next).await?);

        let stored = database.monitor_by_id(m.id).await?.unwrap();
        assert_eq!(stored.next_check_at, next);
        Ok(())
    }

    #[tokio::test]
    async fn test_previous_observation_is_latest_insert() -> Result<()> {
        let (database, _dir) = create_test_database().await?;
        let m = monitor("https://example.com", PlanTier::Free, Utc::now());
        database.save_monitor(&m).await?;

        assert!(database.previous_observation(m.id).await?.is_none());

        let now = Utc::now();
        database.insert_observation(m.id, 200, now).await?;
        database.insert_observation(m.id, 503, now).await?;

        let previous = database.previous_observation(m.id).await?.unwrap();
        assert_eq!(previous.status_code, 503);
        assert_eq!(database.observations(m.id).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_last_alert() -> Result<()> {
        let (database, _dir) = create_test_database().await?;
        let m = monitor("https://example.com", PlanTier::Free, Utc::now());
        database.save_monitor(&m).await?;

        assert!(database.last_alert(m.id).await?.is_none());

        let earlier = Utc::now() - Duration::minutes(30);
        let later = Utc::now();
        database.insert_alert_record(m.id, later).await?;
        database.insert_alert_record(m.id, earlier).await?;

        let last = database.last_alert(m.id).await?.unwrap();
        assert!(last >= later);
        assert!(last - later < Duration::milliseconds(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_notification_settings_roundtrip() -> Result<()> {
        let (database, _dir) = create_test_database().await?;
        let owner_id = Uuid::new_v4();

        assert!(database.notification_settings(owner_id).await?.is_none());

        database
            .save_notification_settings(&NotificationSettings {
                owner_id,
                email: Some(EmailSettings { address: "ops@example.com".into(), enabled: true }),
                slack: None,
                discord: Some(DiscordSettings { user_id: "1234".into(), enabled: false }),
            })
            .await?;

        let settings = database.notification_settings(owner_id).await?.unwrap();
        assert_eq!(settings.email.as_ref().map(|e| e.enabled), Some(true));
        assert!(settings.slack.is_none());
        assert_eq!(settings.discord.as_ref().map(|d| d.enabled), Some(false));
        Ok(())
    }

    #[tokio::test]
    async fn test_ssl_state_is_cleared_as_a_whole() -> Result<()> {
        let (database, _dir) = create_test_database().await?;
        let m = monitor("https://example.com", PlanTier::Pro, Utc::now());
        database.save_monitor(&m).await?;

        let now = Utc::now();
        let checked = SslState::checked(now + Duration::days(40), 40, "R11".into(), now);
        database.update_ssl_state(m.id, &checked).await?;
        let stored = database.ssl_state(m.id).await?.unwrap();
        assert_eq!(stored.days_until_expiry, Some(40));
        assert_eq!(stored.issuer.as_deref(), Some("R11"));

        database.update_ssl_state(m.id, &SslState::unknown()).await?;
        assert!(database.ssl_state(m.id).await?.unwrap().is_unknown());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_observations_by_plan() -> Result<()> {
        let (database, _dir) = create_test_database().await?;
        let now = Utc::now();
        let free = monitor("https://free.example.com", PlanTier::Free, now);
        let pro = monitor("https://pro.example.com", PlanTier::Pro, now);
        database.save_monitor(&free).await?;
        database.save_monitor(&pro).await?;

        let old = now - Duration::days(10);
        database.insert_observation(free.id, 200, old).await?;
        database.insert_observation(free.id, 200, now).await?;
        database.insert_observation(pro.id, 200, old).await?;

        let deleted = database.delete_observations_older_than(PlanTier::Free, now - Duration::days(7)).await?;
        assert_eq!(deleted, 1);
        assert_eq!(database.observations(free.id).await?.len(), 1);
        assert_eq!(database.observations(pro.id).await?.len(), 1);
        Ok(())
    }
}
