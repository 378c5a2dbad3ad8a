use anyhow::Result;
use libsql::Connection;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 3;

/// Run database migrations
///
/// Account management owns the monitor and notification rows but the engine
/// owns the schema they live in.
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    // Create schema_migrations table first (tracks applied migrations)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Initial schema").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "Add SSL certificate state to monitors").await?;
    }

    if current_version < 3 {
        run_migration_v3(conn).await?;
        record_migration(conn, 3, "Store timestamps as Unix milliseconds").await?;
    }

    tracing::info!("Database migrations completed successfully (now at version {})", SCHEMA_VERSION);
    Ok(())
}

/// Get current schema version from database
async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

/// Record that a migration was applied
async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp();

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Monitors, observations, alert records and notification settings
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS monitors (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            name TEXT NOT NULL,
            probe_url TEXT NOT NULL DEFAULT '',
            plan TEXT NOT NULL DEFAULT 'free',
            next_check_at INTEGER NOT NULL,
            alerts_enabled INTEGER NOT NULL DEFAULT 1
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_monitors_next_check ON monitors(next_check_at)",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS observations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            monitor_id TEXT NOT NULL,
            status_code INTEGER NOT NULL,
            checked_at INTEGER NOT NULL,
            FOREIGN KEY (monitor_id) REFERENCES monitors(id) ON DELETE CASCADE
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_observations_monitor ON observations(monitor_id, id)",
        (),
    )
    .await?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_observations_checked_at ON observations(checked_at)",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS alert_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            monitor_id TEXT NOT NULL,
            sent_at INTEGER NOT NULL,
            FOREIGN KEY (monitor_id) REFERENCES monitors(id) ON DELETE CASCADE
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_alert_records_monitor ON alert_records(monitor_id, sent_at)",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notification_settings (
            owner_id TEXT PRIMARY KEY,
            email_address TEXT,
            email_enabled INTEGER NOT NULL DEFAULT 0,
            slack_bot_token TEXT,
            slack_channel_id TEXT,
            slack_enabled INTEGER NOT NULL DEFAULT 0,
            discord_user_id TEXT,
            discord_enabled INTEGER NOT NULL DEFAULT 0
        )",
        (),
    )
    .await?;

    Ok(())
}

async fn run_migration_v2(conn: &Connection) -> Result<()> {
    for column in [
        "ssl_expiry_date INTEGER",
        "ssl_days_until_expiry INTEGER",
        "ssl_issuer TEXT",
        "ssl_last_checked INTEGER",
    ] {
        conn.execute(&format!("ALTER TABLE monitors ADD COLUMN {column}"), ()).await?;
    }

    Ok(())
}

/// Seconds to milliseconds for every stored timestamp
async fn run_migration_v3(conn: &Connection) -> Result<()> {
    for statement in [
        "UPDATE monitors SET next_check_at = next_check_at * 1000,
            ssl_expiry_date = ssl_expiry_date * 1000,
            ssl_last_checked = ssl_last_checked * 1000",
        "UPDATE observations SET checked_at = checked_at * 1000",
        "UPDATE alert_records SET sent_at = sent_at * 1000",
    ] {
        conn.execute(statement, ()).await?;
    }

    Ok(())
}
