use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plans::PlanPolicies;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config file: {0}")]
    ReadFailed(#[source] std::io::Error),
    #[error("failed to write config file: {0}")]
    WriteFailed(#[source] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config directory available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: Engine,
    pub database: DatabaseConfig,
    pub plans: PlanPolicies,
    pub email: Option<SmtpConfig>,
    pub slack: SlackConfig,
    pub discord: DiscordConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Engine {
    pub tick_seconds: u64,
    pub probe_timeout_seconds: u64,
    pub max_in_flight_checks: usize,
    pub alert_cooldown_seconds: i64,
    pub ssl_sweep_hours: u64,
    pub ssl_queue_capacity: usize,
    pub retention_sweep_hours: u64,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            tick_seconds: 30,
            probe_timeout_seconds: 10,
            max_in_flight_checks: 64,
            alert_cooldown_seconds: 300,
            ssl_sweep_hours: 24,
            ssl_queue_capacity: 100,
            retention_sweep_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "statusframe.db".into() }
    }
}

/// SMTP relay used by the email channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    #[serde(default = "default_dashboard_url")]
    pub dashboard_url: String,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_dashboard_url() -> String {
    "https://statusframe.app/dashboard".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub api_base: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self { api_base: "https://slack.com/api".into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub bot_token: Option<String>,
    pub api_base: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self { bot_token: None, api_base: "https://discord.com/api/v10".into() }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/statusframe/engine.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("statusframe/engine.toml"))
}

fn env_value(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() { "<unset>" } else { "********" }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Engine Configuration:")?;
        write_title_1(f, "Engine")?;
        write_1(f, "Tick (s)", &self.engine.tick_seconds)?;
        write_1(f, "Probe timeout (s)", &self.engine.probe_timeout_seconds)?;
        write_1(f, "Max in-flight checks", &self.engine.max_in_flight_checks)?;
        write_1(f, "Alert cooldown (s)", &self.engine.alert_cooldown_seconds)?;
        write_1(f, "SSL sweep (h)", &self.engine.ssl_sweep_hours)?;
        write_1(f, "Retention sweep (h)", &self.engine.retention_sweep_hours)?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path)?;
        write_title_1(f, "Plans")?;
        for (name, plan) in
            [("free", &self.plans.free), ("pro", &self.plans.pro), ("business", &self.plans.business)]
        {
            let summary = format!(
                "every {}s, keep {}d, email={}, chat={}",
                plan.check_interval_seconds, plan.retention_days, plan.email_alerts, plan.chat_alerts
            );
            write_1(f, name, &summary)?;
        }
        write_title_1(f, "Notifications")?;
        match &self.email {
            Some(smtp) => {
                let summary = format!("{}:{} as {} ({})", smtp.host, smtp.port, smtp.from, redact(&smtp.password));
                write_1(f, "Email", &summary)?;
            }
            None => write_1(f, "Email", &"disabled")?,
        }
        write_1(f, "Slack API", &self.slack.api_base)?;
        write_1(
            f,
            "Discord bot token",
            &redact(self.discord.bot_token.as_deref().unwrap_or_default()),
        )?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/statusframe/engine.toml
    ///  or the specified path if one does not exist
    ///
    /// ```no_run
    /// use statusframe_engine::config::Config;
    ///
    /// let cfg = Config::from_config(None::<&std::path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), statusframe_engine::config::Error>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(Error::ReadFailed)?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::WriteFailed)?;
        }

        std::fs::write(path, config_str).map_err(Error::WriteFailed)
    }

    /// Apply secrets and overrides from the process environment
    pub fn apply_env(&mut self) {
        if let Some(path) = env_value("STATUSFRAME_DATABASE") {
            self.database.path = path;
        }

        if let Some(token) = env_value("DISCORD_BOT_TOKEN") {
            self.discord.bot_token = Some(token);
        }

        if let (Some(host), Some(username), Some(password), Some(from)) = (
            env_value("SMTP_HOST"),
            env_value("SMTP_USERNAME"),
            env_value("SMTP_PASSWORD"),
            env_value("SMTP_FROM"),
        ) {
            let port = env_value("SMTP_PORT").and_then(|p| p.parse().ok()).unwrap_or(default_smtp_port());
            let dashboard_url = self
                .email
                .as_ref()
                .map(|smtp| smtp.dashboard_url.clone())
                .unwrap_or_else(default_dashboard_url);
            self.email = Some(SmtpConfig { host, port, username, password, from, dashboard_url });
        }
    }
}
