use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::monitoring::status::{Status, classify};
use crate::plans::PlanTier;

/// Monitor model - a user-registered endpoint probed for availability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub probe_url: String,
    pub plan: PlanTier,
    pub next_check_at: DateTime<Utc>,
    pub alerts_enabled: bool,
}

impl Monitor {
    /// Create a new monitor that is due immediately
    pub fn new(owner_id: Uuid, name: String, probe_url: String, plan: PlanTier) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name,
            probe_url,
            plan,
            next_check_at: Utc::now(),
            alerts_enabled: true,
        }
    }

    pub fn is_https(&self) -> bool {
        self.probe_url.starts_with("https://")
    }

    /// Convert a timestamp to Unix milliseconds for storage
    pub fn timestamp_to_i64(time: DateTime<Utc>) -> i64 {
        time.timestamp_millis()
    }

    /// Unix milliseconds, rounded up so the stored value never precedes `time`
    pub fn timestamp_to_i64_ceil(time: DateTime<Utc>) -> i64 {
        let millis = time.timestamp_millis();
        if time.timestamp_subsec_nanos() % 1_000_000 == 0 { millis } else { millis + 1 }
    }

    /// Convert stored Unix milliseconds back to a timestamp
    pub fn i64_to_timestamp(timestamp: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(timestamp).unwrap_or_default()
    }
}

/// One recorded probe result. The status text is always derived from the
/// code, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: i64,
    pub monitor_id: Uuid,
    pub status_code: u16,
    pub checked_at: DateTime<Utc>,
}

impl Observation {
    pub fn status(&self) -> Status {
        classify(self.status_code)
    }
}

/// Marks that an alert was dispatched for a monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub monitor_id: Uuid,
    pub sent_at: DateTime<Utc>,
}

/// Per-account channel settings, owned by account management
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub owner_id: Uuid,
    pub email: Option<EmailSettings>,
    pub slack: Option<SlackSettings>,
    pub discord: Option<DiscordSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    pub address: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackSettings {
    pub bot_token: String,
    pub channel_id: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordSettings {
    /// Recipient of the bot's direct messages
    pub user_id: String,
    pub enabled: bool,
}

/// Certificate state for an HTTPS monitor. Either every field comes from
/// the same handshake or every field is unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SslState {
    pub expiry_date: Option<DateTime<Utc>>,
    pub days_until_expiry: Option<i64>,
    pub issuer: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl SslState {
    /// State after a failed handshake or parse
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn checked(
        expiry_date: DateTime<Utc>,
        days_until_expiry: i64,
        issuer: String,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            expiry_date: Some(expiry_date),
            days_until_expiry: Some(days_until_expiry),
            issuer: Some(issuer),
            last_checked: Some(checked_at),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.expiry_date.is_none()
            && self.days_until_expiry.is_none()
            && self.issuer.is_none()
            && self.last_checked.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_conversion_keeps_milliseconds() {
        let at = DateTime::from_timestamp(1_700_000_000, 900_000_000).unwrap();
        assert_eq!(Monitor::i64_to_timestamp(Monitor::timestamp_to_i64(at)), at);

        let now = Utc::now();
        let restored = Monitor::i64_to_timestamp(Monitor::timestamp_to_i64(now));
        assert_eq!(restored.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn test_monitor_serializes_with_timestamps() {
        let monitor = Monitor::new(Uuid::new_v4(), "api".into(), "https://a".into(), PlanTier::Pro);
        let json = serde_json::to_string(&monitor).unwrap();
        let restored: Monitor = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.next_check_at, monitor.next_check_at);
        assert_eq!(restored.plan, PlanTier::Pro);
    }

    #[test]
    fn test_ceil_conversion_never_precedes_input() {
        let at = DateTime::from_timestamp(1_700_000_000, 900_000_001).unwrap();
        let stored = Monitor::i64_to_timestamp(Monitor::timestamp_to_i64_ceil(at));
        assert!(stored >= at);
        assert_eq!(stored.timestamp_millis(), 1_700_000_000_901);

        let exact = DateTime::from_timestamp(1_700_000_000, 900_000_000).unwrap();
        assert_eq!(Monitor::timestamp_to_i64_ceil(exact), Monitor::timestamp_to_i64(exact));
    }

    #[test]
    fn test_https_detection() {
        let owner = Uuid::new_v4();
        let https = Monitor::new(owner, "api".into(), "https://example.com/health".into(), PlanTier::Pro);
        let http = Monitor::new(owner, "api".into(), "http://example.com/health".into(), PlanTier::Pro);
        assert!(https.is_https());
        assert!(!http.is_https());
    }

    #[test]
    fn test_unknown_ssl_state() {
        assert!(SslState::unknown().is_unknown());
        let checked = SslState::checked(Utc::now(), 12, "Let's Encrypt".into(), Utc::now());
        assert!(!checked.is_unknown());
    }
}
