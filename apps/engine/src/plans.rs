//! Subscription tiers and the policy data attached to each of them.
//!
//! Check cadence, retention horizon and channel entitlements are all data
//! here so the engine never branches on plan names itself.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::alerting::Channel;

/// Plan tier of a monitor's owning account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Pro,
    Business,
}

impl PlanTier {
    pub const ALL: [PlanTier; 3] = [PlanTier::Free, PlanTier::Pro, PlanTier::Business];

    /// Parse a stored plan name. Unknown names are treated as `free`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "pro" => PlanTier::Pro,
            "business" => PlanTier::Business,
            _ => PlanTier::Free,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Business => "business",
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits and entitlements for a single tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPolicy {
    pub check_interval_seconds: u64,
    pub retention_days: i64,
    pub email_alerts: bool,
    /// Slack and Discord delivery
    pub chat_alerts: bool,
}

impl PlanPolicy {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    /// Whether this tier may receive alerts on `channel`
    pub fn allows(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.email_alerts,
            Channel::Slack | Channel::Discord => self.chat_alerts,
        }
    }
}

/// Policy table for every tier. Tiers missing from a config file keep
/// their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanPolicies {
    pub free: PlanPolicy,
    pub pro: PlanPolicy,
    pub business: PlanPolicy,
}

impl Default for PlanPolicies {
    fn default() -> Self {
        Self {
            free: PlanPolicy {
                check_interval_seconds: 300,
                retention_days: 7,
                email_alerts: true,
                chat_alerts: false,
            },
            pro: PlanPolicy {
                check_interval_seconds: 60,
                retention_days: 30,
                email_alerts: true,
                chat_alerts: true,
            },
            business: PlanPolicy {
                check_interval_seconds: 30,
                retention_days: 90,
                email_alerts: true,
                chat_alerts: true,
            },
        }
    }
}

impl PlanPolicies {
    pub fn policy(&self, plan: PlanTier) -> &PlanPolicy {
        match plan {
            PlanTier::Free => &self.free,
            PlanTier::Pro => &self.pro,
            PlanTier::Business => &self.business,
        }
    }

    pub fn check_interval(&self, plan: PlanTier) -> Duration {
        self.policy(plan).check_interval()
    }
}
