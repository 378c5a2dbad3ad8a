use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::database::models::Monitor;
use crate::monitoring::status::{Status, classify};
use crate::monitoring::transition::Transition;
use crate::plans::PlanTier;

/// Kind of alert, one per alert-worthy transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Incident,
    Degraded,
    Recovery,
}

impl AlertKind {
    pub fn from_transition(transition: Transition) -> Option<Self> {
        match transition {
            Transition::Incident => Some(AlertKind::Incident),
            Transition::Degraded => Some(AlertKind::Degraded),
            Transition::Recovery => Some(AlertKind::Recovery),
            Transition::None => None,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            AlertKind::Incident => "🔴",
            AlertKind::Degraded => "🟡",
            AlertKind::Recovery => "🟢",
        }
    }

    /// Attachment colour for chat messages
    pub fn chat_color(&self) -> &'static str {
        match self {
            AlertKind::Incident => "#ff0000",
            AlertKind::Degraded => "#ffaa00",
            AlertKind::Recovery => "#36a64f",
        }
    }

    /// Accent colour for HTML email
    pub fn accent_color(&self) -> &'static str {
        match self {
            AlertKind::Incident => "#dc2626",
            AlertKind::Degraded => "#f59e0b",
            AlertKind::Recovery => "#16a34a",
        }
    }
}

/// Everything a notifier needs to render one alert
#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub monitor_id: Uuid,
    pub monitor_name: String,
    pub probe_url: String,
    pub plan: PlanTier,
    pub kind: AlertKind,
    pub status_code: u16,
    pub occurred_at: DateTime<Utc>,
}

impl AlertEvent {
    /// Returns `None` for transitions that are not alert-worthy
    pub fn new(
        monitor: &Monitor,
        transition: Transition,
        status_code: u16,
        occurred_at: DateTime<Utc>,
    ) -> Option<Self> {
        let kind = AlertKind::from_transition(transition)?;
        Some(Self {
            monitor_id: monitor.id,
            monitor_name: monitor.name.clone(),
            probe_url: monitor.probe_url.clone(),
            plan: monitor.plan,
            kind,
            status_code,
            occurred_at,
        })
    }

    pub fn status(&self) -> Status {
        classify(self.status_code)
    }

    /// e.g. "api is Down"
    pub fn title(&self) -> String {
        match self.kind {
            AlertKind::Incident => format!("{} is Down", self.monitor_name),
            AlertKind::Degraded => format!("{} is Degraded", self.monitor_name),
            AlertKind::Recovery => format!("{} is back Up", self.monitor_name),
        }
    }

    pub fn subject(&self) -> String {
        let prefix = match self.kind {
            AlertKind::Incident => "Alert",
            AlertKind::Degraded => "Warning",
            AlertKind::Recovery => "Resolved",
        };
        format!("{} {}: {}", self.kind.emoji(), prefix, self.title())
    }

    pub fn headline(&self) -> &'static str {
        match self.kind {
            AlertKind::Incident => "Service Down Detected",
            AlertKind::Degraded => "Service Degraded",
            AlertKind::Recovery => "Service Recovered",
        }
    }

    /// "503 (down)", or "no response" when nothing came back
    pub fn status_code_text(&self) -> String {
        if self.status_code == 0 {
            "no response".to_string()
        } else {
            format!("{} ({})", self.status_code, self.status())
        }
    }

    pub fn detail(&self) -> String {
        match (self.kind, self.status_code) {
            (AlertKind::Recovery, code) => {
                format!("Service is responding normally again with HTTP {code}")
            }
            (_, 0) => "Connection failed - service is unreachable".to_string(),
            (_, code) => format!("Service returned HTTP {} ({})", code, self.status()),
        }
    }

    pub fn timestamp_text(&self) -> String {
        self.occurred_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    }

    /// Plain text rendering shared by the text email part
    pub fn text_body(&self) -> String {
        format!(
            "{subject}\n\n\
             Service: {name}\n\
             URL: {url}\n\
             Plan: {plan}\n\
             Status: {status}\n\
             Details: {detail}\n\
             Time: {time}\n",
            subject = self.subject(),
            name = self.monitor_name,
            url = self.probe_url,
            plan = self.plan,
            status = self.status_code_text(),
            detail = self.detail(),
            time = self.timestamp_text(),
        )
    }
}
