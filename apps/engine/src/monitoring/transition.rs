//! State transition detection between two consecutive observations.

use serde::{Deserialize, Serialize};

use super::status::Status;

/// Alert-worthiness of a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Incident,
    Degraded,
    Recovery,
    None,
}

impl Transition {
    pub fn is_alert(&self) -> bool {
        !matches!(self, Transition::None)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Incident => "incident",
            Transition::Degraded => "degraded",
            Transition::Recovery => "recovery",
            Transition::None => "none",
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify the move from `previous` (absent for a monitor's first
/// observation) to `current`.
///
/// A failing monitor stays `Incident` on every check so an ongoing outage
/// keeps re-alerting once the cooldown lapses. Degraded alerts fire only on
/// entry into the degraded class, recoveries only when leaving a failing or
/// degraded state.
pub fn detect(previous: Option<Status>, current: Status) -> Transition {
    if current.is_incident() {
        return Transition::Incident;
    }

    if current.is_degraded() {
        return match previous {
            Some(prev) if prev.is_degraded() => Transition::None,
            _ => Transition::Degraded,
        };
    }

    match previous {
        Some(prev) if prev.is_incident() || prev.is_degraded() => Transition::Recovery,
        _ => Transition::None,
    }
}
