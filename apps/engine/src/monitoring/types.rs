use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::status::{Status, classify};
use super::transition::Transition;
use crate::alerting::DispatchOutcome;

/// Result of a monitoring check
#[derive(Debug)]
pub struct CheckResult {
    /// UUID of the monitor that was checked
    pub monitor_id: Uuid,

    /// URL that was probed
    pub target: String,

    /// When the probe completed
    pub checked_at: DateTime<Utc>,

    /// Classified status of the check
    pub status: Status,

    /// HTTP status code, `0` when no response was received
    pub status_code: u16,

    /// Response time in milliseconds
    pub latency_ms: Option<u64>,

    /// Error message (if the request failed)
    pub error_message: Option<String>,

    /// Transition against the previous observation
    pub transition: Transition,

    /// Next scheduled check time that was written back
    pub next_check_at: Option<DateTime<Utc>>,

    /// What the alert dispatcher did, if it was invoked
    pub dispatch: Option<DispatchOutcome>,
}

impl CheckResult {
    /// Create a new check result
    pub fn new(monitor_id: Uuid, target: String, checked_at: DateTime<Utc>) -> Self {
        Self {
            monitor_id,
            target,
            checked_at,
            status: Status::Error,
            status_code: 0,
            latency_ms: None,
            error_message: None,
            transition: Transition::None,
            next_check_at: None,
            dispatch: None,
        }
    }

    /// The target answered with `status_code`
    pub fn responded(mut self, latency_ms: u64, status_code: u16) -> Self {
        self.status = classify(status_code);
        self.status_code = status_code;
        self.latency_ms = Some(latency_ms);
        self
    }

    /// No response was received
    pub fn failure(mut self, error: String) -> Self {
        self.status = classify(0);
        self.status_code = 0;
        self.error_message = Some(error);
        self
    }
}
