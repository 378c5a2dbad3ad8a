//! Status classification.
//!
//! This is the only place that knows which numeric ranges mean what; every
//! other component works with [`Status`].

use serde::{Deserialize, Serialize};

/// Semantic health status derived from an HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Up,
    Degraded,
    ClientError,
    Down,
    Error,
}

impl Status {
    /// `down` or `error`
    pub fn is_incident(&self) -> bool {
        matches!(self, Status::Down | Status::Error)
    }

    /// `degraded` or `client_error`
    pub fn is_degraded(&self) -> bool {
        matches!(self, Status::Degraded | Status::ClientError)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Up => "up",
            Status::Degraded => "degraded",
            Status::ClientError => "client_error",
            Status::Down => "down",
            Status::Error => "error",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a status code to a [`Status`]. `0` means no response was received.
pub fn classify(status_code: u16) -> Status {
    match status_code {
        200..=299 => Status::Up,
        300..=399 => Status::Degraded,
        400..=499 => Status::ClientError,
        500.. => Status::Down,
        _ => Status::Error,
    }
}
