//! Alert dispatching and delivery channels

pub mod dispatcher;
pub mod event;
pub mod notifiers;

use serde::{Deserialize, Serialize};

pub use dispatcher::{AlertDispatcher, ChannelDelivery, DispatchOutcome};
pub use event::{AlertEvent, AlertKind};
pub use notifiers::{Delivery, Notifier, NotifyError, SkipReason};

/// Delivery channel an alert can be sent over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Slack,
    Discord,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Slack => write!(f, "slack"),
            Channel::Discord => write!(f, "discord"),
        }
    }
}
