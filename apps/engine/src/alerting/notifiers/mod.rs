use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::Channel;
use super::event::AlertEvent;
use crate::config::Config;
use crate::database::models::NotificationSettings;

pub mod discord;
pub mod email;
pub mod slack;

pub use discord::DiscordNotifier;
pub use email::EmailNotifier;
pub use slack::SlackNotifier;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("API rejected the message: {0}")]
    Rejected(String),
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("email delivery failed: {0}")]
    Email(String),
    #[error("failed to render email template: {0}")]
    Template(#[from] askama::Error),
}

/// Why a channel did not send anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The monitor's plan does not include this channel
    NotEntitled,
    /// The account has not set up or has disabled this channel
    NotConfigured,
    /// The engine itself lacks credentials for this channel
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Skipped(SkipReason),
}

/// A single delivery channel.
///
/// Implementations must not panic on bad input and must turn every failure
/// into a [`NotifyError`] so the other channels still run.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> Channel;

    async fn notify(
        &self,
        event: &AlertEvent,
        settings: &NotificationSettings,
    ) -> Result<Delivery, NotifyError>;
}

/// Build every channel from process configuration. Channels missing their
/// credentials are still returned and skip every send.
pub fn build_notifiers(config: &Config, client: reqwest::Client) -> Vec<Arc<dyn Notifier>> {
    vec![
        Arc::new(EmailNotifier::new(config.email.as_ref())) as Arc<dyn Notifier>,
        Arc::new(SlackNotifier::new(client.clone(), &config.slack)),
        Arc::new(DiscordNotifier::new(client, &config.discord)),
    ]
}

/// Turn a non-2xx response into [`NotifyError::Api`]
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, NotifyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(NotifyError::Api { status: status.as_u16(), body })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;
    use uuid::Uuid;

    /// Records every alert it is asked to deliver
    pub(crate) struct RecordingNotifier {
        channel: Channel,
        fail: bool,
        pub(crate) calls: Mutex<Vec<(Uuid, String)>>,
    }

    impl RecordingNotifier {
        pub(crate) fn new(channel: Channel) -> Arc<Self> {
            Arc::new(Self { channel, fail: false, calls: Mutex::new(Vec::new()) })
        }

        pub(crate) fn failing(channel: Channel) -> Arc<Self> {
            Arc::new(Self { channel, fail: true, calls: Mutex::new(Vec::new()) })
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub(crate) fn subjects(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(_, subject)| subject.clone()).collect()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn channel(&self) -> Channel {
            self.channel
        }

        async fn notify(
            &self,
            event: &AlertEvent,
            _settings: &NotificationSettings,
        ) -> Result<Delivery, NotifyError> {
            self.calls.lock().unwrap().push((event.monitor_id, event.subject()));
            if self.fail {
                return Err(NotifyError::Rejected("test failure".into()));
            }
            Ok(Delivery::Sent)
        }
    }
}
