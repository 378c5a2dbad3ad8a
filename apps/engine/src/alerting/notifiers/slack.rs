use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Delivery, Notifier, NotifyError, SkipReason, ensure_success};
use crate::alerting::Channel;
use crate::alerting::event::AlertEvent;
use crate::config::SlackConfig;
use crate::database::models::NotificationSettings;

/// Posts alerts to a Slack channel with the account's bot token
pub struct SlackNotifier {
    client: Client,
    api_base: String,
}

impl SlackNotifier {
    pub fn new(client: Client, config: &SlackConfig) -> Self {
        Self { client, api_base: config.api_base.trim_end_matches('/').to_string() }
    }
}

#[derive(Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: String,
    attachments: [Attachment<'a>; 1],
}

#[derive(Serialize)]
struct Attachment<'a> {
    color: &'a str,
    title: String,
    title_link: &'a str,
    text: String,
    fields: Vec<Field>,
    footer: &'static str,
    ts: i64,
}

#[derive(Serialize)]
struct Field {
    title: &'static str,
    value: String,
    short: bool,
}

/// chat.postMessage answers 200 even on failure; `ok` carries the verdict
#[derive(Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

fn build_payload<'a>(event: &'a AlertEvent, channel: &'a str) -> PostMessage<'a> {
    PostMessage {
        channel,
        text: event.subject(),
        attachments: [Attachment {
            color: event.kind.chat_color(),
            title: event.title(),
            title_link: &event.probe_url,
            text: event.detail(),
            fields: vec![
                Field { title: "Status", value: event.status_code_text(), short: true },
                Field { title: "Time", value: event.timestamp_text(), short: true },
                Field { title: "Plan", value: event.plan.to_string(), short: true },
                Field { title: "URL", value: event.probe_url.clone(), short: false },
            ],
            footer: "Statusframe",
            ts: event.occurred_at.timestamp(),
        }],
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn channel(&self) -> Channel {
        Channel::Slack
    }

    async fn notify(
        &self,
        event: &AlertEvent,
        settings: &NotificationSettings,
    ) -> Result<Delivery, NotifyError> {
        let Some(slack) = settings
            .slack
            .as_ref()
            .filter(|s| s.enabled && !s.bot_token.is_empty() && !s.channel_id.is_empty())
        else {
            return Ok(Delivery::Skipped(SkipReason::NotConfigured));
        };

        let response = self
            .client
            .post(format!("{}/chat.postMessage", self.api_base))
            .bearer_auth(&slack.bot_token)
            .json(&build_payload(event, &slack.channel_id))
            .send()
            .await?;

        let reply: SlackResponse = ensure_success(response).await?.json().await?;
        if !reply.ok {
            return Err(NotifyError::Rejected(reply.error.unwrap_or_else(|| "unknown_error".into())));
        }

        tracing::info!("Slack alert sent for monitor {} to channel {}", event.monitor_id, slack.channel_id);
        Ok(Delivery::Sent)
    }
}
