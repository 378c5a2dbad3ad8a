use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Delivery, Notifier, NotifyError, SkipReason, ensure_success};
use crate::alerting::Channel;
use crate::alerting::event::AlertEvent;
use crate::config::DiscordConfig;
use crate::database::models::NotificationSettings;

/// Sends alerts as direct messages from the platform's bot
pub struct DiscordNotifier {
    client: Client,
    api_base: String,
    bot_token: Option<String>,
}

#[derive(Serialize)]
struct CreateDm<'a> {
    recipient_id: &'a str,
}

#[derive(Deserialize)]
struct DmChannel {
    id: String,
}

#[derive(Serialize)]
struct CreateMessage {
    content: String,
}

impl DiscordNotifier {
    pub fn new(client: Client, config: &DiscordConfig) -> Self {
        let bot_token = config.bot_token.clone().filter(|t| !t.trim().is_empty());
        if bot_token.is_none() {
            tracing::warn!("DISCORD_BOT_TOKEN is not set, Discord alerts are disabled");
        }

        Self { client, api_base: config.api_base.trim_end_matches('/').to_string(), bot_token }
    }

    async fn open_dm(&self, token: &str, user_id: &str) -> Result<String, NotifyError> {
        let response = self
            .client
            .post(format!("{}/users/@me/channels", self.api_base))
            .header(reqwest::header::AUTHORIZATION, format!("Bot {token}"))
            .json(&CreateDm { recipient_id: user_id })
            .send()
            .await?;

        let channel: DmChannel = ensure_success(response).await?.json().await?;
        Ok(channel.id)
    }
}

fn render_content(event: &AlertEvent) -> String {
    format!(
        "**{subject}**\n\n\
         **URL:** {url}\n\
         **Status:** {status}\n\
         **Details:** {detail}\n\
         **Plan:** {plan}\n\
         **Time:** {time}",
        subject = event.subject(),
        url = event.probe_url,
        status = event.status_code_text(),
        detail = event.detail(),
        plan = event.plan,
        time = event.timestamp_text(),
    )
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn channel(&self) -> Channel {
        Channel::Discord
    }

    async fn notify(
        &self,
        event: &AlertEvent,
        settings: &NotificationSettings,
    ) -> Result<Delivery, NotifyError> {
        let Some(discord) = settings.discord.as_ref().filter(|d| d.enabled && !d.user_id.is_empty())
        else {
            return Ok(Delivery::Skipped(SkipReason::NotConfigured));
        };
        let Some(token) = self.bot_token.as_deref() else {
            return Ok(Delivery::Skipped(SkipReason::Unavailable));
        };

        let channel_id = self.open_dm(token, &discord.user_id).await?;

        let response = self
            .client
            .post(format!("{}/channels/{}/messages", self.api_base, channel_id))
            .header(reqwest::header::AUTHORIZATION, format!("Bot {token}"))
            .json(&CreateMessage { content: render_content(event) })
            .send()
            .await?;
        ensure_success(response).await?;

        tracing::info!("Discord alert sent for monitor {} to user {}", event.monitor_id, discord.user_id);
        Ok(Delivery::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{DiscordSettings, Monitor};
    use crate::monitoring::transition::Transition;
    use crate::plans::PlanTier;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event() -> AlertEvent {
        let monitor = Monitor::new(Uuid::new_v4(), "web".into(), "https://web.example.com".into(), PlanTier::Business);
        AlertEvent::new(&monitor, Transition::Recovery, 200, Utc::now()).unwrap()
    }

    fn settings() -> NotificationSettings {
        NotificationSettings {
            owner_id: Uuid::new_v4(),
            discord: Some(DiscordSettings { user_id: "4242".into(), enabled: true }),
            ..Default::default()
        }
    }

    fn notifier(server: &MockServer, token: Option<&str>) -> DiscordNotifier {
        DiscordNotifier::new(
            Client::new(),
            &DiscordConfig { bot_token: token.map(String::from), api_base: server.uri() },
        )
    }

    #[test]
    fn test_content_is_markdown() {
        let content = render_content(&event());
        assert!(content.starts_with("**🟢 Resolved: web is back Up**"));
        assert!(content.contains("**Status:** 200 (up)"));
    }

    #[tokio::test]
    async fn test_opens_dm_then_posts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/@me/channels"))
            .and(header("authorization", "Bot bot-token"))
            .and(body_partial_json(json!({ "recipient_id": "4242" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "900" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/channels/900/messages"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "1" })))
            .expect(1)
            .mount(&server)
            .await;

        let delivery = notifier(&server, Some("bot-token")).notify(&event(), &settings()).await.unwrap();
        assert_eq!(delivery, Delivery::Sent);
    }

    #[tokio::test]
    async fn test_dm_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/@me/channels"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Missing Access"))
            .mount(&server)
            .await;

        let err = notifier(&server, Some("bot-token")).notify(&event(), &settings()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Api { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_without_token_is_skipped() {
        let server = MockServer::start().await;
        let delivery = notifier(&server, None).notify(&event(), &settings()).await.unwrap();
        assert_eq!(delivery, Delivery::Skipped(SkipReason::Unavailable));
    }
}
