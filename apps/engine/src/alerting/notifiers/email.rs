use std::time::Duration;

use askama::Template;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{Delivery, Notifier, NotifyError, SkipReason};
use crate::alerting::Channel;
use crate::alerting::event::AlertEvent;
use crate::config::SmtpConfig;
use crate::database::models::NotificationSettings;

const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

/// Sends multipart alert emails through an SMTP relay.
///
/// Without a usable relay the notifier stays constructed but skips every
/// send, so a missing mail setup never takes the engine down.
pub struct EmailNotifier {
    mailer: Option<Mailer>,
    dashboard_url: String,
}

impl EmailNotifier {
    pub fn new(config: Option<&SmtpConfig>) -> Self {
        let Some(smtp) = config else {
            tracing::warn!("SMTP is not configured, email alerts are disabled");
            return Self::disabled();
        };

        match Self::connect(smtp) {
            Ok(mailer) => {
                tracing::info!("Email alerts enabled via {}:{}", smtp.host, smtp.port);
                Self { mailer: Some(mailer), dashboard_url: smtp.dashboard_url.clone() }
            }
            Err(e) => {
                tracing::warn!("Failed to configure SMTP transport, email alerts are disabled: {}", e);
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self { mailer: None, dashboard_url: String::new() }
    }

    pub fn is_enabled(&self) -> bool {
        self.mailer.is_some()
    }

    fn connect(smtp: &SmtpConfig) -> anyhow::Result<Mailer> {
        let from: Mailbox = smtp.from.parse()?;
        let credentials = Credentials::new(smtp.username.clone(), smtp.password.clone());

        // 465 speaks TLS from the first byte, everything else upgrades
        let builder = if smtp.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?
        };
        let transport = builder
            .port(smtp.port)
            .credentials(credentials)
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Mailer { transport, from })
    }
}

/// HTML part of an alert email. Values are escaped by the template engine.
#[derive(Template)]
#[template(path = "alert_email.html")]
struct AlertEmailTemplate {
    subject: String,
    accent: &'static str,
    emoji: &'static str,
    headline: &'static str,
    detail: String,
    rows: Vec<(&'static str, String)>,
    dashboard_url: String,
}

impl AlertEmailTemplate {
    fn new(event: &AlertEvent, dashboard_url: &str) -> Self {
        Self {
            subject: event.subject(),
            accent: event.kind.accent_color(),
            emoji: event.kind.emoji(),
            headline: event.headline(),
            detail: event.detail(),
            rows: vec![
                ("Service", event.monitor_name.clone()),
                ("URL", event.probe_url.clone()),
                ("Status", event.status_code_text()),
                ("Plan", event.plan.as_str().to_string()),
                ("Time", event.timestamp_text()),
            ],
            dashboard_url: dashboard_url.to_string(),
        }
    }
}

fn render_message(
    event: &AlertEvent,
    from: &Mailbox,
    to: &str,
    dashboard_url: &str,
) -> Result<Message, NotifyError> {
    let to: Mailbox = to.parse().map_err(|_| NotifyError::InvalidRecipient(to.to_string()))?;
    let text = format!("{}\nDashboard: {}\n", event.text_body(), dashboard_url);
    let html = AlertEmailTemplate::new(event, dashboard_url).render()?;

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(event.subject())
        .multipart(
            MultiPart::alternative()
                .singlepart(SinglePart::builder().header(ContentType::TEXT_PLAIN).body(text))
                .singlepart(SinglePart::builder().header(ContentType::TEXT_HTML).body(html)),
        )
        .map_err(|e| NotifyError::Email(e.to_string()))
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn notify(
        &self,
        event: &AlertEvent,
        settings: &NotificationSettings,
    ) -> Result<Delivery, NotifyError> {
        let Some(email) = settings.email.as_ref().filter(|e| e.enabled && !e.address.is_empty())
        else {
            return Ok(Delivery::Skipped(SkipReason::NotConfigured));
        };
        let Some(mailer) = self.mailer.as_ref() else {
            return Ok(Delivery::Skipped(SkipReason::Unavailable));
        };

        let message = render_message(event, &mailer.from, &email.address, &self.dashboard_url)?;
        mailer.transport.send(message).await.map_err(|e| NotifyError::Email(e.to_string()))?;

        tracing::info!("Email alert sent for monitor {} to {}", event.monitor_id, email.address);
        Ok(Delivery::Sent)
    }
}
