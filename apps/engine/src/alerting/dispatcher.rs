use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;

use super::Channel;
use super::event::AlertEvent;
use super::notifiers::{Delivery, Notifier, NotifyError, SkipReason};
use crate::database::Database;
use crate::database::models::{Monitor, NotificationSettings};
use crate::monitoring::transition::Transition;
use crate::plans::PlanPolicies;

/// Outcome of one channel for one alert
#[derive(Debug)]
pub struct ChannelDelivery {
    pub channel: Channel,
    pub result: Result<Delivery, NotifyError>,
}

#[derive(Debug)]
pub enum DispatchOutcome {
    /// The transition does not warrant an alert
    NotAlertWorthy,
    /// An alert for this monitor went out too recently
    Suppressed { last_sent: DateTime<Utc> },
    /// Cooldown state could not be read or written; nothing was sent
    Abandoned,
    /// An alert record was written and every channel was attempted
    Recorded { deliveries: Vec<ChannelDelivery> },
}

impl DispatchOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, DispatchOutcome::Recorded { .. })
    }

    /// Channels that actually delivered
    pub fn sent_channels(&self) -> Vec<Channel> {
        match self {
            DispatchOutcome::Recorded { deliveries } => deliveries
                .iter()
                .filter(|d| matches!(d.result, Ok(Delivery::Sent)))
                .map(|d| d.channel)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Applies the per-monitor cooldown and fans alerts out to every channel
pub struct AlertDispatcher {
    database: Arc<dyn Database>,
    notifiers: Vec<Arc<dyn Notifier>>,
    plans: PlanPolicies,
    cooldown: Duration,
}

impl AlertDispatcher {
    pub fn new(
        database: Arc<dyn Database>,
        notifiers: Vec<Arc<dyn Notifier>>,
        plans: PlanPolicies,
        cooldown_seconds: i64,
    ) -> Self {
        Self { database, notifiers, plans, cooldown: Duration::seconds(cooldown_seconds) }
    }

    /// Record and deliver an alert for `monitor` unless one went out within
    /// the cooldown window before `now`.
    ///
    /// The alert record is written before any channel is contacted so a slow
    /// or failing channel can never cause a duplicate.
    pub async fn dispatch(
        &self,
        monitor: &Monitor,
        transition: Transition,
        status_code: u16,
        now: DateTime<Utc>,
    ) -> DispatchOutcome {
        let Some(event) = AlertEvent::new(monitor, transition, status_code, now) else {
            return DispatchOutcome::NotAlertWorthy;
        };

        match self.database.last_alert(monitor.id).await {
            Ok(Some(last_sent)) if now - last_sent < self.cooldown => {
                tracing::info!(
                    "Skipping {} alert for {} ({}): last alert sent {}s ago",
                    transition,
                    monitor.name,
                    monitor.id,
                    (now - last_sent).num_seconds()
                );
                return DispatchOutcome::Suppressed { last_sent };
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("Failed to read last alert for monitor {}: {}", monitor.id, e);
                return DispatchOutcome::Abandoned;
            }
        }

        if let Err(e) = self.database.insert_alert_record(monitor.id, now).await {
            tracing::error!("Failed to record alert for monitor {}: {}", monitor.id, e);
            return DispatchOutcome::Abandoned;
        }

        let settings = match self.database.notification_settings(monitor.owner_id).await {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                tracing::info!("Account {} has no notification settings", monitor.owner_id);
                NotificationSettings { owner_id: monitor.owner_id, ..Default::default() }
            }
            Err(e) => {
                tracing::error!("Failed to load notification settings for {}: {}", monitor.owner_id, e);
                NotificationSettings { owner_id: monitor.owner_id, ..Default::default() }
            }
        };

        tracing::info!("Dispatching {} alert for {} ({})", transition, monitor.name, monitor.id);

        let policy = self.plans.policy(monitor.plan);
        let sends = self.notifiers.iter().map(|notifier| {
            let channel = notifier.channel();
            let entitled = policy.allows(channel);
            let (event, settings) = (&event, &settings);
            async move {
                let result = if entitled {
                    notifier.notify(event, settings).await
                } else {
                    Ok(Delivery::Skipped(SkipReason::NotEntitled))
                };
                ChannelDelivery { channel, result }
            }
        });
        let deliveries = join_all(sends).await;

        for delivery in &deliveries {
            match &delivery.result {
                Ok(Delivery::Sent) => {}
                Ok(Delivery::Skipped(reason)) => {
                    tracing::debug!("{} alert for {} skipped: {:?}", delivery.channel, monitor.id, reason)
                }
                Err(e) => tracing::error!(
                    "Failed to deliver {} alert for monitor {}: {}",
                    delivery.channel,
                    monitor.id,
                    e
                ),
            }
        }

        DispatchOutcome::Recorded { deliveries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::notifiers::testing::RecordingNotifier;
    use crate::database::repository::tests::create_test_database;
    use crate::plans::PlanTier;
    use anyhow::Result;
    use uuid::Uuid;

    struct Harness {
        dispatcher: AlertDispatcher,
        database: Arc<dyn Database>,
        email: Arc<RecordingNotifier>,
        slack: Arc<RecordingNotifier>,
        discord: Arc<RecordingNotifier>,
        _dir: tempfile::TempDir,
    }

    async fn harness(slack_fails: bool) -> Result<Harness> {
        let (database, dir) = create_test_database().await?;
        let database: Arc<dyn Database> = database;
        let email = RecordingNotifier::new(Channel::Email);
        let slack = if slack_fails {
            RecordingNotifier::failing(Channel::Slack)
        } else {
            RecordingNotifier::new(Channel::Slack)
        };
        let discord = RecordingNotifier::new(Channel::Discord);
        let notifiers: Vec<Arc<dyn Notifier>> = vec![email.clone() as Arc<dyn Notifier>, slack.clone(), discord.clone()];
        let dispatcher = AlertDispatcher::new(database.clone(), notifiers, PlanPolicies::default(), 300);
        Ok(Harness { dispatcher, database, email, slack, discord, _dir: dir })
    }

    async fn monitor(database: &Arc<dyn Database>, plan: PlanTier) -> Result<Monitor> {
        let monitor = Monitor::new(Uuid::new_v4(), "api".into(), "https://api.example.com".into(), plan);
        database.save_monitor(&monitor).await?;
        Ok(monitor)
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_then_lapses() -> Result<()> {
        let h = harness(false).await?;
        let m = monitor(&h.database, PlanTier::Pro).await?;
        let t0 = Utc::now();

        let first = h.dispatcher.dispatch(&m, Transition::Incident, 503, t0).await;
        assert!(first.is_recorded());
        assert_eq!(first.sent_channels(), vec![Channel::Email, Channel::Slack, Channel::Discord]);

        let second = h.dispatcher.dispatch(&m, Transition::Incident, 503, t0 + Duration::seconds(90)).await;
        assert!(matches!(second, DispatchOutcome::Suppressed { .. }));

        let third = h.dispatcher.dispatch(&m, Transition::Incident, 500, t0 + Duration::seconds(400)).await;
        assert!(third.is_recorded());

        assert_eq!(h.database.alert_records(m.id).await?.len(), 2);
        assert_eq!(h.email.call_count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_cooldown_holds_with_sub_second_timestamps() -> Result<()> {
        let h = harness(false).await?;
        let m = monitor(&h.database, PlanTier::Pro).await?;
        let t0 = DateTime::from_timestamp(1_700_000_000, 900_000_000).unwrap();

        assert!(h.dispatcher.dispatch(&m, Transition::Incident, 503, t0).await.is_recorded());

        let early = t0 + Duration::milliseconds(299_500);
        let suppressed = h.dispatcher.dispatch(&m, Transition::Incident, 503, early).await;
        let DispatchOutcome::Suppressed { last_sent } = suppressed else {
            panic!("expected the cooldown to hold 299.5s after the first alert");
        };
        assert_eq!(last_sent, t0);

        let lapsed = t0 + Duration::seconds(300);
        assert!(h.dispatcher.dispatch(&m, Transition::Incident, 503, lapsed).await.is_recorded());

        let records = h.database.alert_records(m.id).await?;
        assert_eq!(records.len(), 2);
        let sent: Vec<_> = records.iter().map(|r| r.sent_at).collect();
        assert!(sent.contains(&t0) && sent.contains(&lapsed));
        Ok(())
    }

    #[tokio::test]
    async fn test_cooldown_is_per_monitor() -> Result<()> {
        let h = harness(false).await?;
        let a = monitor(&h.database, PlanTier::Pro).await?;
        let b = monitor(&h.database, PlanTier::Pro).await?;
        let now = Utc::now();

        assert!(h.dispatcher.dispatch(&a, Transition::Incident, 0, now).await.is_recorded());
        assert!(h.dispatcher.dispatch(&b, Transition::Incident, 0, now).await.is_recorded());
        Ok(())
    }

    #[tokio::test]
    async fn test_free_plan_gets_email_only() -> Result<()> {
        let h = harness(false).await?;
        let m = monitor(&h.database, PlanTier::Free).await?;

        let outcome = h.dispatcher.dispatch(&m, Transition::Incident, 500, Utc::now()).await;
        assert_eq!(outcome.sent_channels(), vec![Channel::Email]);
        assert_eq!(h.slack.call_count(), 0);
        assert_eq!(h.discord.call_count(), 0);

        let DispatchOutcome::Recorded { deliveries } = outcome else {
            panic!("expected a recorded alert");
        };
        let slack = deliveries.iter().find(|d| d.channel == Channel::Slack).unwrap();
        assert!(matches!(slack.result, Ok(Delivery::Skipped(SkipReason::NotEntitled))));
        Ok(())
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() -> Result<()> {
        let h = harness(true).await?;
        let m = monitor(&h.database, PlanTier::Business).await?;

        let outcome = h.dispatcher.dispatch(&m, Transition::Incident, 502, Utc::now()).await;
        assert_eq!(outcome.sent_channels(), vec![Channel::Email, Channel::Discord]);
        assert_eq!(h.slack.call_count(), 1);
        assert_eq!(h.database.alert_records(m.id).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_none_transition_sends_nothing() -> Result<()> {
        let h = harness(false).await?;
        let m = monitor(&h.database, PlanTier::Pro).await?;

        let outcome = h.dispatcher.dispatch(&m, Transition::None, 200, Utc::now()).await;
        assert!(matches!(outcome, DispatchOutcome::NotAlertWorthy));
        assert!(h.database.alert_records(m.id).await?.is_empty());
        assert_eq!(h.email.call_count(), 0);
        Ok(())
    }
}
