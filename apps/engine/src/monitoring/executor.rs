use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};

use super::checker::Checker;
use super::transition::detect;
use super::types::CheckResult;
use crate::alerting::AlertDispatcher;
use crate::database::Database;
use crate::database::models::Monitor;
use crate::plans::PlanPolicies;

/// Monitoring executor - runs one health check end to end
///
/// probe, classify, compare with the previous observation, persist,
/// reschedule, and hand alert-worthy transitions to the dispatcher.
pub struct MonitoringExecutor {
    database: Arc<dyn Database>,
    checker: Arc<dyn Checker>,
    dispatcher: Arc<AlertDispatcher>,
    plans: PlanPolicies,
}

impl MonitoringExecutor {
    pub fn new(
        database: Arc<dyn Database>,
        checker: Arc<dyn Checker>,
        dispatcher: Arc<AlertDispatcher>,
        plans: PlanPolicies,
    ) -> Self {
        Self { database, checker, dispatcher, plans }
    }

    /// Execute a check for `monitor` that starts at `started_at`.
    ///
    /// Persistence failures are logged and never abort the check; the
    /// observation and the reschedule are independent writes.
    pub async fn execute_check(&self, monitor: &Monitor, started_at: DateTime<Utc>) -> CheckResult {
        let clock = Instant::now();
        let probe = self.checker.check(&monitor.probe_url).await;
        let finished_at = started_at + Duration::from_std(clock.elapsed()).unwrap_or_else(|_| Duration::zero());

        let mut result = CheckResult::new(monitor.id, monitor.probe_url.clone(), finished_at);
        result = match probe {
            Ok((latency_ms, status_code)) => result.responded(latency_ms, status_code),
            Err(e) => {
                tracing::warn!("Health check for {} ({}) failed: {}", monitor.name, monitor.probe_url, e);
                result.failure(e.to_string())
            }
        };

        let previous = match self.database.previous_observation(monitor.id).await {
            Ok(previous) => previous.map(|o| o.status()),
            Err(e) => {
                tracing::error!("Failed to read previous observation for {}: {}", monitor.id, e);
                None
            }
        };

        if let Err(e) = self.database.insert_observation(monitor.id, result.status_code, finished_at).await {
            tracing::error!("Failed to record observation for {}: {}", monitor.id, e);
        }

        let interval = self.plans.check_interval(monitor.plan);
        let next_check_at = finished_at + Duration::seconds(interval.as_secs() as i64);
        match self.database.advance_schedule(monitor.id, next_check_at).await {
            Ok(true) => result.next_check_at = Some(next_check_at),
            Ok(false) => tracing::debug!("Schedule for {} was already past {}", monitor.id, next_check_at),
            Err(e) => tracing::error!("Failed to reschedule monitor {}: {}", monitor.id, e),
        }

        result.transition = detect(previous, result.status);
        tracing::info!(
            monitor_id = %monitor.id,
            status_code = result.status_code,
            latency_ms = ?result.latency_ms,
            "Checked {}: {} -> {}",
            monitor.name,
            result.status,
            result.transition
        );

        if result.transition.is_alert() {
            if monitor.alerts_enabled {
                let outcome = self
                    .dispatcher
                    .dispatch(monitor, result.transition, result.status_code, finished_at)
                    .await;
                result.dispatch = Some(outcome);
            } else {
                tracing::debug!("Alerts disabled for {}, not dispatching {}", monitor.id, result.transition);
            }
        }

        result
    }
}
