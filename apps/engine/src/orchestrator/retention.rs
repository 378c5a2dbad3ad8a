//! Automatic retention and cleanup of observations.
//!
//! Every plan tier keeps observations for its own horizon (free 7 days,
//! pro 30, business 90 by default). Cleanup runs at startup and then on a
//! fixed period as a background task.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::database::Database;
use crate::plans::{PlanPolicies, PlanTier};

/// Retention horizon per plan tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub free_days: i64,
    pub pro_days: i64,
    pub business_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from_plans(&PlanPolicies::default())
    }
}

impl RetentionPolicy {
    pub fn from_plans(plans: &PlanPolicies) -> Self {
        Self {
            free_days: plans.free.retention_days,
            pro_days: plans.pro.retention_days,
            business_days: plans.business.retention_days,
        }
    }

    pub fn days(&self, plan: PlanTier) -> i64 {
        match plan {
            PlanTier::Free => self.free_days,
            PlanTier::Pro => self.pro_days,
            PlanTier::Business => self.business_days,
        }
    }

    /// Get retention duration in seconds
    fn retention_seconds(&self, plan: PlanTier) -> i64 {
        self.days(plan) * 24 * 3600
    }

    /// Observations checked before this instant are expired
    pub fn cutoff(&self, plan: PlanTier, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::seconds(self.retention_seconds(plan))
    }
}

/// Deletes expired observations for every plan tier
pub struct RetentionSweeper {
    database: Arc<dyn Database>,
    policy: RetentionPolicy,
}

impl RetentionSweeper {
    pub fn new(database: Arc<dyn Database>, policy: RetentionPolicy) -> Self {
        Self { database, policy }
    }

    /// Delete expired observations for one tier
    pub async fn sweep_plan(&self, plan: PlanTier, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = self.policy.cutoff(plan, now);
        debug!(
            "Cleaning up {} observations (older than {} days, cutoff: {})",
            plan,
            self.policy.days(plan),
            cutoff.timestamp()
        );
        self.database.delete_observations_older_than(plan, cutoff).await
    }

    /// Run cleanup for all tiers. A failing tier is logged and the others
    /// still run. Returns the total number of rows removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> u64 {
        info!("Starting retention cleanup");

        let mut total = 0;
        for plan in PlanTier::ALL {
            match self.sweep_plan(plan, now).await {
                Ok(count) => {
                    info!("Deleted {} observations older than {} days for {} plan", count, self.policy.days(plan), plan);
                    total += count;
                }
                Err(e) => error!("Retention cleanup for {} plan failed: {}", plan, e),
            }
        }

        info!("Retention cleanup completed: {} observations deleted", total);
        total
    }

    /// Start background cleanup task; the first pass runs immediately
    pub fn start_periodic_cleanup(
        self,
        period: std::time::Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.sweep(Utc::now()).await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("Retention sweeper stopped");
        })
    }
}
