use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, interval};
use uuid::Uuid;

use super::executor::MonitoringExecutor;
use super::types::CheckResult;
use crate::database::Database;

/// Removes a monitor from the in-flight set when its check task ends
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
    monitor_id: Uuid,
}

impl InFlightGuard {
    fn claim(in_flight: &Arc<Mutex<HashSet<Uuid>>>, monitor_id: Uuid) -> Option<Self> {
        let mut set = in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.insert(monitor_id).then(|| Self { in_flight: in_flight.clone(), monitor_id })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).remove(&self.monitor_id);
    }
}

/// Monitoring scheduler - finds due monitors on every tick and runs their
/// checks concurrently, bounded by a semaphore
pub struct MonitoringScheduler {
    database: Arc<dyn Database>,
    executor: Arc<MonitoringExecutor>,
    tick: Duration,
    permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl MonitoringScheduler {
    pub fn new(
        database: Arc<dyn Database>,
        executor: Arc<MonitoringExecutor>,
        tick: Duration,
        max_in_flight: usize,
    ) -> Self {
        Self {
            database,
            executor,
            tick,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Number of checks currently claimed by a task
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Spawn a check for every monitor due at `now` that is not already
    /// being checked. Returns the number of checks started.
    pub async fn dispatch_due(
        &self,
        now: DateTime<Utc>,
        tasks: &mut JoinSet<CheckResult>,
    ) -> Result<usize> {
        let due = self.database.fetch_due_monitors(now).await?;
        if due.is_empty() {
            tracing::debug!("No monitors due");
            return Ok(0);
        }

        tracing::info!("Checking health for {} monitor(s)", due.len());

        let mut started = 0;
        for monitor in due {
            let Some(guard) = InFlightGuard::claim(&self.in_flight, monitor.id) else {
                tracing::debug!("Check for {} still running, skipping", monitor.id);
                continue;
            };

            let executor = self.executor.clone();
            let permits = self.permits.clone();
            tasks.spawn(async move {
                let _guard = guard;
                // The semaphore is never closed
                let _permit = permits.acquire_owned().await;
                executor.execute_check(&monitor, Utc::now()).await
            });
            started += 1;
        }

        Ok(started)
    }

    /// Run one tick to completion
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<Vec<CheckResult>> {
        let mut tasks = JoinSet::new();
        self.dispatch_due(now, &mut tasks).await?;

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!("Health check task failed: {}", e),
            }
        }
        Ok(results)
    }

    /// Start the tick loop. On shutdown no new checks are started and the
    /// task finishes once every in-flight check has completed.
    pub fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut tasks = JoinSet::new();

            tracing::info!("Monitoring scheduler started (tick every {:?})", self.tick);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.dispatch_due(Utc::now(), &mut tasks).await {
                            tracing::error!("Failed to fetch due monitors: {}", e);
                        }
                    }
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        if let Err(e) = joined {
                            tracing::error!("Health check task failed: {}", e);
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Monitoring scheduler stopping, waiting for {} check(s)", tasks.len());
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::error!("Health check task failed: {}", e);
                }
            }
            tracing::info!("Monitoring scheduler stopped");
        })
    }
}
