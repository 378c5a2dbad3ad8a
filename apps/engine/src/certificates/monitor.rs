use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use uuid::Uuid;

use super::prober::{CertificateProber, days_until_expiry};
use crate::database::Database;
use crate::database::models::{Monitor, SslState};

/// Results of one full certificate sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepSummary {
    pub checked: usize,
    pub failed: usize,
    /// Valid certificates expiring within 30 days
    pub expiring_soon: usize,
}

/// Handle for requesting an out-of-cycle certificate check.
///
/// Requests never block; when the queue is full they are dropped.
#[derive(Clone)]
pub struct SslCheckTrigger {
    tx: mpsc::Sender<Uuid>,
}

impl SslCheckTrigger {
    /// Queue a check for `monitor_id`. Returns false if the request was dropped.
    pub fn trigger(&self, monitor_id: Uuid) -> bool {
        match self.tx.try_send(monitor_id) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("SSL check queue is full, dropping request for {}", monitor_id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("Certificate monitor is not running, dropping request for {}", monitor_id);
                false
            }
        }
    }
}

/// Tracks certificate expiry for every HTTPS monitor on its own cadence
pub struct CertificateMonitor {
    database: Arc<dyn Database>,
    prober: Arc<dyn CertificateProber>,
    sweep_interval: Duration,
    requests: mpsc::Receiver<Uuid>,
}

impl CertificateMonitor {
    pub fn new(
        database: Arc<dyn Database>,
        prober: Arc<dyn CertificateProber>,
        sweep_interval: Duration,
        queue_capacity: usize,
    ) -> (Self, SslCheckTrigger) {
        let (tx, requests) = mpsc::channel(queue_capacity.max(1));
        (Self { database, prober, sweep_interval, requests }, SslCheckTrigger { tx })
    }

    /// Check one monitor and overwrite its stored state. Any failure clears
    /// the state to unknown.
    pub async fn check_monitor(&self, monitor: &Monitor, now: DateTime<Utc>) -> SslState {
        let state = match self.prober.probe(&monitor.probe_url).await {
            Ok(info) => {
                let days = days_until_expiry(info.not_after, now);
                if days <= 7 {
                    tracing::warn!("🚨 Certificate for {} expires in {} day(s) ({})", monitor.name, days, info.issuer);
                } else if days <= 30 {
                    tracing::info!("⚠️ Certificate for {} expires in {} days ({})", monitor.name, days, info.issuer);
                } else {
                    tracing::debug!("Certificate for {} valid for {} days", monitor.name, days);
                }
                SslState::checked(info.not_after, days, info.issuer, now)
            }
            Err(e) => {
                tracing::warn!("Certificate check for {} ({}) failed: {}", monitor.name, monitor.probe_url, e);
                SslState::unknown()
            }
        };

        if let Err(e) = self.database.update_ssl_state(monitor.id, &state).await {
            tracing::error!("Failed to store certificate state for {}: {}", monitor.id, e);
        }

        state
    }

    /// Handle an on-demand request. Unknown and non-HTTPS monitors are ignored.
    pub async fn check_by_id(&self, monitor_id: Uuid, now: DateTime<Utc>) -> Option<SslState> {
        let monitor = match self.database.monitor_by_id(monitor_id).await {
            Ok(Some(monitor)) if monitor.is_https() => monitor,
            Ok(_) => {
                tracing::debug!("Ignoring SSL check request for {}: not an HTTPS monitor", monitor_id);
                return None;
            }
            Err(e) => {
                tracing::error!("Failed to load monitor {} for SSL check: {}", monitor_id, e);
                return None;
            }
        };

        Some(self.check_monitor(&monitor, now).await)
    }

    /// Check every HTTPS monitor, one after another
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepSummary {
        let monitors = match self.database.https_monitors().await {
            Ok(monitors) => monitors,
            Err(e) => {
                tracing::error!("Failed to list HTTPS monitors: {}", e);
                return SweepSummary::default();
            }
        };

        tracing::info!("Starting certificate sweep over {} monitor(s)", monitors.len());

        let mut summary = SweepSummary::default();
        for monitor in &monitors {
            let state = self.check_monitor(monitor, now).await;
            summary.checked += 1;
            match state.days_until_expiry {
                None => summary.failed += 1,
                Some(days) if days <= 30 => summary.expiring_soon += 1,
                Some(_) => {}
            }
        }

        tracing::info!(
            "Certificate sweep complete: {} checked, {} failed, {} expiring within 30 days",
            summary.checked,
            summary.failed,
            summary.expiring_soon
        );
        summary
    }

    /// Sweep at startup and then on every interval, serving on-demand
    /// requests in between
    pub fn start(mut self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep(Utc::now()).await;
                    }
                    Some(monitor_id) = self.requests.recv() => {
                        self.check_by_id(monitor_id, Utc::now()).await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Certificate monitor stopped");
        })
    }
}
