/// Orchestrator module - coordinates all components
///
/// The orchestrator is the core coordinator that:
/// - Initializes the schema and builds every component
/// - Starts the scheduler, certificate monitor and retention sweeper
/// - Propagates shutdown to each of them through one watch channel
pub mod retention;


pub use retention::{RetentionPolicy, RetentionSweeper};

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::alerting::{AlertDispatcher, Notifier};
use crate::certificates::{CertificateMonitor, CertificateProber, SslCheckTrigger, TlsProber};
use crate::config::Config;
use crate::database::{Database, DatabaseImpl, initialize_database};
use crate::monitoring::{Checker, HttpChecker, MonitoringExecutor, MonitoringScheduler};
use crate::pool::LibsqlPool;

/// Main orchestrator for the engine
pub struct Orchestrator {
    config: Arc<Config>,
    database: Arc<dyn Database>,
    scheduler: Arc<MonitoringScheduler>,
    certificates: CertificateMonitor,
    ssl_trigger: SslCheckTrigger,
    retention: RetentionSweeper,
}

/// Running engine. Dropping it without calling [`EngineHandle::shutdown`]
/// leaves the background tasks running.
pub struct EngineHandle {
    ssl_trigger: SslCheckTrigger,
    shutdown_tx: watch::Sender<bool>,
    task_handles: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    /// Create a new orchestrator backed by `pool`. Health checks go through
    /// `client`, the same client the chat notifiers were built with.
    pub async fn new(
        config: Config,
        pool: LibsqlPool,
        client: reqwest::Client,
        notifiers: Vec<Arc<dyn Notifier>>,
    ) -> Result<Self> {
        // Get database connection for initialization
        let conn = pool.get().await?;

        info!("Initializing database schema...");
        initialize_database(&conn).await?;
        drop(conn);

        let database: Arc<dyn Database> = Arc::new(DatabaseImpl::new_from_pool(pool));
        let probe_timeout = Duration::from_secs(config.engine.probe_timeout_seconds);
        let checker = Arc::new(HttpChecker::with_client(client));
        let prober = Arc::new(TlsProber::new(probe_timeout)?);

        Ok(Self::with_components(config, database, checker, prober, notifiers))
    }

    /// Build an orchestrator from already constructed collaborators
    pub fn with_components(
        config: Config,
        database: Arc<dyn Database>,
        checker: Arc<dyn Checker>,
        prober: Arc<dyn CertificateProber>,
        notifiers: Vec<Arc<dyn Notifier>>,
    ) -> Self {
        let config = Arc::new(config);
        let engine = &config.engine;

        let dispatcher = Arc::new(AlertDispatcher::new(
            database.clone(),
            notifiers,
            config.plans.clone(),
            engine.alert_cooldown_seconds,
        ));
        let executor = Arc::new(MonitoringExecutor::new(
            database.clone(),
            checker,
            dispatcher,
            config.plans.clone(),
        ));
        let scheduler = Arc::new(MonitoringScheduler::new(
            database.clone(),
            executor,
            Duration::from_secs(engine.tick_seconds.max(1)),
            engine.max_in_flight_checks,
        ));
        let (certificates, ssl_trigger) = CertificateMonitor::new(
            database.clone(),
            prober,
            Duration::from_secs(engine.ssl_sweep_hours.max(1) * 3600),
            engine.ssl_queue_capacity,
        );
        let retention = RetentionSweeper::new(database.clone(), RetentionPolicy::from_plans(&config.plans));

        Self { config, database, scheduler, certificates, ssl_trigger, retention }
    }

    pub fn database(&self) -> Arc<dyn Database> {
        self.database.clone()
    }

    /// Start every background loop
    pub fn start(self) -> EngineHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let retention_period = Duration::from_secs(self.config.engine.retention_sweep_hours.max(1) * 3600);

        info!("Starting monitoring engine");
        let task_handles = vec![
            self.scheduler.clone().start(shutdown_rx.clone()),
            self.certificates.start(shutdown_rx.clone()),
            self.retention.start_periodic_cleanup(retention_period, shutdown_rx),
        ];

        EngineHandle { ssl_trigger: self.ssl_trigger, shutdown_tx, task_handles }
    }
}

impl EngineHandle {
    /// Request an out-of-cycle certificate check. Never blocks; returns false
    /// when the request was dropped.
    pub fn trigger_ssl_check(&self, monitor_id: Uuid) -> bool {
        self.ssl_trigger.trigger(monitor_id)
    }

    /// Cloneable trigger for callers that outlive this handle's borrow
    pub fn ssl_trigger(&self) -> SslCheckTrigger {
        self.ssl_trigger.clone()
    }

    /// Stop every loop and wait for in-flight checks to finish
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down monitoring engine");
        // Receivers may already be gone if a task exited on its own
        let _ = self.shutdown_tx.send(true);

        for handle in self.task_handles {
            if let Err(e) = handle.await {
                error!("Background task ended abnormally: {}", e);
            }
        }

        info!("Monitoring engine stopped");
        Ok(())
    }
}
