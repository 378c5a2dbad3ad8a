/// Monitoring engine module - runs health checks and detects state changes
///
/// This module is responsible for:
/// - Classifying probe results into statuses
/// - Executing HTTP/HTTPS checks
/// - Scheduling due monitors under a concurrency cap
pub mod checker;
pub mod executor;
pub mod scheduler;
pub mod status;
pub mod transition;
pub mod types;

pub use checker::{Checker, HttpChecker, ProbeError, http_client};
pub use executor::MonitoringExecutor;
pub use scheduler::MonitoringScheduler;
pub use status::{Status, classify};
pub use transition::{Transition, detect};
pub use types::CheckResult;
