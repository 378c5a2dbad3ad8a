//! Monitoring engine for the Statusframe uptime service.
//!
//! Probes registered endpoints on a per-plan cadence, classifies the
//! results, detects state transitions and fans alerts out over email, Slack
//! and Discord. Certificate expiry and observation retention run as
//! independent loops against the same store.

pub mod alerting;
pub mod certificates;
pub mod config;
pub mod database;
pub mod monitoring;
pub mod orchestrator;
pub mod plans;
pub mod pool;

pub use orchestrator::{EngineHandle, Orchestrator};
