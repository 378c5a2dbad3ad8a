//! Monitor store gateway
//!
//! The `Database` trait is the engine's whole view of persistence; the
//! libsql implementation behind it is one possible backend.

pub mod repository;
pub mod migrations;
pub mod models;

pub use repository::{Database, DatabaseImpl};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
