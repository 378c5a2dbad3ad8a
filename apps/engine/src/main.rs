use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use statusframe_engine::alerting::notifiers::build_notifiers;
use statusframe_engine::config::Config;
use statusframe_engine::monitoring::http_client;
use statusframe_engine::orchestrator::Orchestrator;
use statusframe_engine::pool::open_local;

#[derive(Parser, Debug)]
#[command(author, version, about = "Statusframe monitoring engine", long_about = None)]
struct Args {
    /// Config file path (defaults to $XDG_CONFIG_HOME/statusframe/engine.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database file, overrides the config file
    #[arg(short, long)]
    database: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal, shutting down gracefully"),
            Err(e) => warn!("Failed to install Ctrl+C handler: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received terminate signal, shutting down gracefully");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    let args = Args::parse();

    let mut config = Config::from_config(args.config.as_ref())?;
    config.apply_env();
    if let Some(database) = args.database {
        config.database.path = database;
    }

    if args.print_config {
        println!("{config}");
        return Ok(());
    }

    info!("Starting statusframe engine v{}", env!("CARGO_PKG_VERSION"));

    let pool = open_local(&config.database.path, config.engine.max_in_flight_checks + 4).await?;
    let client = http_client(Duration::from_secs(config.engine.probe_timeout_seconds))?;
    let notifiers = build_notifiers(&config, client.clone());

    let orchestrator = Orchestrator::new(config, pool, client, notifiers).await?;
    let handle = orchestrator.start();

    shutdown_signal().await;
    handle.shutdown().await
}
