//! Tonearm audio player daemon
//!
//! Wires configuration, database, event bus and playback engine, then runs
//! until Ctrl+C, SIGTERM or an idle request.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tonearm_ap::pipeline::HeadlessFactory;
use tonearm_ap::{KeepAlive, PlaybackEngine, Player};
use tonearm_common::config::Config;
use tonearm_common::db;
use tonearm_common::events::{Delivery, EventBus, Topic};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for tonearm-ap
#[derive(Parser, Debug)]
#[command(name = "tonearm-ap")]
#[command(about = "Tonearm audio player daemon")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "TONEARM_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file (overrides the config file)
    #[arg(short, long, env = "TONEARM_DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tonearm_ap=debug,tonearm_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(database) = args.database {
        config.database_path = database;
    }
    info!("Starting Tonearm audio player");
    info!("Database: {}", config.database_path.display());

    let pool = db::connect(&config.database_path)
        .await
        .context("Failed to open database")?;

    let keepalive = KeepAlive::new();
    let engine = PlaybackEngine::new(
        pool,
        EventBus::new(),
        Arc::new(HeadlessFactory::new()),
        keepalive.clone(),
        &config,
    );
    engine.start().await.context("Failed to start playback engine")?;

    let player = Player::new(Arc::clone(&engine));
    let mut playback_events = player.subscribe(Topic::Playback);
    tokio::spawn(async move {
        while let Some(delivery) = playback_events.recv().await {
            if playback_events.must_unsubscribe(&delivery) {
                break;
            }
            if let Delivery::Payload(event) = delivery {
                match serde_json::to_string(&event) {
                    Ok(json) => debug!("Playback event: {}", json),
                    Err(e) => warn!("Failed to serialize playback event: {}", e),
                }
            }
        }
    });

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = keepalive.idle_requested() => info!("Idle timeout reached"),
    }

    engine.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
