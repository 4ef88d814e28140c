//! # Firewatch Main Entry Point

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use firewatch::{
    alerting::AlertBoard,
    config::{AppConfig, ConfigLoader},
    db,
    feeds::{TelemetrySource, ThingSpeakClient},
    poller::AlertPoller,
    repositories::{AlertRepository, DeviceRepository},
    seeds::seed_devices,
    server::{AppState, run_server},
    telemetry::init_tracing,
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Fire-detection alert ingestion service
#[derive(Parser)]
#[command(name = "firewatch")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the poller and the HTTP API (default)
    Serve,
    /// Run a single ingestion cycle and exit
    PollOnce,
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("Failed to load configuration")?;
    init_tracing(&config).context("Failed to initialize tracing")?;

    info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let db = db::init_pool(&config).await?;
    db::run_migrations(&db).await?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Migrate => Ok(()),
        Commands::PollOnce => poll_once(config, db).await,
        Commands::Serve => serve(config, db).await,
    }
}

fn build_poller(
    config: &AppConfig,
    db: &DatabaseConnection,
    source: Arc<dyn TelemetrySource>,
) -> AlertPoller {
    let db = Arc::new(db.clone());
    AlertPoller::new(
        config.poller.clone(),
        config.mirror_map(),
        source,
        Arc::new(DeviceRepository::new(db.clone())),
        Arc::new(AlertRepository::new(db)),
        AlertBoard::new(),
    )
}

async fn poll_once(config: AppConfig, db: DatabaseConnection) -> Result<()> {
    seed_devices(&db, &config.devices).await?;
    let source: Arc<dyn TelemetrySource> =
        Arc::new(ThingSpeakClient::from_config(&config.telemetry_api)?);
    let poller = build_poller(&config, &db, source);

    let report = poller.run_cycle().await?;
    info!(
        devices = report.devices_polled,
        inserted = report.alerts_inserted,
        duplicates = report.duplicates_suppressed + report.duplicates_rejected,
        feed_failures = report.feed_failures,
        write_failures = report.write_failures,
        "Poll cycle finished"
    );
    Ok(())
}

async fn serve(config: AppConfig, db: DatabaseConnection) -> Result<()> {
    seed_devices(&db, &config.devices).await?;

    let config = Arc::new(config);
    let source: Arc<dyn TelemetrySource> =
        Arc::new(ThingSpeakClient::from_config(&config.telemetry_api)?);
    let poller = Arc::new(build_poller(&config, &db, source.clone()));

    let shutdown = CancellationToken::new();
    let poller_task = tokio::spawn(Arc::clone(&poller).run(shutdown.clone()));

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    let state = AppState {
        config,
        db,
        board: poller.board().clone(),
        source,
    };
    let served = run_server(state, shutdown.clone()).await;

    shutdown.cancel();
    if let Err(err) = poller_task.await {
        error!(error = ?err, "Poller task panicked");
    }
    served
}
