#![forbid(unsafe_code)]

//! `booking-relay` — reservation notification relay binary.
//!
//! Bootstraps configuration, connects the database, starts the reminder
//! worker, and serves the booking and provider webhook endpoints.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use booking_relay::config::GlobalConfig;
use booking_relay::http::{self, AppState};
use booking_relay::persistence::db;
use booking_relay::provider::client::ProviderClient;
use booking_relay::provider::MessageSender;
use booking_relay::relay::ingest::EventIngestor;
use booking_relay::relay::status::StatusCorrelator;
use booking_relay::relay::worker::ReminderWorker;
use booking_relay::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "booking-relay", about = "Reservation notification relay", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("booking-relay bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.load_credentials()?;
    let config = Arc::new(config);
    config.log_summary();

    // ── Initialize database ─────────────────────────────
    let db = Arc::new(db::connect(&config.db_path).await?);
    info!("database connected");

    // ── Build provider client and pipelines ─────────────
    let sender: Arc<dyn MessageSender> =
        Arc::new(ProviderClient::new(config.whatsapp.clone())?);
    let ingestor = Arc::new(EventIngestor::new(
        Arc::clone(&db),
        Arc::clone(&config),
        Arc::clone(&sender),
    ));
    let correlator = StatusCorrelator::new(Arc::clone(&db));

    // ── Start reminder worker ───────────────────────────
    let ct = CancellationToken::new();
    let worker = Arc::new(ReminderWorker::new(
        Arc::clone(&db),
        Arc::clone(&config),
        Arc::clone(&sender),
    ));
    let worker_handle = worker.spawn(ct.clone());
    info!("reminder worker started");

    // ── Start webhook server ────────────────────────────
    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        ingestor,
        correlator,
    });

    let http_ct = ct.clone();
    let http_handle = tokio::spawn(async move {
        if let Err(err) = http::serve(state, http_ct).await {
            error!(%err, "webhook server failed");
        }
    });

    info!("booking-relay ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    let _ = tokio::join!(http_handle, worker_handle);
    info!("booking-relay shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
