//! musi playback orchestrator (musi-player) - Main entry point
//!
//! Wires the track store, catalog, sink factory and session registry
//! together and serves the HTTP control surface until shutdown.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use musi_common::config::load_config;
use musi_common::db::{init_database, TrackStore};
use musi_player::api::{self, AppContext};
use musi_player::catalog::YtDlpCatalog;
use musi_player::commands::CommandHandler;
use musi_player::controller::Services;
use musi_player::events::EventBus;
use musi_player::ingest::PlaylistIngestion;
use musi_player::probe::HttpProbe;
use musi_player::registry::SessionRegistry;
use musi_player::retry::{Backoff, RetryPolicy};
use musi_player::sink::FfmpegSinkFactory;
use musi_player::voice::{UserId, VoiceRoster};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for musi-player
#[derive(Parser, Debug)]
#[command(name = "musi-player")]
#[command(about = "Playback orchestrator for the musi voice-chat bot")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = "MUSI_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "MUSI_PORT")]
    port: Option<u16>,

    /// SQLite database file (overrides config)
    #[arg(long, env = "MUSI_DB_PATH")]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(db_path) = args.db_path {
        config.db_path = Some(db_path);
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "musi_player={0},musi_common={0},tower_http=info",
                    config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting musi-player v{}", env!("CARGO_PKG_VERSION"));

    let db_path = config.resolved_db_path();
    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let store = TrackStore::new(pool);
    info!("Database ready at {}", db_path.display());

    let catalog = Arc::new(YtDlpCatalog::new(
        config.ytdlp_path.clone(),
        config.ytdlp_timeout(),
        store.clone(),
    ));
    let probe = Arc::new(HttpProbe::new(config.probe_timeout()).context("Failed to build probe")?);
    let events = EventBus::new();

    let services = Services {
        catalog: catalog.clone(),
        probe,
        events: events.clone(),
        retry: RetryPolicy::fixed(config.attach_attempts, config.attach_delay()),
    };

    let sinks = Arc::new(FfmpegSinkFactory::new(
        config.ffmpeg_path.clone(),
        config.sink_output_dir.clone(),
    ));
    let registry = Arc::new(SessionRegistry::new(services, sinks, config.vote_timeout()));

    let ingestion = Arc::new(PlaylistIngestion::new(
        catalog,
        store,
        RetryPolicy {
            max_attempts: 2,
            backoff: Backoff::Exponential {
                initial: Duration::from_secs(1),
                max: Duration::from_secs(8),
            },
        },
        config.playlist_ceiling,
    ));

    let commands = Arc::new(CommandHandler::new(
        registry,
        Arc::new(VoiceRoster::new()),
        ingestion,
        UserId(config.bot_user_id),
        config.queue_page_size,
    ));

    let app = api::create_router(AppContext { commands, events });

    let addr: SocketAddr = format!("{}:{}", config.bind_addr, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.bind_addr, config.port))?;
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
