//! Jukebox Audio Player (jukebox-ap) - Main entry point
//!
//! Playback daemon for the jukebox: owns the two audio output channels,
//! serves the transport HTTP/SSE API to the UI, and coordinates
//! crossfade/gapless transitions with the jukebox backend.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jukebox_ap::api::{self, AppContext};
use jukebox_ap::channel::{AudioChannel, RodioChannel};
use jukebox_ap::config::EngineConfig;
use jukebox_ap::db;
use jukebox_ap::oracle::BackendOracle;
use jukebox_ap::playback::{start_monitoring, PlaybackEngine};
use jukebox_ap::SharedState;

/// Command-line arguments for jukebox-ap
#[derive(Parser, Debug)]
#[command(name = "jukebox-ap")]
#[command(about = "Audio player daemon for the jukebox")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5750", env = "JUKEBOX_AP_PORT")]
    port: u16,

    /// Base URL of the jukebox backend (transition oracle + streams)
    #[arg(short, long, env = "JUKEBOX_BACKEND_URL")]
    backend_url: String,

    /// Path to the SQLite settings database
    #[arg(short, long, default_value = "jukebox-ap.db", env = "JUKEBOX_AP_DB")]
    database: PathBuf,

    /// Optional TOML file overriding engine timing configuration
    #[arg(short, long, env = "JUKEBOX_AP_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jukebox_ap=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting Jukebox Audio Player on port {}", args.port);
    info!("Backend: {}", args.backend_url);

    // Engine timing configuration (file overrides defaults)
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    // Settings database
    let db_pool = db::init::open_database(&args.database)
        .await
        .context("Failed to open settings database")?;
    config.crossfade_secs = db::settings::get_crossfade_seconds(&db_pool).await?;
    let volume = db::settings::get_volume(&db_pool).await?;

    // Audio output channels
    let (channel_a, channel_b) = RodioChannel::spawn_pair(reqwest::Client::new())
        .context("Failed to initialize audio output")?;
    let channels: [Arc<dyn AudioChannel>; 2] = [Arc::new(channel_a), Arc::new(channel_b)];

    // Oracle client and shared event bus
    let oracle = Arc::new(BackendOracle::new(&args.backend_url)?);
    let state = Arc::new(SharedState::new());

    // Playback engine
    let engine = Arc::new(PlaybackEngine::new(
        channels,
        oracle,
        Arc::clone(&state),
        config,
    ));
    engine.start().await;
    engine.set_volume(volume).await;
    info!("Playback engine initialized (volume {})", volume);

    start_monitoring(Arc::clone(&engine), Arc::clone(&state));

    // HTTP server
    let ctx = AppContext {
        engine: Arc::clone(&engine),
        state,
        db_pool,
        port: args.port,
    };
    let app = api::create_router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    engine.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
