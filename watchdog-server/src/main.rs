//! watchdog-server - stream catalog, video relay and alert service
//!
//! Serves the monitoring dashboards: registers camera streams, relays them
//! to browsers over WebSocket through ffmpeg, and turns the dashboards'
//! detection frames into alerts pushed over SSE.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use watchdog_common::config::{resolve_root_folder, TomlConfig};
use watchdog_common::db::{init_database, reset_active_streams};
use watchdog_common::events::EventBus;
use watchdog_server::alerts::{AlertEngine, AlertSettings};
use watchdog_server::relay::{spawn_status_recorder, FfmpegTranscoder, RelaySettings, StreamManager};
use watchdog_server::{build_app, AppState, EVENT_BUS_CAPACITY};

/// Command-line arguments for watchdog-server
#[derive(Parser, Debug)]
#[command(name = "watchdog-server")]
#[command(about = "Stream relay and detection alert service")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "WATCHDOG_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides the config file)
    #[arg(long, env = "WATCHDOG_BIND_ADDRESS")]
    bind: Option<String>,

    /// Root folder holding the database and config file
    #[arg(short, long, env = "WATCHDOG_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Explicit configuration file
    #[arg(short, long, env = "WATCHDOG_CONFIG")]
    config: Option<PathBuf>,

    /// ffmpeg executable
    #[arg(long, env = "WATCHDOG_FFMPEG")]
    ffmpeg: Option<String>,

    /// Directory of dashboard assets to serve
    #[arg(long, env = "WATCHDOG_STATIC_DIR")]
    static_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let root_folder = resolve_root_folder(args.root_folder.as_deref());
    let config_path = TomlConfig::locate(&root_folder, args.config.as_deref());

    // Read the config before tracing starts so its log level applies;
    // problems are reported once the subscriber is up
    let (mut config, config_problem) = match &config_path {
        Some(path) if path.exists() => match TomlConfig::load(path) {
            Ok(config) => (config, None),
            Err(e) => (TomlConfig::default(), Some(e.to_string())),
        },
        Some(path) => (
            TomlConfig::default(),
            Some(format!("{} not found", path.display())),
        ),
        None => (TomlConfig::default(), None),
    };

    let level = config.logging.level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "watchdog_server={level},watchdog_common={level},tower_http={level}"
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Watchdog server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match (&config_path, config_problem) {
        (_, Some(problem)) => warn!("Ignoring configuration ({}), using defaults", problem),
        (Some(path), None) => info!("Configuration: {}", path.display()),
        (None, None) => info!("No configuration file found, using compiled defaults"),
    }

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(ffmpeg) = args.ffmpeg {
        config.relay.ffmpeg_path = ffmpeg;
    }

    info!("Root folder: {}", root_folder.display());
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;

    let db_path = config.database_path(&root_folder);
    info!("Database path: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize stream catalog")?;
    let stale = reset_active_streams(&pool)
        .await
        .context("Failed to reset stream statuses")?;
    if stale > 0 {
        info!("Marked {} streams inactive from the previous run", stale);
    }

    let events = EventBus::new(EVENT_BUS_CAPACITY);

    info!("Transcoder: {}", config.relay.ffmpeg_path);
    let relays = StreamManager::new(
        Arc::new(FfmpegTranscoder::new(config.relay.ffmpeg_path.clone())),
        events.clone(),
        RelaySettings::from(&config.relay),
    );
    let recorder = spawn_status_recorder(pool.clone(), &events, &relays);
    let alerts = AlertEngine::new(events.clone(), AlertSettings::from(&config.alerts));

    let state = AppState::new(pool, relays.clone(), alerts, events);

    let static_dir = args.static_dir.or_else(|| config.static_dir(&root_folder));
    match &static_dir {
        Some(dir) if dir.is_dir() => info!("Serving dashboard from {}", dir.display()),
        Some(dir) => warn!("Static directory {} does not exist", dir.display()),
        None => {}
    }
    let app = build_app(state, static_dir.as_deref());

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_address))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("watchdog-server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    relays.shutdown().await;
    // Let the recorder persist the final RelayStopped events
    drop(relays);
    if tokio::time::timeout(std::time::Duration::from_secs(2), recorder)
        .await
        .is_err()
    {
        warn!("Status recorder did not finish before shutdown");
    }
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
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
