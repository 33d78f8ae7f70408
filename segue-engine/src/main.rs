//! Segue Engine - main entry point
//!
//! Playback engine service for the Segue music aggregator: owns the
//! audio output, the equalizer graph, crossfading, stream fallback
//! resolution, and queue continuity, exposed over HTTP/SSE.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use segue_engine::api;
use segue_engine::config;
use segue_engine::engine::PlayerEngine;
use segue_engine::output::{RodioOutput, SharedOutput, SimOutput};
use segue_engine::resolver::http::RestProvider;
use segue_engine::resolver::StreamProvider;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "segue-engine")]
#[command(about = "Playback engine for the Segue music aggregator")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "segue.toml", env = "SEGUE_CONFIG")]
    config: PathBuf,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "SEGUE_PORT")]
    port: Option<u16>,

    /// Database path (overrides config)
    #[arg(short, long, env = "SEGUE_DATABASE")]
    database: Option<PathBuf>,

    /// Run without an audio device (simulated output, in-memory database
    /// unless --database is given)
    #[arg(long)]
    no_audio: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "segue_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = config::load_config(&args.config).context("Failed to load configuration")?;
    let port = args.port.unwrap_or(config.port);
    let database_path = args.database.clone().unwrap_or(config.database_path.clone());

    info!("Starting Segue engine on port {}", port);

    let db = if args.no_audio && args.database.is_none() {
        segue_engine::db::open_in_memory()
            .await
            .context("Failed to open in-memory database")?
    } else {
        segue_engine::db::open(&database_path)
            .await
            .with_context(|| format!("Failed to open database {}", database_path.display()))?
    };

    let providers: Vec<Arc<dyn StreamProvider>> = config
        .providers
        .iter()
        .map(|p| {
            Arc::new(RestProvider::new(
                p.name.clone(),
                p.base_url.clone(),
                p.platform,
            )) as Arc<dyn StreamProvider>
        })
        .collect();
    info!("{} stream provider(s) configured", providers.len());

    let outputs: [SharedOutput; 2] = if args.no_audio {
        [Arc::new(SimOutput::new(0)), Arc::new(SimOutput::new(1))]
    } else {
        [Arc::new(RodioOutput::new(0)), Arc::new(RodioOutput::new(1))]
    };

    let engine = PlayerEngine::new(db, providers, outputs)
        .await
        .context("Failed to initialize playback engine")?;
    engine.start();
    info!("Playback engine initialized");

    let app_state = api::AppState {
        engine: engine.clone(),
        port,
    };
    let app = api::create_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
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
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
