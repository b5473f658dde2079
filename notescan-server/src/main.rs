//! notescan-server - sheet-music image to MIDI conversion service
//!
//! Accepts image uploads over HTTP, runs the configured OMR engine and
//! MusicXML translator, and returns (or stores, for background jobs) the MIDI.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use notescan_common::config::{
    OmrEngineKind, RootFolderInitializer, RootFolderResolver, TomlConfig, TranslatorKind,
};
use notescan_common::events::EventBus;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use notescan_server::pipeline::ConversionPipeline;
use notescan_server::{AppState, UploadSettings};

/// Command-line arguments for notescan-server
#[derive(Parser, Debug)]
#[command(name = "notescan-server")]
#[command(about = "Sheet-music image to MIDI conversion service")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides config)
    #[arg(short, long, env = "NOTESCAN_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides config)
    #[arg(long, env = "NOTESCAN_HOST")]
    host: Option<String>,

    /// Root folder holding uploads and conversion output
    #[arg(short, long, env = "NOTESCAN_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Config file (default: ~/.config/notescan/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// OMR engine: audiveris, oemer or demo (overrides config)
    #[arg(long)]
    engine: Option<OmrEngineKind>,

    /// MusicXML translator: builtin or command (overrides config)
    #[arg(long)]
    translator: Option<TranslatorKind>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config comes first so its log level applies; RUST_LOG still wins
    let (mut config, config_path) =
        TomlConfig::discover(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.logging.level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting notescan-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_path {
        Some(path) => info!("Config: {}", path.display()),
        None => info!("Config: built-in defaults"),
    }

    if let Some(engine) = args.engine {
        config.omr.engine = engine;
    }
    if let Some(translator) = args.translator {
        config.translator.kind = translator;
    }

    let root_folder = RootFolderResolver::new(args.root_folder, &config).resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", initializer.root().display());

    let pipeline = ConversionPipeline::from_config(&config, &initializer);
    info!(
        engine = pipeline.engine_name(),
        translator = pipeline.translator_name(),
        "Conversion pipeline ready"
    );
    match pipeline.check().await {
        Ok(detail) => info!("OMR toolchain: {}", detail),
        Err(e) => warn!("OMR toolchain not ready, conversions will fail: {}", e),
    }

    let uploads = UploadSettings {
        uploads_dir: initializer.uploads_dir(),
        default_test_image: initializer.resolve_path(&config.server.default_test_image),
        max_upload_bytes: config.server.max_upload_bytes,
    };

    let event_bus = EventBus::new(100);
    let state = AppState::new(pipeline, event_bus, uploads);
    let app = notescan_server::build_router(state);

    let host = args.host.unwrap_or(config.server.host);
    let port = args.port.unwrap_or(config.server.port);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
