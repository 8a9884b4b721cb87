use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use huddle::audio::{CaptureConfig, DefaultCaptureFactory};
use huddle::{
    create_router, AppState, Config, ErrorRecoveryCoordinator, SessionManager, SessionStore,
    WhisperCliBridge,
};

#[derive(Parser, Debug)]
#[command(name = "huddle", about = "Meeting recording session manager")]
struct Args {
    /// Path to the config file (without extension)
    #[arg(short, long, default_value = "config/huddle")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} starting", cfg.service.name);
    info!("Data root: {}", cfg.storage.data_root);

    let store = SessionStore::open(Path::new(&cfg.storage.data_root))?;

    let bridge = Arc::new(WhisperCliBridge::new(
        cfg.transcription.binary.clone(),
        PathBuf::from(&cfg.transcription.model_path),
        cfg.transcription.language.clone(),
    ));

    let capture_config = CaptureConfig {
        sample_rate: cfg.audio.sample_rate,
        channels: cfg.audio.channels,
    };

    let (error_tx, error_rx) = mpsc::unbounded_channel();

    let manager = SessionManager::new(
        store,
        bridge,
        Arc::new(DefaultCaptureFactory),
        capture_config,
        cfg.recording.clone(),
        error_tx,
    );

    // Sessions cut off by a previous crash become retryable now.
    let recovered = manager.recover_interrupted()?;
    if !recovered.is_empty() {
        info!("{} interrupted session(s) available for retry", recovered.len());
    }

    let coordinator = ErrorRecoveryCoordinator::new(Arc::clone(&manager));
    coordinator.spawn_error_listener(error_rx);

    let app = create_router(AppState::new(Arc::clone(&manager)));
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);

    info!("HTTP server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let finalize_ok = coordinator.wait_for_shutdown().await;
            if !finalize_ok {
                warn!("Recording finalize did not complete cleanly before shutdown");
            }
        })
        .await?;

    info!("Shutdown complete");
    Ok(())
}
