//! Routes asynchronous failure signals into the state machine.
//!
//! The capture thread must never call state-mutating methods directly: its
//! error callback only flips the per-session debounce flag and pushes the
//! message into a channel. This coordinator drains that channel in the
//! orchestration context and drives the corresponding transition exactly
//! once per session. The process shutdown signal funnels through the same
//! component.

use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::session::SessionManager;

pub struct ErrorRecoveryCoordinator {
    manager: Arc<SessionManager>,
}

impl ErrorRecoveryCoordinator {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    /// Consumes capture-stream errors until the channel closes. Each
    /// message becomes a `handle_mic_disconnect` call; events arriving
    /// after the session has left Recording are no-ops inside the manager.
    pub fn spawn_error_listener(
        &self,
        mut error_rx: UnboundedReceiver<String>,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(&self.manager);

        tokio::spawn(async move {
            while let Some(message) = error_rx.recv().await {
                warn!("Capture stream error received: {}", message);
                manager.handle_mic_disconnect(&message).await;
            }
            info!("Capture error listener stopped");
        })
    }

    /// Blocks until the process receives ctrl-c, then interrupts any
    /// active recording. Returns whether the WAV finalize succeeded so the
    /// caller can decide whether to delay process exit.
    pub async fn wait_for_shutdown(&self) -> bool {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            return self.manager.handle_app_shutdown().await;
        }

        info!("Shutdown signal received");
        self.manager.handle_app_shutdown().await
    }
}
