// src/core/tasks/recovery_loop.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::core::state::AppState;

/// Idle/backoff pause when there is nothing to do or a claim failed.
const IDLE_PAUSE: Duration = Duration::from_secs(2);

/// Pulls recovery jobs one at a time. At most one job executes at any moment.
pub struct RecoveryLoopTask {
    state: Arc<AppState>,
}

impl RecoveryLoopTask {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Recovery loop task started.");
        loop {
            tokio::select! {
                _ = self.tick() => {}
                _ = shutdown_rx.recv() => {
                    info!("Recovery loop shutting down.");
                    return;
                }
            }
        }
    }

    async fn tick(&self) {
        // Both sessions are needed: the reader replays history, the writer
        // posts it.
        if !self.state.gateway.is_writer_authorized().await
            || !self.state.gateway.is_reader_authorized().await
        {
            tokio::time::sleep(IDLE_PAUSE).await;
            return;
        }

        match self.state.recovery.run_once(None).await {
            Ok(true) => {}
            Ok(false) => tokio::time::sleep(IDLE_PAUSE).await,
            Err(e) => {
                warn!("recovery loop iteration failed: {}", e);
                tokio::time::sleep(IDLE_PAUSE).await;
            }
        }
    }
}
