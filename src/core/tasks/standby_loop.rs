// src/core/tasks/standby_loop.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::core::state::AppState;

/// Keeps the standby pool in sync: drains the membership-event stream and
/// re-verifies the current pool.
pub struct StandbyLoopTask {
    state: Arc<AppState>,
}

impl StandbyLoopTask {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Standby refresh task started.");
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.state.config.standby_refresh_seconds));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Standby refresh task shutting down.");
                    return;
                }
            }
        }
    }

    async fn tick(&self) {
        if !self.state.gateway.is_writer_authorized().await {
            debug!("standby refresh skipped: writer not authorized");
            return;
        }

        match self.state.pool.sync_member_updates().await {
            Ok(report) if report.received > 0 || report.bootstrap => {
                info!(
                    "membership sync: bootstrap={} received={} tracked={}",
                    report.bootstrap, report.received, report.tracked_channels
                );
            }
            Ok(_) => {}
            Err(e) => warn!("membership sync failed: {}", e),
        }

        if let Err(e) = self.state.pool.refresh().await {
            warn!("standby refresh failed: {}", e);
        }
    }
}
