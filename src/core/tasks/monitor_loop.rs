// src/core/tasks/monitor_loop.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::core::state::AppState;

/// Drives the periodic binding scan.
pub struct MonitorLoopTask {
    state: Arc<AppState>,
}

impl MonitorLoopTask {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Monitor loop task started.");
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.state.config.monitor_interval_seconds));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Monitor loop shutting down.");
                    return;
                }
            }
        }
    }

    async fn tick(&self) {
        self.state.gateway.purge_expired_logins().await;

        if !self.state.gateway.is_writer_authorized().await {
            debug!("monitor scan skipped: writer not authorized");
            return;
        }
        match self.state.monitor.scan_once().await {
            Ok(report) => {
                if report.unavailable > 0 {
                    warn!(
                        "monitor scan: scanned={} unavailable={} enqueued={}",
                        report.scanned, report.unavailable, report.enqueued
                    );
                } else {
                    debug!(
                        "monitor scan: scanned={} skipped_disabled={}",
                        report.scanned, report.skipped_disabled
                    );
                }
            }
            Err(e) => warn!("monitor scan failed: {}", e),
        }
    }
}
