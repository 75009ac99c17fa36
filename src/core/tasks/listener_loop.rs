// src/core/tasks/listener_loop.rs

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::info;

use crate::core::state::AppState;
use crate::core::upstream::message::UpstreamMessage;

/// Feeds the live listener from the reader's new-message subscription.
///
/// Events are handled in delivery order; one clone fully completes before the
/// next event is dequeued.
pub struct ListenerLoopTask {
    state: Arc<AppState>,
    rx: mpsc::Receiver<UpstreamMessage>,
}

impl ListenerLoopTask {
    pub fn new(state: Arc<AppState>, rx: mpsc::Receiver<UpstreamMessage>) -> Self {
        Self { state, rx }
    }

    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Live listener task started.");
        loop {
            tokio::select! {
                message = self.rx.recv() => {
                    match message {
                        Some(message) => self.state.listener.on_new_message(message).await,
                        None => {
                            info!("Live listener subscription closed.");
                            return;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Live listener shutting down.");
                    return;
                }
            }
        }
    }
}
