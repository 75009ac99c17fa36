// src/server/initialization.rs

//! Builds the shared application state and everything `run` needs.

use crate::config::Config;
use crate::core::state::AppState;
use crate::core::upstream::botapi::HttpBotTransport;
use crate::core::upstream::gateway::UpstreamGateway;
use crate::core::upstream::transport::Transport;
use crate::server::PanelAuth;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::warn;

pub struct ServerContext {
    pub app: Arc<AppState>,
    pub auth: Arc<PanelAuth>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<()>,
}

pub async fn setup(config: Config) -> Result<ServerContext> {
    std::fs::create_dir_all(&config.sessions_dir)?;

    // Both sessions speak through the transport seam. The shipped transport
    // covers the writer surface and the membership long-poll; an MTProto
    // reader backend plugs in here.
    let reader: Arc<dyn Transport> = Arc::new(HttpBotTransport::new(&config.bot_token));
    let writer: Arc<dyn Transport> = Arc::new(HttpBotTransport::new(&config.bot_token));
    let gateway = Arc::new(UpstreamGateway::new(reader, writer, config.notify_chat_id));

    let auth = Arc::new(PanelAuth::new(
        &config.panel_password,
        config.panel_session_ttl_seconds,
    ));

    let app = AppState::new(config, gateway).await?;

    // Crash sweep: jobs left `running` by a previous process resume as
    // `pending`, keeping their checkpoints.
    let reset = app.store.reset_running_recoveries().await?;
    if reset > 0 {
        warn!("crash sweep: {} running recovery job(s) reset to pending", reset);
    }

    let (shutdown_tx, _) = broadcast::channel(1);
    Ok(ServerContext {
        app,
        auth,
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}
