// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;
use tracing::info;

mod initialization;
pub mod panel_auth;
pub mod routes;
mod spawner;

pub use panel_auth::PanelAuth;

/// The main server startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    let panel_host = config.panel_host.clone();
    let panel_port = config.panel_port;

    // 1. Build the shared state: store, gateway, engines, crash sweep.
    let mut server_context = initialization::setup(config).await?;

    // 2. Spawn all background tasks.
    spawner::spawn_all(&mut server_context).await?;

    // 3. Serve the control panel until shutdown.
    let panel_state = routes::PanelState {
        app: server_context.app.clone(),
        auth: server_context.auth.clone(),
    };
    let router = routes::router(panel_state);

    let addr = format!("{panel_host}:{panel_port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Control panel listening on http://{addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received.");
        })
        .await?;

    // 4. Stop background tasks cooperatively, then drop the sessions.
    let _ = server_context.shutdown_tx.send(());
    while server_context.background_tasks.join_next().await.is_some() {}
    server_context.app.gateway.disconnect().await;
    info!("Shutdown complete.");

    Ok(())
}
