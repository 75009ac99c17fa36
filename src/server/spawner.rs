// src/server/spawner.rs

//! Spawns all of the service's long-running background tasks.

use super::initialization::ServerContext;
use crate::core::tasks::listener_loop::ListenerLoopTask;
use crate::core::tasks::monitor_loop::MonitorLoopTask;
use crate::core::tasks::recovery_loop::RecoveryLoopTask;
use crate::core::tasks::standby_loop::StandbyLoopTask;
use anyhow::Result;
use tracing::{info, warn};

/// Spawns all background tasks into the context's JoinSet.
pub async fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let app = &ctx.app;
    let shutdown_tx = &ctx.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;

    let monitor_task = MonitorLoopTask::new(app.clone());
    let shutdown_rx_monitor = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        monitor_task.run(shutdown_rx_monitor).await;
    });

    let standby_task = StandbyLoopTask::new(app.clone());
    let shutdown_rx_standby = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        standby_task.run(shutdown_rx_standby).await;
    });

    let recovery_task = RecoveryLoopTask::new(app.clone());
    let shutdown_rx_recovery = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        recovery_task.run(shutdown_rx_recovery).await;
    });

    // The live listener needs a reader capable of message subscriptions.
    match app
        .gateway
        .reader()
        .transport()
        .subscribe_new_messages()
        .await
    {
        Ok(rx) => {
            let listener_task = ListenerLoopTask::new(app.clone(), rx);
            let shutdown_rx_listener = shutdown_tx.subscribe();
            background_tasks.spawn(async move {
                listener_task.run(shutdown_rx_listener).await;
            });
        }
        Err(e) => {
            warn!("live listener disabled: {}", e);
        }
    }

    info!("All background tasks have been spawned.");
    Ok(())
}
