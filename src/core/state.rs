// src/core/state.rs

//! The shared application state handed to every task and route handler.

use crate::config::Config;
use crate::core::clone::CloneEngine;
use crate::core::errors::MirrorError;
use crate::core::listener::LiveListener;
use crate::core::monitor::Monitor;
use crate::core::recovery::RecoveryWorker;
use crate::core::standby::StandbyPool;
use crate::core::store::Store;
use crate::core::upstream::gateway::UpstreamGateway;
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub gateway: Arc<UpstreamGateway>,
    pub clone: Arc<CloneEngine>,
    pub pool: Arc<StandbyPool>,
    pub monitor: Monitor,
    pub listener: LiveListener,
    pub recovery: RecoveryWorker,
}

impl AppState {
    /// Wires the engines together over one store and one gateway.
    pub async fn new(
        config: Config,
        gateway: Arc<UpstreamGateway>,
    ) -> Result<Arc<Self>, MirrorError> {
        let store = Store::open(&config.database_path).await?;
        let clone = Arc::new(CloneEngine::new(gateway.clone()));
        let pool = Arc::new(StandbyPool::new(store.clone(), gateway.clone()));
        let monitor = Monitor::new(store.clone(), gateway.clone(), pool.clone());
        let listener = LiveListener::new(store.clone(), gateway.clone(), clone.clone());
        let recovery = RecoveryWorker::new(
            store.clone(),
            gateway.clone(),
            clone.clone(),
            pool.clone(),
            config.recovery_max_retry,
        );

        Ok(Arc::new(Self {
            config,
            store,
            gateway,
            clone,
            pool,
            monitor,
            listener,
            recovery,
        }))
    }
}
