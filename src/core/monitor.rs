// src/core/monitor.rs

//! Periodic verification that every active binding's target channel is still
//! writable.

use crate::core::errors::MirrorError;
use crate::core::standby::StandbyPool;
use crate::core::store::Store;
use crate::core::upstream::gateway::UpstreamGateway;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub scanned: usize,
    pub skipped_disabled: usize,
    pub unavailable: usize,
    pub enqueued: usize,
}

pub struct Monitor {
    store: Store,
    gateway: Arc<UpstreamGateway>,
    pool: Arc<StandbyPool>,
}

impl Monitor {
    pub fn new(store: Store, gateway: Arc<UpstreamGateway>, pool: Arc<StandbyPool>) -> Self {
        Self {
            store,
            gateway,
            pool,
        }
    }

    /// One scan pass over all active bindings. Bindings of disabled source
    /// groups or disabled topics are skipped; a failed access check records a
    /// ban and enqueues a recovery. Enqueueing is idempotent, so a binding
    /// that keeps failing produces exactly one queued job at a time.
    pub async fn scan_once(&self) -> Result<ScanReport, MirrorError> {
        let mut report = ScanReport::default();

        for binding in self.store.list_active_bindings().await? {
            report.scanned += 1;
            if !binding.source_enabled || !binding.topic_enabled {
                report.skipped_disabled += 1;
                continue;
            }

            let Err(failure) = self.pool.check_channel_access(binding.channel_chat_id).await
            else {
                continue;
            };

            report.unavailable += 1;
            let reason = failure.to_string();
            self.store
                .add_banned_channel(
                    binding.source_group_id,
                    binding.topic_id,
                    binding.channel_chat_id,
                    &reason,
                )
                .await?;
            let job_id = self
                .store
                .enqueue_recovery(
                    binding.source_group_id,
                    binding.topic_id,
                    binding.channel_chat_id,
                    &reason,
                )
                .await?;
            report.enqueued += 1;

            let source_title = binding
                .source_title
                .clone()
                .unwrap_or_else(|| format!("source_group_id={}", binding.source_group_id));
            let topic_title = binding
                .topic_title
                .clone()
                .unwrap_or_else(|| format!("topic_id={}", binding.topic_id));
            let channel_title = binding
                .channel_title
                .clone()
                .unwrap_or_else(|| format!("channel {}", binding.channel_chat_id));
            self.gateway
                .send_notification(&format!(
                    "⚠️ dead channel detected\n\
                     source group: {source_title} (id={})\n\
                     topic: {topic_title} (topic_id={})\n\
                     old channel: {channel_title} ({})\n\
                     queued for recovery as job #{job_id}",
                    binding.source_group_id, binding.topic_id, binding.channel_chat_id
                ))
                .await;

            warn!(
                "dead channel enqueued: source_group_id={} topic_id={} channel={} job_id={}",
                binding.source_group_id, binding.topic_id, binding.channel_chat_id, job_id
            );
        }

        Ok(report)
    }
}
