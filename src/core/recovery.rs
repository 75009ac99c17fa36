// src/core/recovery.rs

//! The recovery worker: claims one job at a time, promotes a standby channel,
//! rebinds, and replays the topic history from the checkpoint.

use crate::core::clone::{CloneEngine, HistoryHooks};
use crate::core::errors::MirrorError;
use crate::core::standby::StandbyPool;
use crate::core::store::{RecoveryJobRow, Store};
use crate::core::upstream::gateway::UpstreamGateway;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

/// Persists the checkpoint and surfaces stop requests at every progress point.
struct CheckpointHooks {
    store: Store,
    job_id: i64,
}

#[async_trait]
impl HistoryHooks for CheckpointHooks {
    async fn progress(&self, last_cloned_message_id: i64) -> Result<(), MirrorError> {
        self.store
            .update_recovery_progress(self.job_id, last_cloned_message_id)
            .await?;
        if self.store.is_stop_requested(self.job_id).await? {
            return Err(MirrorError::Stopped);
        }
        Ok(())
    }

    async fn should_stop(&self) -> bool {
        self.store
            .is_stop_requested(self.job_id)
            .await
            .unwrap_or(false)
    }
}

pub struct RecoveryWorker {
    store: Store,
    gateway: Arc<UpstreamGateway>,
    clone: Arc<CloneEngine>,
    pool: Arc<StandbyPool>,
    max_retry: u32,
}

impl RecoveryWorker {
    pub fn new(
        store: Store,
        gateway: Arc<UpstreamGateway>,
        clone: Arc<CloneEngine>,
        pool: Arc<StandbyPool>,
        max_retry: u32,
    ) -> Self {
        Self {
            store,
            gateway,
            clone,
            pool,
            max_retry,
        }
    }

    /// Claims one job (a specific one, or the oldest pending) and drives it to
    /// a terminal state. Returns whether a job was processed. The worker is
    /// the only component that moves a job out of `running`.
    pub async fn run_once(&self, job_id: Option<i64>) -> Result<bool, MirrorError> {
        let job = match job_id {
            Some(id) => Some(self.store.claim_recovery_by_id(id).await?),
            None => self.store.claim_next_recovery().await?,
        };
        let Some(job) = job else {
            return Ok(false);
        };

        match self.execute(&job).await {
            Ok(()) => Ok(true),
            Err(MirrorError::Stopped) => {
                info!("recovery job {} stopped at its checkpoint", job.id);
                self.store
                    .mark_recovery_stopped(job.id, "stopped by operator")
                    .await?;
                self.gateway
                    .send_notification(&format!(
                        "⏸️ recovery stopped\njob #{} (source_group_id={} topic_id={})\n\
                         resumable from the saved checkpoint",
                        job.id, job.source_group_id, job.topic_id
                    ))
                    .await;
                Ok(true)
            }
            Err(e) => {
                error!("recovery job {} failed: {}", job.id, e);
                self.store
                    .mark_recovery_failed(job.id, job.retry_count, &e.to_string(), self.max_retry)
                    .await?;
                self.gateway
                    .send_notification(&format!(
                        "❌ recovery failed\njob #{}\nsource_group_id={} topic_id={}\nerror: {:.300}",
                        job.id,
                        job.source_group_id,
                        job.topic_id,
                        e.to_string()
                    ))
                    .await;
                Ok(true)
            }
        }
    }

    async fn execute(&self, job: &RecoveryJobRow) -> Result<(), MirrorError> {
        let source_group = self
            .store
            .get_source_group_by_id(job.source_group_id)
            .await?
            .ok_or_else(|| {
                MirrorError::Precondition(format!(
                    "source group {} no longer exists",
                    job.source_group_id
                ))
            })?;
        let topic = self
            .store
            .get_topic(job.source_group_id, job.topic_id)
            .await?
            .ok_or_else(|| {
                MirrorError::Precondition(format!("topic {} no longer exists", job.topic_id))
            })?;

        let new_channel_id = match job.new_channel_chat_id {
            // Manual jobs arrive with their target already chosen.
            Some(assigned) => assigned,
            None => {
                let standby = self.store.consume_next_standby().await?.ok_or_else(|| {
                    MirrorError::Precondition("no standby channel available".to_string())
                })?;
                self.pool
                    .rename_channel(standby.chat_id, &topic.title)
                    .await?;
                self.store
                    .detach_channel_bindings(job.old_channel_chat_id)
                    .await?;
                self.store
                    .upsert_binding(job.source_group_id, job.topic_id, standby.chat_id)
                    .await?;
                self.store
                    .mark_recovery_assigned_channel(job.id, standby.chat_id)
                    .await?;
                standby.chat_id
            }
        };

        let hooks = CheckpointHooks {
            store: self.store.clone(),
            job_id: job.id,
        };
        let stats = self
            .clone
            .clone_topic_history(
                source_group.chat_id,
                job.topic_id,
                new_channel_id,
                job.last_cloned_message_id,
                &hooks,
            )
            .await?;

        let summary = format!(
            "recovery complete, cloned={}, total={}, skipped={}, resumed_from={}",
            stats.cloned, stats.total, stats.skipped, job.last_cloned_message_id
        );
        self.store
            .mark_recovery_done(
                job.id,
                new_channel_id,
                &summary,
                Some(stats.last_cloned_message_id),
            )
            .await?;
        self.gateway
            .send_notification(&format!(
                "✅ channel recovery complete\n\
                 source_group_id={} topic_id={}\n\
                 old channel={}\nnew channel={new_channel_id}\n{summary}",
                job.source_group_id, job.topic_id, job.old_channel_chat_id
            ))
            .await;
        self.store
            .remove_banned_channel(job.source_group_id, job.topic_id, job.old_channel_chat_id)
            .await?;
        self.store.delete_recovery_job(job.id).await?;

        Ok(())
    }
}
