// src/core/clone/history.rs

//! Streaming topic-history clone with checkpointing and cooperative
//! cancellation.

use super::{CloneEngine, in_topic, is_cloneable};
use crate::core::errors::MirrorError;
use crate::core::upstream::session::retry_flood_wait;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::info;

/// Messages fetched per history page.
const PAGE_LIMIT: usize = 100;
/// Progress is persisted after this many processed units.
const PROGRESS_EVERY_UNITS: u32 = 5;
/// Pause between units: yields the scheduler and eases upstream pressure.
const UNIT_PAUSE: Duration = Duration::from_millis(30);

/// Caller hooks driving checkpoint persistence and cancellation.
///
/// `progress` may fail (or observe a stop request and return
/// [`MirrorError::Stopped`]); the loop propagates either immediately. After
/// any successful `progress` call the reported checkpoint must be durable.
#[async_trait]
pub trait HistoryHooks: Send + Sync {
    async fn progress(&self, last_cloned_message_id: i64) -> Result<(), MirrorError>;

    async fn should_stop(&self) -> bool;
}

/// Hooks for callers that need neither checkpoints nor cancellation.
pub struct NoopHooks;

#[async_trait]
impl HistoryHooks for NoopHooks {
    async fn progress(&self, _last_cloned_message_id: i64) -> Result<(), MirrorError> {
        Ok(())
    }

    async fn should_stop(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HistoryReport {
    pub total: u64,
    pub cloned: u64,
    pub skipped: u64,
    pub started_min_id: i64,
    pub last_cloned_message_id: i64,
}

impl CloneEngine {
    /// Replays a topic's history into the target channel.
    ///
    /// Iterates the source in ascending id order starting past
    /// `max(start_message_id, topic_id)`; nothing before the topic root can
    /// belong to the topic. Albums are collected and
    /// cloned atomically; a failed unit aborts the run so the checkpoint never
    /// advances past a failure.
    pub async fn clone_topic_history(
        &self,
        source_chat_id: i64,
        topic_id: i64,
        target_channel: i64,
        start_message_id: i64,
        hooks: &dyn HistoryHooks,
    ) -> Result<HistoryReport, MirrorError> {
        let effective_start = start_message_id.max(topic_id);
        let mut report = HistoryReport {
            started_min_id: effective_start,
            last_cloned_message_id: effective_start,
            ..HistoryReport::default()
        };

        let reader = self.gateway().reader().transport();
        let mut cursor = effective_start;
        let mut highest_seen = effective_start;
        let mut seen_groups: HashSet<i64> = HashSet::new();
        let mut units_since_progress = 0_u32;

        loop {
            let min_id = cursor;
            let page = retry_flood_wait(|| async move {
                reader
                    .iter_messages(source_chat_id, min_id, PAGE_LIMIT)
                    .await
            })
            .await
            .map_err(MirrorError::from)?;
            if page.is_empty() {
                break;
            }

            for message in page {
                if hooks.should_stop().await {
                    report.last_cloned_message_id = highest_seen;
                    return Err(MirrorError::Stopped);
                }

                cursor = cursor.max(message.id);
                highest_seen = highest_seen.max(message.id);

                if !in_topic(&message, topic_id) {
                    continue;
                }

                if let Some(group_id) = message.grouped_id {
                    if seen_groups.contains(&group_id) {
                        // Sibling of a group already cloned as a unit.
                        continue;
                    }
                    seen_groups.insert(group_id);

                    let group = self.collect_media_group(source_chat_id, &message).await?;
                    let cloneable = group.iter().filter(|m| is_cloneable(m)).count() as u64;
                    if !self.clone_media_group(target_channel, &group).await? {
                        let ids: Vec<i64> = group.iter().map(|m| m.id).collect();
                        return Err(MirrorError::Upstream(format!(
                            "media group {group_id} failed to clone (messages {ids:?})"
                        )));
                    }
                    report.total += group.len() as u64;
                    report.cloned += cloneable;
                    report.skipped += group.len() as u64 - cloneable;
                } else {
                    report.total += 1;
                    if is_cloneable(&message) {
                        if !self.clone_no_ref(&message, target_channel).await? {
                            return Err(MirrorError::Upstream(format!(
                                "message {} failed to clone",
                                message.id
                            )));
                        }
                        report.cloned += 1;
                    } else {
                        report.skipped += 1;
                    }
                }

                units_since_progress += 1;
                if units_since_progress >= PROGRESS_EVERY_UNITS {
                    hooks.progress(highest_seen).await?;
                    units_since_progress = 0;
                }

                tokio::time::sleep(UNIT_PAUSE).await;
            }
        }

        report.last_cloned_message_id = highest_seen;
        hooks.progress(highest_seen).await?;

        info!(
            "history clone finished: source={} topic={} target={} total={} cloned={} skipped={}",
            source_chat_id, topic_id, target_channel, report.total, report.cloned, report.skipped
        );
        Ok(report)
    }
}
