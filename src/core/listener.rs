// src/core/listener.rs

//! The live pipeline: new messages from the reader subscription are routed to
//! their bound target channel as they arrive.

use crate::core::clone::{CloneEngine, extract_topic_id};
use crate::core::errors::MirrorError;
use crate::core::store::Store;
use crate::core::upstream::gateway::UpstreamGateway;
use crate::core::upstream::message::UpstreamMessage;
use std::sync::Arc;
use tracing::error;

pub struct LiveListener {
    store: Store,
    gateway: Arc<UpstreamGateway>,
    clone: Arc<CloneEngine>,
}

impl LiveListener {
    pub fn new(store: Store, gateway: Arc<UpstreamGateway>, clone: Arc<CloneEngine>) -> Self {
        Self {
            store,
            gateway,
            clone,
        }
    }

    /// Handles one live message. Never propagates: any error is logged here so
    /// the subscription stays alive.
    pub async fn on_new_message(&self, message: UpstreamMessage) {
        if let Err(e) = self.route(message).await {
            error!("live clone failed: {}", e);
        }
    }

    async fn route(&self, message: UpstreamMessage) -> Result<(), MirrorError> {
        if message.chat_id == 0 {
            return Ok(());
        }
        let Some(source_group) = self
            .store
            .get_source_group_by_chat_id(message.chat_id)
            .await?
        else {
            return Ok(());
        };
        if !source_group.enabled {
            return Ok(());
        }

        // Root posts of a topic carry no threading header; they are the topic.
        let topic_id = extract_topic_id(&message).unwrap_or(message.id);
        if topic_id == 0 {
            return Ok(());
        }
        let Some(topic) = self.store.get_topic(source_group.id, topic_id).await? else {
            return Ok(());
        };
        if !topic.enabled {
            return Ok(());
        }

        let Some(binding) = self.store.get_binding(source_group.id, topic_id).await? else {
            return Ok(());
        };
        if !binding.active {
            return Ok(());
        }

        match self
            .clone
            .clone_no_ref(&message, binding.channel_chat_id)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_channel_unavailable() => {
                let reason = e.to_string();
                self.store
                    .add_banned_channel(
                        source_group.id,
                        topic_id,
                        binding.channel_chat_id,
                        &reason,
                    )
                    .await?;
                let job_id = self
                    .store
                    .enqueue_recovery(
                        source_group.id,
                        topic_id,
                        binding.channel_chat_id,
                        &reason,
                    )
                    .await?;
                self.gateway
                    .send_notification(&format!(
                        "⚠️ live clone hit a dead channel\n\
                         source_group_id={} topic_id={topic_id}\n\
                         old channel={}\n\
                         queued for recovery as job #{job_id}",
                        source_group.id, binding.channel_chat_id
                    ))
                    .await;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
