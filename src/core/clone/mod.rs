// src/core/clone/mod.rs

//! The clone engine.
//!
//! Three properties hold everywhere: anonymisation (the destination shows no
//! forward header or original author), album atomicity (messages sharing a
//! group id are delivered as one album or fail as a unit), and resumability
//! (after any progress call, the reported checkpoint is durable).

pub mod album;
pub mod history;

pub use history::{HistoryHooks, HistoryReport, NoopHooks};

use crate::core::errors::MirrorError;
use crate::core::upstream::gateway::UpstreamGateway;
use crate::core::upstream::message::{MediaKind, UpstreamMessage};
use crate::core::upstream::session::retry_flood_wait;
use crate::core::upstream::transport::OutgoingFile;
use std::sync::Arc;
use tracing::debug;

/// Topic id carried by a message's threading header, if any.
pub fn extract_topic_id(message: &UpstreamMessage) -> Option<i64> {
    let reply = message.reply_to.as_ref()?;
    if let Some(top_id) = reply.reply_to_top_id
        && top_id != 0
    {
        return Some(top_id);
    }
    if reply.forum_topic
        && let Some(msg_id) = reply.reply_to_msg_id
        && msg_id != 0
    {
        return Some(msg_id);
    }
    None
}

/// Whether a message belongs to a topic. The topic root message itself (no
/// threading header, id equal to the topic id) counts as a member.
pub fn in_topic(message: &UpstreamMessage, topic_id: i64) -> bool {
    match extract_topic_id(message) {
        Some(id) => id == topic_id,
        None => message.reply_to.is_none() && message.id == topic_id,
    }
}

/// A message is cloneable iff it has no service action, is not deleted, and
/// has either media or non-empty text.
pub fn is_cloneable(message: &UpstreamMessage) -> bool {
    if message.is_service() || message.deleted {
        return false;
    }
    message.media().is_some() || !message.text().trim().is_empty()
}

pub struct CloneEngine {
    gateway: Arc<UpstreamGateway>,
}

impl CloneEngine {
    pub fn new(gateway: Arc<UpstreamGateway>) -> Self {
        Self { gateway }
    }

    pub(crate) fn gateway(&self) -> &UpstreamGateway {
        &self.gateway
    }

    /// Clones one message to the target without any reference to its origin.
    ///
    /// Forward-with-drop-author first; on failure a copy is posted, trying the
    /// media reference directly before downloading and re-uploading. Every
    /// step absorbs one flood-wait; a clone that still cannot land returns
    /// `false`. History mode treats `false` as a hard error so the checkpoint
    /// stays correct.
    pub async fn clone_no_ref(
        &self,
        message: &UpstreamMessage,
        target_channel: i64,
    ) -> Result<bool, MirrorError> {
        if !is_cloneable(message) {
            return Ok(false);
        }

        let writer = self.gateway.writer().transport();
        let forward = retry_flood_wait(|| async move {
            writer
                .forward_messages(message.chat_id, target_channel, &[message.id], true)
                .await
        })
        .await;
        match forward {
            Ok(()) => return Ok(true),
            Err(e) if e.flood_seconds().is_some() => return Ok(false),
            Err(e) => {
                debug!(
                    "forward of message {} failed ({}), falling back to copy",
                    message.id, e
                );
            }
        }

        self.copy_message(message, target_channel).await
    }

    /// The copy fallback: posts a fresh message carrying the same content.
    async fn copy_message(
        &self,
        message: &UpstreamMessage,
        target_channel: i64,
    ) -> Result<bool, MirrorError> {
        let writer = self.gateway.writer().transport();
        let caption = message.text();
        let entities = message.entities();

        let Some(media) = message.media() else {
            if caption.trim().is_empty() {
                return Ok(false);
            }
            return match retry_flood_wait(|| async move {
                writer.send_message(target_channel, caption, entities).await
            })
            .await
            {
                Ok(_) => Ok(true),
                Err(e) if e.flood_seconds().is_some() => Ok(false),
                Err(e) => Err(e.into()),
            };
        };

        // Re-sending the provider-side reference avoids the download entirely
        // when the reference is still valid.
        let by_reference = retry_flood_wait(|| async move {
            writer
                .send_file(
                    target_channel,
                    OutgoingFile::Reference(media),
                    caption,
                    entities,
                )
                .await
        })
        .await;
        match by_reference {
            Ok(_) => return Ok(true),
            Err(e) if e.flood_seconds().is_some() => return Ok(false),
            Err(e) => {
                debug!(
                    "reference send of message {} failed ({}), downloading",
                    message.id, e
                );
            }
        }

        let reader = self.gateway.reader().transport();
        let dir = tempfile::Builder::new().prefix("tm_clone_").tempdir()?;
        let path = reader
            .download_media(message, dir.path())
            .await
            .map_err(MirrorError::from)?;
        let thumbnail = reader
            .download_thumbnail(message, dir.path())
            .await
            .unwrap_or(None);

        let path = path.as_path();
        let thumbnail = thumbnail.as_deref();
        let file_name = media.file_name.as_deref();
        let mime_type = media.mime_type.as_deref();
        let supports_streaming = media.kind == MediaKind::Video;
        let upload = retry_flood_wait(|| async move {
            writer
                .send_file(
                    target_channel,
                    OutgoingFile::Upload {
                        path,
                        thumbnail,
                        file_name,
                        mime_type,
                        supports_streaming,
                    },
                    caption,
                    entities,
                )
                .await
        })
        .await;
        match upload {
            Ok(_) => Ok(true),
            Err(e) if e.flood_seconds().is_some() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
