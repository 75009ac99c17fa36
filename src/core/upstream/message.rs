// src/core/upstream/message.rs

//! The provider-neutral message model.
//!
//! Incoming messages are a closed sum type: a message is a service action, a
//! text message, or a media message. Album membership and topic threading are
//! scalar attributes next to the variant, which is all the clone rules need.

/// Threading header attached to replies and forum-topic posts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyHeader {
    pub reply_to_msg_id: Option<i64>,
    pub reply_to_top_id: Option<i64>,
    /// Set when the header references a forum topic rather than a plain reply.
    pub forum_topic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    Audio,
    Document,
    Other,
}

/// An opaque reference to provider-hosted media, reusable for re-sending
/// without a download as long as the reference is still valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub kind: MediaKind,
    /// Provider file reference (reusable handle).
    pub file_ref: String,
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
    pub has_thumbnail: bool,
}

/// A formatting entity over the message text; carried through clones verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEntity {
    pub offset: u32,
    pub length: u32,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    /// Service action (member joined, title changed, topic created, ...).
    Service,
    Text {
        text: String,
        entities: Vec<TextEntity>,
    },
    Media {
        media: MediaRef,
        caption: String,
        entities: Vec<TextEntity>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamMessage {
    pub id: i64,
    pub chat_id: i64,
    pub reply_to: Option<ReplyHeader>,
    /// Album id shared by every item of a media group.
    pub grouped_id: Option<i64>,
    /// Set when the provider reports the message as deleted.
    pub deleted: bool,
    pub content: MessageContent,
}

impl UpstreamMessage {
    pub fn is_service(&self) -> bool {
        matches!(self.content, MessageContent::Service)
    }

    /// The message text: body for text messages, caption for media.
    pub fn text(&self) -> &str {
        match &self.content {
            MessageContent::Service => "",
            MessageContent::Text { text, .. } => text,
            MessageContent::Media { caption, .. } => caption,
        }
    }

    pub fn entities(&self) -> &[TextEntity] {
        match &self.content {
            MessageContent::Service => &[],
            MessageContent::Text { entities, .. } | MessageContent::Media { entities, .. } => {
                entities
            }
        }
    }

    pub fn media(&self) -> Option<&MediaRef> {
        match &self.content {
            MessageContent::Media { media, .. } => Some(media),
            _ => None,
        }
    }
}
