// src/core/upstream/transport.rs

//! The provider seam: one client interface, instantiated once per session.
//!
//! The reader (operator account) and writer (service identity) are two
//! instances of this trait distinguished by a role flag, never by inheritance.
//! Call sites know which capabilities they need; a transport that cannot serve
//! a call reports an upstream error instead of panicking.

use crate::core::upstream::message::{MediaRef, TextEntity, UpstreamMessage};
use crate::core::upstream::refs::ChatRef;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Classified transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// Retry-after-N signal from the provider.
    FloodWait(u32),
    NotParticipant,
    AdminRequired,
    ChannelPrivate,
    ChannelInvalid,
    Unauthorized,
    /// The local session store is corrupt and must be rebuilt.
    SessionStorage,
    Network,
    Other,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub message: String,
}

impl UpstreamError {
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Other, message)
    }

    pub fn flood_wait(seconds: u32) -> Self {
        Self::new(
            UpstreamErrorKind::FloodWait(seconds),
            format!("flood wait, retry after {seconds}s"),
        )
    }

    pub fn unsupported(call: &str) -> Self {
        Self::other(format!("{call} is not supported by this transport"))
    }

    pub fn flood_seconds(&self) -> Option<u32> {
        match self.kind {
            UpstreamErrorKind::FloodWait(seconds) => Some(seconds),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerKind {
    User,
    Group,
    Supergroup,
    Broadcast,
}

/// A resolved chat entity.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub chat_id: i64,
    pub title: String,
    pub username: Option<String>,
    pub kind: PeerKind,
    /// Forum-enabled supergroup.
    pub forum: bool,
}

impl PeerInfo {
    pub fn is_broadcast(&self) -> bool {
        self.kind == PeerKind::Broadcast
    }

    pub fn is_supergroup(&self) -> bool {
        self.kind == PeerKind::Supergroup
    }
}

#[derive(Debug, Clone)]
pub struct DialogInfo {
    pub peer: PeerInfo,
}

/// Full channel info, fetched with a fresh round-trip (defeats entity caches).
#[derive(Debug, Clone)]
pub struct ChannelFull {
    pub chat_id: i64,
    pub title: String,
    pub about: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Permissions {
    pub is_admin: bool,
    pub can_post: bool,
}

/// One `my_chat_member` event from the membership long-poll.
#[derive(Debug, Clone)]
pub struct MemberUpdate {
    pub update_id: i64,
    pub chat_id: i64,
    /// Provider chat type, e.g. "channel".
    pub chat_kind: String,
    pub title: String,
    /// New membership status: administrator, creator, member, left, kicked, ...
    pub new_status: String,
}

#[derive(Debug, Clone)]
pub struct ForumTopicInfo {
    pub topic_id: i64,
    pub title: String,
}

/// An outgoing file for `send_file`: either the provider-side media reference
/// or a locally downloaded copy with its attributes for re-upload.
#[derive(Debug)]
pub enum OutgoingFile<'a> {
    Reference(&'a MediaRef),
    Upload {
        path: &'a Path,
        thumbnail: Option<&'a Path>,
        file_name: Option<&'a str>,
        mime_type: Option<&'a str>,
        supports_streaming: bool,
    },
}

/// The abstract provider surface required by the orchestration engine.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Path of the on-disk session store, when the transport keeps one.
    fn session_path(&self) -> Option<PathBuf>;

    async fn connect(&self) -> Result<(), UpstreamError>;

    async fn disconnect(&self);

    async fn is_authorized(&self) -> Result<bool, UpstreamError>;

    async fn resolve(&self, target: &ChatRef) -> Result<PeerInfo, UpstreamError>;

    async fn iter_dialogs(&self) -> Result<Vec<DialogInfo>, UpstreamError>;

    /// Messages of `chat_id` in ascending id order, strictly above `min_id`,
    /// at most `limit` items (the reverse-iteration form of history access).
    async fn iter_messages(
        &self,
        chat_id: i64,
        min_id: i64,
        limit: usize,
    ) -> Result<Vec<UpstreamMessage>, UpstreamError>;

    /// Fetch specific messages by id; missing ids yield `None`.
    async fn get_messages(
        &self,
        chat_id: i64,
        ids: &[i64],
    ) -> Result<Vec<Option<UpstreamMessage>>, UpstreamError>;

    async fn get_forum_topics(&self, chat_id: i64) -> Result<Vec<ForumTopicInfo>, UpstreamError>;

    async fn get_full_channel(&self, chat_id: i64) -> Result<ChannelFull, UpstreamError>;

    /// Permissions of this session's own identity in `chat_id`.
    async fn get_permissions(&self, chat_id: i64) -> Result<Permissions, UpstreamError>;

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        entities: &[TextEntity],
    ) -> Result<i64, UpstreamError>;

    async fn send_file(
        &self,
        chat_id: i64,
        file: OutgoingFile<'_>,
        caption: &str,
        entities: &[TextEntity],
    ) -> Result<i64, UpstreamError>;

    /// Forward `ids` from one chat to another as a single unit. With
    /// `drop_author` the destination shows no forward header.
    async fn forward_messages(
        &self,
        from_chat_id: i64,
        to_chat_id: i64,
        ids: &[i64],
        drop_author: bool,
    ) -> Result<(), UpstreamError>;

    async fn download_media(
        &self,
        message: &UpstreamMessage,
        dir: &Path,
    ) -> Result<PathBuf, UpstreamError>;

    /// Download the media thumbnail when it is distinct from the media itself.
    async fn download_thumbnail(
        &self,
        message: &UpstreamMessage,
        dir: &Path,
    ) -> Result<Option<PathBuf>, UpstreamError>;

    async fn edit_channel_title(&self, chat_id: i64, title: &str) -> Result<(), UpstreamError>;

    /// Register the new-message subscription. The receiver stays valid across
    /// a session-storage rebuild.
    async fn subscribe_new_messages(
        &self,
    ) -> Result<mpsc::Receiver<UpstreamMessage>, UpstreamError>;

    /// Long-poll the membership-change stream. `offset = -1` fast-forwards to
    /// the latest update without replaying history.
    async fn get_member_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<MemberUpdate>, UpstreamError>;
}
