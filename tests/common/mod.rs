// tests/common/mod.rs

//! Shared test fixtures: an in-memory transport and message builders.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use topicmirror::core::store::Store;
use topicmirror::core::upstream::gateway::UpstreamGateway;
use topicmirror::core::upstream::message::{
    MediaKind, MediaRef, MessageContent, ReplyHeader, TextEntity, UpstreamMessage,
};
use topicmirror::core::upstream::refs::ChatRef;
use topicmirror::core::upstream::transport::{
    ChannelFull, DialogInfo, ForumTopicInfo, MemberUpdate, OutgoingFile, PeerInfo, PeerKind,
    Permissions, Transport, UpstreamError, UpstreamErrorKind,
};

/// What a write-side call delivered, for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum SentItem {
    Forward {
        target: i64,
        from: i64,
        ids: Vec<i64>,
        drop_author: bool,
    },
    Text {
        target: i64,
        text: String,
    },
    FileReference {
        target: i64,
        file_ref: String,
        caption: String,
    },
    FileUpload {
        target: i64,
        file_name: Option<String>,
        caption: String,
        has_thumbnail: bool,
        supports_streaming: bool,
    },
}

impl SentItem {
    pub fn target(&self) -> i64 {
        match self {
            SentItem::Forward { target, .. }
            | SentItem::Text { target, .. }
            | SentItem::FileReference { target, .. }
            | SentItem::FileUpload { target, .. } => *target,
        }
    }
}

#[derive(Default)]
struct Inner {
    authorized: bool,
    connect_errors: VecDeque<UpstreamError>,
    peers: HashMap<i64, PeerInfo>,
    usernames: HashMap<String, i64>,
    messages: HashMap<i64, BTreeMap<i64, UpstreamMessage>>,
    permissions: HashMap<i64, Permissions>,
    broken_channels: HashMap<i64, UpstreamErrorKind>,
    forward_fail_targets: HashSet<i64>,
    reference_send_fails: bool,
    flood: HashMap<String, VecDeque<u32>>,
    sent: Vec<SentItem>,
    titles: HashMap<i64, String>,
    member_updates: Vec<MemberUpdate>,
    new_message_tx: Option<mpsc::Sender<UpstreamMessage>>,
    session_path: Option<PathBuf>,
    next_sent_id: i64,
}

/// In-memory stand-in for the provider transport.
pub struct MemoryTransport {
    inner: Mutex<Inner>,
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                authorized: true,
                next_sent_id: 1,
                ..Inner::default()
            }),
        })
    }

    pub fn set_authorized(&self, authorized: bool) {
        self.inner.lock().unwrap().authorized = authorized;
    }

    pub fn set_session_path(&self, path: PathBuf) {
        self.inner.lock().unwrap().session_path = Some(path);
    }

    pub fn push_connect_error(&self, error: UpstreamError) {
        self.inner.lock().unwrap().connect_errors.push_back(error);
    }

    pub fn add_peer(&self, peer: PeerInfo) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(username) = peer.username.clone() {
            inner.usernames.insert(format!("@{username}"), peer.chat_id);
        }
        inner.peers.insert(peer.chat_id, peer);
    }

    pub fn add_message(&self, message: UpstreamMessage) {
        self.inner
            .lock()
            .unwrap()
            .messages
            .entry(message.chat_id)
            .or_default()
            .insert(message.id, message);
    }

    pub fn add_messages(&self, messages: impl IntoIterator<Item = UpstreamMessage>) {
        for message in messages {
            self.add_message(message);
        }
    }

    pub fn set_admin(&self, chat_id: i64, is_admin: bool) {
        self.inner.lock().unwrap().permissions.insert(
            chat_id,
            Permissions {
                is_admin,
                can_post: is_admin,
            },
        );
    }

    pub fn break_channel(&self, chat_id: i64, kind: UpstreamErrorKind) {
        self.inner.lock().unwrap().broken_channels.insert(chat_id, kind);
    }

    pub fn heal_channel(&self, chat_id: i64) {
        self.inner.lock().unwrap().broken_channels.remove(&chat_id);
    }

    pub fn fail_forwards_to(&self, chat_id: i64) {
        self.inner.lock().unwrap().forward_fail_targets.insert(chat_id);
    }

    pub fn fail_reference_sends(&self) {
        self.inner.lock().unwrap().reference_send_fails = true;
    }

    /// Queues a flood-wait signal for the next call of `method`.
    pub fn schedule_flood(&self, method: &str, seconds: u32) {
        self.inner
            .lock()
            .unwrap()
            .flood
            .entry(method.to_string())
            .or_default()
            .push_back(seconds);
    }

    pub fn push_member_update(&self, update: MemberUpdate) {
        self.inner.lock().unwrap().member_updates.push(update);
    }

    pub fn sent(&self) -> Vec<SentItem> {
        self.inner.lock().unwrap().sent.clone()
    }

    pub fn title_of(&self, chat_id: i64) -> Option<String> {
        self.inner.lock().unwrap().titles.get(&chat_id).cloned()
    }

    fn take_flood(&self, method: &str) -> Option<u32> {
        self.inner
            .lock()
            .unwrap()
            .flood
            .get_mut(method)
            .and_then(VecDeque::pop_front)
    }

    fn check_channel(&self, chat_id: i64) -> Result<(), UpstreamError> {
        let inner = self.inner.lock().unwrap();
        match inner.broken_channels.get(&chat_id) {
            Some(kind) => Err(UpstreamError::new(
                *kind,
                format!("channel {chat_id} unavailable"),
            )),
            None => Ok(()),
        }
    }

    fn record(&self, item: SentItem) -> i64 {
        let mut inner = self.inner.lock().unwrap();
        inner.sent.push(item);
        inner.next_sent_id += 1;
        inner.next_sent_id
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn session_path(&self) -> Option<PathBuf> {
        self.inner.lock().unwrap().session_path.clone()
    }

    async fn connect(&self) -> Result<(), UpstreamError> {
        let next = self.inner.lock().unwrap().connect_errors.pop_front();
        match next {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) {}

    async fn is_authorized(&self) -> Result<bool, UpstreamError> {
        Ok(self.inner.lock().unwrap().authorized)
    }

    async fn resolve(&self, target: &ChatRef) -> Result<PeerInfo, UpstreamError> {
        let inner = self.inner.lock().unwrap();
        let chat_id = match target {
            ChatRef::Id(id) => *id,
            ChatRef::Username(name) => *inner.usernames.get(name).ok_or_else(|| {
                UpstreamError::new(UpstreamErrorKind::ChannelInvalid, format!("{name} not found"))
            })?,
        };
        inner.peers.get(&chat_id).cloned().ok_or_else(|| {
            UpstreamError::new(
                UpstreamErrorKind::ChannelInvalid,
                format!("peer {chat_id} not found"),
            )
        })
    }

    async fn iter_dialogs(&self) -> Result<Vec<DialogInfo>, UpstreamError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .peers
            .values()
            .cloned()
            .map(|peer| DialogInfo { peer })
            .collect())
    }

    async fn iter_messages(
        &self,
        chat_id: i64,
        min_id: i64,
        limit: usize,
    ) -> Result<Vec<UpstreamMessage>, UpstreamError> {
        if let Some(seconds) = self.take_flood("iter_messages") {
            return Err(UpstreamError::flood_wait(seconds));
        }
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .messages
            .get(&chat_id)
            .map(|messages| {
                messages
                    .range((min_id + 1)..)
                    .take(limit)
                    .map(|(_, m)| m.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_messages(
        &self,
        chat_id: i64,
        ids: &[i64],
    ) -> Result<Vec<Option<UpstreamMessage>>, UpstreamError> {
        let inner = self.inner.lock().unwrap();
        let messages = inner.messages.get(&chat_id);
        Ok(ids
            .iter()
            .map(|id| messages.and_then(|m| m.get(id).cloned()))
            .collect())
    }

    async fn get_forum_topics(&self, _chat_id: i64) -> Result<Vec<ForumTopicInfo>, UpstreamError> {
        Ok(vec![])
    }

    async fn get_full_channel(&self, chat_id: i64) -> Result<ChannelFull, UpstreamError> {
        self.check_channel(chat_id)?;
        let inner = self.inner.lock().unwrap();
        let title = inner
            .peers
            .get(&chat_id)
            .map(|peer| peer.title.clone())
            .unwrap_or_default();
        Ok(ChannelFull {
            chat_id,
            title,
            about: String::new(),
        })
    }

    async fn get_permissions(&self, chat_id: i64) -> Result<Permissions, UpstreamError> {
        if let Some(seconds) = self.take_flood("get_permissions") {
            return Err(UpstreamError::flood_wait(seconds));
        }
        self.check_channel(chat_id)?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .permissions
            .get(&chat_id)
            .copied()
            .unwrap_or_default())
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        _entities: &[TextEntity],
    ) -> Result<i64, UpstreamError> {
        if let Some(seconds) = self.take_flood("send_message") {
            return Err(UpstreamError::flood_wait(seconds));
        }
        self.check_channel(chat_id)?;
        Ok(self.record(SentItem::Text {
            target: chat_id,
            text: text.to_string(),
        }))
    }

    async fn send_file(
        &self,
        chat_id: i64,
        file: OutgoingFile<'_>,
        caption: &str,
        _entities: &[TextEntity],
    ) -> Result<i64, UpstreamError> {
        if let Some(seconds) = self.take_flood("send_file") {
            return Err(UpstreamError::flood_wait(seconds));
        }
        self.check_channel(chat_id)?;
        match file {
            OutgoingFile::Reference(media) => {
                if self.inner.lock().unwrap().reference_send_fails {
                    return Err(UpstreamError::other("stale file reference"));
                }
                Ok(self.record(SentItem::FileReference {
                    target: chat_id,
                    file_ref: media.file_ref.clone(),
                    caption: caption.to_string(),
                }))
            }
            OutgoingFile::Upload {
                file_name,
                thumbnail,
                supports_streaming,
                ..
            } => Ok(self.record(SentItem::FileUpload {
                target: chat_id,
                file_name: file_name.map(str::to_string),
                caption: caption.to_string(),
                has_thumbnail: thumbnail.is_some(),
                supports_streaming,
            })),
        }
    }

    async fn forward_messages(
        &self,
        from_chat_id: i64,
        to_chat_id: i64,
        ids: &[i64],
        drop_author: bool,
    ) -> Result<(), UpstreamError> {
        if let Some(seconds) = self.take_flood("forward_messages") {
            return Err(UpstreamError::flood_wait(seconds));
        }
        self.check_channel(to_chat_id)?;
        if self
            .inner
            .lock()
            .unwrap()
            .forward_fail_targets
            .contains(&to_chat_id)
        {
            return Err(UpstreamError::other("forward rejected"));
        }
        self.record(SentItem::Forward {
            target: to_chat_id,
            from: from_chat_id,
            ids: ids.to_vec(),
            drop_author,
        });
        Ok(())
    }

    async fn download_media(
        &self,
        message: &UpstreamMessage,
        dir: &Path,
    ) -> Result<PathBuf, UpstreamError> {
        let path = dir.join(format!("media_{}", message.id));
        std::fs::write(&path, b"media")
            .map_err(|e| UpstreamError::other(format!("download failed: {e}")))?;
        Ok(path)
    }

    async fn download_thumbnail(
        &self,
        message: &UpstreamMessage,
        dir: &Path,
    ) -> Result<Option<PathBuf>, UpstreamError> {
        let has_thumbnail = message.media().is_some_and(|media| media.has_thumbnail);
        if !has_thumbnail {
            return Ok(None);
        }
        let path = dir.join(format!("thumb_{}", message.id));
        std::fs::write(&path, b"thumb")
            .map_err(|e| UpstreamError::other(format!("download failed: {e}")))?;
        Ok(Some(path))
    }

    async fn edit_channel_title(&self, chat_id: i64, title: &str) -> Result<(), UpstreamError> {
        self.check_channel(chat_id)?;
        self.inner
            .lock()
            .unwrap()
            .titles
            .insert(chat_id, title.to_string());
        Ok(())
    }

    async fn subscribe_new_messages(
        &self,
    ) -> Result<mpsc::Receiver<UpstreamMessage>, UpstreamError> {
        let (tx, rx) = mpsc::channel(64);
        self.inner.lock().unwrap().new_message_tx = Some(tx);
        Ok(rx)
    }

    async fn get_member_updates(
        &self,
        offset: i64,
        _timeout: Duration,
    ) -> Result<Vec<MemberUpdate>, UpstreamError> {
        let inner = self.inner.lock().unwrap();
        if offset == -1 {
            return Ok(inner.member_updates.last().cloned().into_iter().collect());
        }
        Ok(inner
            .member_updates
            .iter()
            .filter(|update| update.update_id >= offset)
            .cloned()
            .collect())
    }
}

// --- message builders ---

pub fn topic_reply(topic_id: i64) -> Option<ReplyHeader> {
    Some(ReplyHeader {
        reply_to_msg_id: None,
        reply_to_top_id: Some(topic_id),
        forum_topic: true,
    })
}

pub fn text_message(chat_id: i64, id: i64, topic_id: i64, text: &str) -> UpstreamMessage {
    UpstreamMessage {
        id,
        chat_id,
        reply_to: topic_reply(topic_id),
        grouped_id: None,
        deleted: false,
        content: MessageContent::Text {
            text: text.to_string(),
            entities: vec![],
        },
    }
}

pub fn media_message(
    chat_id: i64,
    id: i64,
    topic_id: i64,
    grouped_id: Option<i64>,
    caption: &str,
) -> UpstreamMessage {
    UpstreamMessage {
        id,
        chat_id,
        reply_to: topic_reply(topic_id),
        grouped_id,
        deleted: false,
        content: MessageContent::Media {
            media: MediaRef {
                kind: MediaKind::Photo,
                file_ref: format!("file-{id}"),
                mime_type: Some("image/jpeg".to_string()),
                file_name: None,
                has_thumbnail: false,
            },
            caption: caption.to_string(),
            entities: vec![],
        },
    }
}

pub fn service_message(chat_id: i64, id: i64, topic_id: i64) -> UpstreamMessage {
    UpstreamMessage {
        id,
        chat_id,
        reply_to: topic_reply(topic_id),
        grouped_id: None,
        deleted: false,
        content: MessageContent::Service,
    }
}

/// The topic root: carries no threading header, its id is the topic id.
pub fn root_message(chat_id: i64, topic_id: i64, text: &str) -> UpstreamMessage {
    UpstreamMessage {
        id: topic_id,
        chat_id,
        reply_to: None,
        grouped_id: None,
        deleted: false,
        content: MessageContent::Text {
            text: text.to_string(),
            entities: vec![],
        },
    }
}

pub fn broadcast_peer(chat_id: i64, title: &str) -> PeerInfo {
    PeerInfo {
        chat_id,
        title: title.to_string(),
        username: None,
        kind: PeerKind::Broadcast,
        forum: false,
    }
}

pub fn supergroup_peer(chat_id: i64, title: &str) -> PeerInfo {
    PeerInfo {
        chat_id,
        title: title.to_string(),
        username: None,
        kind: PeerKind::Supergroup,
        forum: true,
    }
}

// --- fixtures ---

pub async fn temp_store() -> (Store, TempDir) {
    let dir = TempDir::new().expect("tempdir");
    let store = Store::open(dir.path().join("test.db"))
        .await
        .expect("store open");
    (store, dir)
}

pub fn gateway_with(
    reader: Arc<MemoryTransport>,
    writer: Arc<MemoryTransport>,
) -> Arc<UpstreamGateway> {
    Arc::new(UpstreamGateway::new(reader, writer, None))
}
