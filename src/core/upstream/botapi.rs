// src/core/upstream/botapi.rs

//! The shipped writer-side transport, speaking the provider's Bot HTTP API
//! over JSON. It serves every writer capability plus the `my_chat_member`
//! long-poll; user-session calls (history iteration, dialog scans, media
//! download) need an MTProto backend and surface as upstream failures here.

use crate::core::upstream::message::{MediaKind, TextEntity, UpstreamMessage};
use crate::core::upstream::refs::ChatRef;
use crate::core::upstream::transport::{
    ChannelFull, DialogInfo, ForumTopicInfo, MemberUpdate, OutgoingFile, PeerInfo, PeerKind,
    Permissions, Transport, UpstreamError, UpstreamErrorKind,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpBotTransport {
    token: String,
    api_base: String,
    http: reqwest::Client,
    // Own bot id, cached after the first successful getMe.
    me_id: Mutex<Option<i64>>,
}

impl HttpBotTransport {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    pub fn with_api_base(token: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: api_base.into(),
            http: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .expect("reqwest client construction cannot fail with static options"),
            me_id: Mutex::new(None),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token)
    }

    /// Calls one Bot API method and unwraps the `{ok, result}` envelope.
    async fn call(
        &self,
        method: &str,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, UpstreamError> {
        if self.token.trim().is_empty() {
            return Err(UpstreamError::new(
                UpstreamErrorKind::Unauthorized,
                "BOT_TOKEN is not configured",
            ));
        }

        let mut request = self.http.post(self.method_url(method)).json(&payload);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::new(UpstreamErrorKind::Network, e.to_string()))?;
        let status = response.status().as_u16();
        let body: Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::new(UpstreamErrorKind::Network, e.to_string()))?;

        if body.get("ok").and_then(Value::as_bool) == Some(true) {
            return Ok(body.get("result").cloned().unwrap_or(Value::Null));
        }

        let description = body
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("unknown provider error")
            .to_string();
        let retry_after = body
            .pointer("/parameters/retry_after")
            .and_then(Value::as_u64);
        Err(classify_api_error(status, &description, retry_after))
    }

    async fn own_id(&self) -> Result<i64, UpstreamError> {
        if let Some(id) = *self.me_id.lock().await {
            return Ok(id);
        }
        let me = self.call("getMe", json!({}), None).await?;
        let id = me
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| UpstreamError::other("getMe returned no id"))?;
        *self.me_id.lock().await = Some(id);
        Ok(id)
    }
}

fn classify_api_error(status: u16, description: &str, retry_after: Option<u64>) -> UpstreamError {
    if let Some(seconds) = retry_after {
        return UpstreamError::flood_wait(seconds.min(u64::from(u32::MAX)) as u32);
    }

    let lowered = description.to_lowercase();
    let kind = if status == 401 || lowered.contains("unauthorized") {
        UpstreamErrorKind::Unauthorized
    } else if lowered.contains("chat not found") || lowered.contains("channel is invalid") {
        UpstreamErrorKind::ChannelInvalid
    } else if lowered.contains("kicked") || lowered.contains("not a member") {
        UpstreamErrorKind::NotParticipant
    } else if lowered.contains("not enough rights")
        || lowered.contains("administrator rights")
        || lowered.contains("chat_admin_required")
    {
        UpstreamErrorKind::AdminRequired
    } else if status == 403 || lowered.contains("forbidden") || lowered.contains("private") {
        UpstreamErrorKind::ChannelPrivate
    } else {
        UpstreamErrorKind::Other
    };
    UpstreamError::new(kind, description.to_string())
}

fn peer_from_chat(chat: &Value) -> Result<PeerInfo, UpstreamError> {
    let chat_id = chat
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| UpstreamError::other("chat object has no id"))?;
    let kind = match chat.get("type").and_then(Value::as_str).unwrap_or("") {
        "channel" => PeerKind::Broadcast,
        "supergroup" => PeerKind::Supergroup,
        "group" => PeerKind::Group,
        _ => PeerKind::User,
    };
    Ok(PeerInfo {
        chat_id,
        title: chat
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        username: chat
            .get("username")
            .and_then(Value::as_str)
            .map(str::to_string),
        kind,
        forum: chat.get("is_forum").and_then(Value::as_bool).unwrap_or(false),
    })
}

fn chat_ref_value(target: &ChatRef) -> Value {
    match target {
        ChatRef::Id(id) => json!(id),
        ChatRef::Username(name) => json!(name),
    }
}

#[async_trait]
impl Transport for HttpBotTransport {
    fn session_path(&self) -> Option<PathBuf> {
        // Token auth keeps no local session store.
        None
    }

    async fn connect(&self) -> Result<(), UpstreamError> {
        self.own_id().await.map(|_| ())
    }

    async fn disconnect(&self) {}

    async fn is_authorized(&self) -> Result<bool, UpstreamError> {
        match self.own_id().await {
            Ok(_) => Ok(true),
            Err(e) if e.kind == UpstreamErrorKind::Unauthorized => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn resolve(&self, target: &ChatRef) -> Result<PeerInfo, UpstreamError> {
        let chat = self
            .call("getChat", json!({"chat_id": chat_ref_value(target)}), None)
            .await?;
        peer_from_chat(&chat)
    }

    async fn iter_dialogs(&self) -> Result<Vec<DialogInfo>, UpstreamError> {
        Err(UpstreamError::unsupported("iter_dialogs"))
    }

    async fn iter_messages(
        &self,
        _chat_id: i64,
        _min_id: i64,
        _limit: usize,
    ) -> Result<Vec<UpstreamMessage>, UpstreamError> {
        Err(UpstreamError::unsupported("iter_messages"))
    }

    async fn get_messages(
        &self,
        _chat_id: i64,
        _ids: &[i64],
    ) -> Result<Vec<Option<UpstreamMessage>>, UpstreamError> {
        Err(UpstreamError::unsupported("get_messages"))
    }

    async fn get_forum_topics(&self, _chat_id: i64) -> Result<Vec<ForumTopicInfo>, UpstreamError> {
        Err(UpstreamError::unsupported("get_forum_topics"))
    }

    async fn get_full_channel(&self, chat_id: i64) -> Result<ChannelFull, UpstreamError> {
        let chat = self.call("getChat", json!({"chat_id": chat_id}), None).await?;
        Ok(ChannelFull {
            chat_id,
            title: chat
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            about: chat
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }

    async fn get_permissions(&self, chat_id: i64) -> Result<Permissions, UpstreamError> {
        let me = self.own_id().await?;
        let member = self
            .call(
                "getChatMember",
                json!({"chat_id": chat_id, "user_id": me}),
                None,
            )
            .await?;
        let status = member.get("status").and_then(Value::as_str).unwrap_or("");
        Ok(Permissions {
            is_admin: matches!(status, "administrator" | "creator"),
            can_post: status == "creator"
                || member
                    .get("can_post_messages")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
        })
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        _entities: &[TextEntity],
    ) -> Result<i64, UpstreamError> {
        let sent = self
            .call("sendMessage", json!({"chat_id": chat_id, "text": text}), None)
            .await?;
        Ok(sent.get("message_id").and_then(Value::as_i64).unwrap_or(0))
    }

    async fn send_file(
        &self,
        chat_id: i64,
        file: OutgoingFile<'_>,
        caption: &str,
        _entities: &[TextEntity],
    ) -> Result<i64, UpstreamError> {
        match file {
            OutgoingFile::Reference(media) => {
                let (method, field) = match media.kind {
                    MediaKind::Photo => ("sendPhoto", "photo"),
                    MediaKind::Video => ("sendVideo", "video"),
                    MediaKind::Audio => ("sendAudio", "audio"),
                    MediaKind::Document | MediaKind::Other => ("sendDocument", "document"),
                };
                let mut payload = json!({"chat_id": chat_id, field: media.file_ref});
                if !caption.is_empty() {
                    payload["caption"] = json!(caption);
                }
                let sent = self.call(method, payload, None).await?;
                Ok(sent.get("message_id").and_then(Value::as_i64).unwrap_or(0))
            }
            OutgoingFile::Upload { .. } => Err(UpstreamError::unsupported("send_file(upload)")),
        }
    }

    async fn forward_messages(
        &self,
        from_chat_id: i64,
        to_chat_id: i64,
        ids: &[i64],
        drop_author: bool,
    ) -> Result<(), UpstreamError> {
        let method = if drop_author {
            "copyMessages"
        } else {
            "forwardMessages"
        };
        self.call(
            method,
            json!({
                "chat_id": to_chat_id,
                "from_chat_id": from_chat_id,
                "message_ids": ids,
            }),
            None,
        )
        .await
        .map(|_| ())
    }

    async fn download_media(
        &self,
        _message: &UpstreamMessage,
        _dir: &Path,
    ) -> Result<PathBuf, UpstreamError> {
        Err(UpstreamError::unsupported("download_media"))
    }

    async fn download_thumbnail(
        &self,
        _message: &UpstreamMessage,
        _dir: &Path,
    ) -> Result<Option<PathBuf>, UpstreamError> {
        Err(UpstreamError::unsupported("download_thumbnail"))
    }

    async fn edit_channel_title(&self, chat_id: i64, title: &str) -> Result<(), UpstreamError> {
        self.call(
            "setChatTitle",
            json!({"chat_id": chat_id, "title": title}),
            None,
        )
        .await
        .map(|_| ())
    }

    async fn subscribe_new_messages(
        &self,
    ) -> Result<mpsc::Receiver<UpstreamMessage>, UpstreamError> {
        Err(UpstreamError::unsupported("subscribe_new_messages"))
    }

    async fn get_member_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<MemberUpdate>, UpstreamError> {
        let updates = self
            .call(
                "getUpdates",
                json!({
                    "offset": offset,
                    "timeout": timeout.as_secs(),
                    "allowed_updates": ["my_chat_member"],
                }),
                Some(timeout + Duration::from_secs(10)),
            )
            .await?;

        let mut events = Vec::new();
        for item in updates.as_array().map(Vec::as_slice).unwrap_or_default() {
            let Some(update_id) = item.get("update_id").and_then(Value::as_i64) else {
                continue;
            };
            let Some(payload) = item.get("my_chat_member") else {
                // Other update kinds still advance the offset cursor.
                events.push(MemberUpdate {
                    update_id,
                    chat_id: 0,
                    chat_kind: String::new(),
                    title: String::new(),
                    new_status: String::new(),
                });
                continue;
            };
            let chat = payload.get("chat").cloned().unwrap_or(Value::Null);
            events.push(MemberUpdate {
                update_id,
                chat_id: chat.get("id").and_then(Value::as_i64).unwrap_or(0),
                chat_kind: chat
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                title: chat
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
                new_status: payload
                    .pointer("/new_chat_member/status")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_lowercase(),
            });
        }
        Ok(events)
    }
}
