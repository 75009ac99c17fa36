// src/core/upstream/gateway.rs

//! The two-session gateway to the messaging provider.

use crate::core::errors::MirrorError;
use crate::core::upstream::refs::{ChatRef, normalize_ref};
use crate::core::upstream::session::{ClientSession, SessionRole};
use crate::core::upstream::transport::{PeerInfo, Transport};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{error, warn};

/// Pending interactive logins expire after this window.
const PENDING_LOGIN_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Serialize)]
pub struct AuthStatus {
    pub reader_authorized: bool,
    pub writer_authorized: bool,
}

/// Holds the reader and writer sessions plus the operator-notification sink.
pub struct UpstreamGateway {
    reader: ClientSession,
    writer: ClientSession,
    notify_chat_id: Option<i64>,
    /// Expiry bookkeeping for interactive login flows driven by the panel.
    pending_logins: Mutex<HashMap<String, Instant>>,
}

impl UpstreamGateway {
    pub fn new(
        reader_transport: Arc<dyn Transport>,
        writer_transport: Arc<dyn Transport>,
        notify_chat_id: Option<i64>,
    ) -> Self {
        Self {
            reader: ClientSession::new(SessionRole::Reader, reader_transport),
            writer: ClientSession::new(SessionRole::Writer, writer_transport),
            notify_chat_id,
            pending_logins: Mutex::new(HashMap::new()),
        }
    }

    pub fn reader(&self) -> &ClientSession {
        &self.reader
    }

    pub fn writer(&self) -> &ClientSession {
        &self.writer
    }

    /// Connects a session, sending the one re-login notification when the
    /// session store had to be rebuilt.
    pub async fn ensure_session(&self, role: SessionRole) -> Result<(), MirrorError> {
        let session = match role {
            SessionRole::Reader => &self.reader,
            SessionRole::Writer => &self.writer,
        };
        if session.ensure_connected().await? {
            self.send_notification(&format!(
                "⚠️ {role} session store was corrupt and has been rebuilt; re-login required"
            ))
            .await;
        }
        Ok(())
    }

    /// Authorization checks never propagate connectivity errors; an unreachable
    /// session is simply not authorized yet.
    pub async fn is_reader_authorized(&self) -> bool {
        self.reader.is_authorized().await.unwrap_or_else(|e| {
            warn!("reader authorization check failed: {}", e);
            false
        })
    }

    pub async fn is_writer_authorized(&self) -> bool {
        self.writer.is_authorized().await.unwrap_or_else(|e| {
            warn!("writer authorization check failed: {}", e);
            false
        })
    }

    pub async fn auth_status(&self) -> AuthStatus {
        AuthStatus {
            reader_authorized: self.is_reader_authorized().await,
            writer_authorized: self.is_writer_authorized().await,
        }
    }

    /// Resolves a textual or numeric chat reference through the preferred
    /// session.
    pub async fn resolve(&self, input: &str, prefer_user: bool) -> Result<PeerInfo, MirrorError> {
        let target = normalize_ref(input)?;
        self.resolve_ref(&target, prefer_user).await
    }

    pub async fn resolve_ref(
        &self,
        target: &ChatRef,
        prefer_user: bool,
    ) -> Result<PeerInfo, MirrorError> {
        let session = if prefer_user { &self.reader } else { &self.writer };
        self.ensure_session(session.role()).await?;
        Ok(session.transport().resolve(target).await?)
    }

    /// Best-effort operator notification; failures log but never propagate.
    pub async fn send_notification(&self, message: &str) {
        let Some(chat_id) = self.notify_chat_id else {
            return;
        };
        if let Err(e) = self.writer.transport().connect().await {
            error!("failed to send notification: {}", e);
            return;
        }
        if let Err(e) = self
            .writer
            .transport()
            .send_message(chat_id, message, &[])
            .await
        {
            error!("failed to send notification: {}", e);
        }
    }

    /// Registers a pending interactive login for expiry tracking.
    pub async fn track_pending_login(&self, session_id: String) {
        self.pending_logins
            .lock()
            .await
            .insert(session_id, Instant::now());
    }

    /// Drops pending logins older than the expiry window. Run periodically by
    /// the monitor loop as housekeeping.
    pub async fn purge_expired_logins(&self) {
        let now = Instant::now();
        self.pending_logins
            .lock()
            .await
            .retain(|_, created| now.duration_since(*created) < PENDING_LOGIN_TTL);
    }

    pub async fn disconnect(&self) {
        self.reader.disconnect().await;
        self.writer.disconnect().await;
    }
}
