// src/core/upstream/session.rs

//! One logical client session: a transport plus its role and recovery rules.

use crate::core::errors::MirrorError;
use crate::core::upstream::transport::{Transport, UpstreamError};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Which capability set this session is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Operator account: reads source histories and dialogs.
    Reader,
    /// Service identity: posts to target channels, checks admin rights.
    Writer,
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionRole::Reader => write!(f, "reader"),
            SessionRole::Writer => write!(f, "writer"),
        }
    }
}

/// Error text shapes that mean the on-disk session store is corrupt.
fn is_session_storage_error(e: &UpstreamError) -> bool {
    if e.kind == crate::core::upstream::transport::UpstreamErrorKind::SessionStorage {
        return true;
    }
    let text = e.message.to_lowercase();
    text.contains("no such table") || text.contains("file is not a database") || text.contains("malformed")
}

/// Runs `op`, absorbing a single flood-wait signal by sleeping `N + 1` seconds
/// and retrying once. A second signal surfaces to the caller.
pub async fn retry_flood_wait<T, F, Fut>(op: F) -> Result<T, UpstreamError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    retry_flood_wait_capped(op, u32::MAX).await
}

/// Like [`retry_flood_wait`], but only absorbs waits of at most `max_seconds`.
pub async fn retry_flood_wait_capped<T, F, Fut>(
    op: F,
    max_seconds: u32,
) -> Result<T, UpstreamError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    match op().await {
        Err(e) => match e.flood_seconds() {
            Some(seconds) if seconds <= max_seconds => {
                tokio::time::sleep(Duration::from_secs(u64::from(seconds) + 1)).await;
                op().await
            }
            _ => Err(e),
        },
        ok => ok,
    }
}

/// A transport bound to a role, with connection management and the
/// session-storage self-heal.
pub struct ClientSession {
    role: SessionRole,
    transport: Arc<dyn Transport>,
    // Serializes connect/rebuild so a session reset cannot race a login attempt.
    connect_lock: Mutex<()>,
}

impl ClientSession {
    pub fn new(role: SessionRole, transport: Arc<dyn Transport>) -> Self {
        Self {
            role,
            transport,
            connect_lock: Mutex::new(()),
        }
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Connects the session, rebuilding the session store in place when it is
    /// corrupt. Returns `true` when a rebuild happened; the caller owes the
    /// operator a single re-login notification. The transport object itself is
    /// kept, so active subscriptions survive the rebuild.
    pub async fn ensure_connected(&self) -> Result<bool, MirrorError> {
        let _guard = self.connect_lock.lock().await;
        match self.transport.connect().await {
            Ok(()) => Ok(false),
            Err(e) if is_session_storage_error(&e) => {
                warn!(
                    "{} session store is corrupt ({}), rebuilding in place",
                    self.role, e
                );
                self.remove_session_store()?;
                self.transport.connect().await.map_err(MirrorError::from)?;
                info!("{} session store rebuilt", self.role);
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn is_authorized(&self) -> Result<bool, MirrorError> {
        self.ensure_connected().await?;
        Ok(self.transport.is_authorized().await?)
    }

    pub async fn disconnect(&self) {
        self.transport.disconnect().await;
    }

    /// Deletes the session file and its journal/wal/shm siblings.
    fn remove_session_store(&self) -> Result<(), MirrorError> {
        let Some(path) = self.transport.session_path() else {
            return Err(MirrorError::SessionCorrupt(format!(
                "{} transport keeps no session store to rebuild",
                self.role
            )));
        };

        let base = path.to_string_lossy().to_string();
        for candidate in [
            base.clone(),
            format!("{base}-journal"),
            format!("{base}-wal"),
            format!("{base}-shm"),
        ] {
            match std::fs::remove_file(&candidate) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
