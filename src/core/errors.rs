// src/core/errors.rs

//! Defines the primary error type for the entire application.

use crate::core::upstream::transport::{UpstreamError, UpstreamErrorKind};
use thiserror::Error;

/// The main error enum, representing all possible failures within the service.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("flood wait, retry after {seconds}s")]
    FloodWait { seconds: u32 },

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("stopped")]
    Stopped,

    #[error("session storage corrupt: {0}")]
    SessionCorrupt(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(String),
}

impl MirrorError {
    /// True when the error means the target channel can no longer be written to.
    ///
    /// Detection uses both the typed variant and substring matching on the
    /// error text, because some SDK layers raise generic errors with the typed
    /// name embedded in the message.
    pub fn is_channel_unavailable(&self) -> bool {
        if matches!(self, MirrorError::ChannelUnavailable(_)) {
            return true;
        }
        let text = self.to_string().to_lowercase();
        const KEYWORDS: [&str; 6] = [
            "channelprivateerror",
            "channelinvaliderror",
            "chatadminrequirederror",
            "forbidden",
            "private channel",
            "have no rights",
        ];
        KEYWORDS.iter().any(|word| text.contains(word))
    }
}

// --- From trait implementations for easy error conversion ---

impl From<rusqlite::Error> for MirrorError {
    fn from(e: rusqlite::Error) -> Self {
        MirrorError::Store(e.to_string())
    }
}

impl From<reqwest::Error> for MirrorError {
    fn from(e: reqwest::Error) -> Self {
        MirrorError::Http(e.to_string())
    }
}

impl From<UpstreamError> for MirrorError {
    fn from(e: UpstreamError) -> Self {
        match e.kind {
            UpstreamErrorKind::FloodWait(seconds) => MirrorError::FloodWait { seconds },
            UpstreamErrorKind::NotParticipant
            | UpstreamErrorKind::AdminRequired
            | UpstreamErrorKind::ChannelPrivate
            | UpstreamErrorKind::ChannelInvalid => MirrorError::ChannelUnavailable(e.message),
            UpstreamErrorKind::Unauthorized => {
                MirrorError::Upstream(format!("not logged in: {}", e.message))
            }
            UpstreamErrorKind::SessionStorage => MirrorError::SessionCorrupt(e.message),
            UpstreamErrorKind::Network | UpstreamErrorKind::Other => {
                MirrorError::Upstream(e.message)
            }
        }
    }
}
